//! Authentication for imp
//!
//! Provides:
//! - Password hashing with Argon2, plus the dummy hash for unknown accounts
//! - Random session tokens, guest tokens and nonces
//! - `Authorization: IMP auth=<token>` parsing
//! - Login, registration and logout

pub mod password;
pub mod service;
pub mod token;

pub use password::{hash_password, verify_password};
pub use service::{AuthService, Session, UserView};
pub use token::{extract_session_token, random_token, TOKEN_LENGTH};
