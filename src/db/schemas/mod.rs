//! Database schemas for imp
//!
//! Defines MongoDB document structures for users, session tokens, notes,
//! hosts, the two guest credential tables, and the rate limiter's counters.

mod guest;
mod host;
mod limits;
mod note;
mod user;
mod user_host;
mod user_token;

pub use guest::{GuestDoc, GUEST_COLLECTION};
pub use host::{HostDoc, HOST_COLLECTION};
pub use limits::{HandleLimitDoc, IpLimitDoc, HANDLE_LIMIT_COLLECTION, IP_LIMIT_COLLECTION};
pub use note::{NoteDoc, NOTE_COLLECTION};
pub use user::{handle_key, UserDoc, USER_COLLECTION};
pub use user_host::{UserHostDoc, USER_HOST_COLLECTION};
pub use user_token::{UserTokenDoc, USER_TOKEN_COLLECTION};
