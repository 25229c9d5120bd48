//! imp - federated social host
//!
//! Serves local accounts and lets users of independent imp hosts
//! authenticate with each other without a trusted third party.
//!
//! ## Components
//!
//! - **Rate limiter**: per-handle login backoff, per-IP login throttle and
//!   new-account quota
//! - **Host directory**: hostname to API location, discovered on first use
//! - **Host discovery**: probes a bare hostname for its `IMP-API-Location`
//! - **Notes**: short texts posted by local users
//! - **Guest handshake**: nonce-bound token exchange between hosts, completed
//!   by background callbacks

pub mod auth;
pub mod config;
pub mod db;
pub mod guest;
pub mod hosts;
pub mod limits;
pub mod notes;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{ImpError, Result};
