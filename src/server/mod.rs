//! HTTP server for imp

pub mod http;

pub use http::{run, serve, AppState};
