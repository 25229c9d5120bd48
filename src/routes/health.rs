//! Liveness probe and landing response
//!
//! GET /health returns 200 while the process is serving, with enough detail
//! to tell which store backs it and how busy the callback runner is.
//!
//! GET / answers 200 so that peers probing a bare hostname during discovery
//! find this host's `IMP-API-Location`.

use std::sync::Arc;

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::envelope::{data_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    /// Advertised `IMP-API-Location` value
    pub api_location: String,
    /// Store backend ("mongodb" or "memory")
    pub store: &'static str,
    /// Background completions holding a slot
    pub callbacks_in_flight: usize,
    pub mode: &'static str,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub api_location: String,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        api_location: state.args.api_location_header(),
        store: state.store.kind(),
        callbacks_in_flight: state.guests.runner().in_flight(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// GET /health
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    data_response(StatusCode::OK, &build_health_response(&state))
}

/// GET /
pub fn home(state: Arc<AppState>) -> Response<BoxBody> {
    data_response(
        StatusCode::OK,
        &HomeResponse {
            name: "imp",
            version: env!("CARGO_PKG_VERSION"),
            api_location: state.args.api_location_header(),
        },
    )
}
