//! Guest handshake endpoints
//!
//! - GET  /user/{handle}/host/{host} - local user asks for a token on a peer (Flow A)
//! - POST /user/{handle}/host        - peer delivers a token (Flow B)
//! - POST /guest                     - peer asks us for a guest token (Flow C)

use std::sync::Arc;

use chrono::Utc;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::json;

use super::envelope::{auth_header, data_response, error_response, parse_form, BoxBody};
use crate::guest::{GuestRequestForm, HostTokenOutcome, PlaceTokenForm};
use crate::server::AppState;

/// GET /user/{handle}/host/{host}
pub async fn handle_get_user_host(
    req: Request<Incoming>,
    state: Arc<AppState>,
    handle: &str,
    hostname: &str,
) -> Response<BoxBody> {
    let session = match state.auth.authenticate(auth_header(&req)).await {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    match state
        .guests
        .request_host_token(&session, handle, hostname, Utc::now())
        .await
    {
        Ok(HostTokenOutcome::Ready { host, token }) => {
            data_response(StatusCode::OK, &json!({ "host": host, "token": token }))
        }
        // The outcome is not known yet; the completion runs detached
        Ok(HostTokenOutcome::Accepted(_)) => data_response(StatusCode::ACCEPTED, &""),
        Err(e) => error_response(&e),
    }
}

/// POST /user/{handle}/host
pub async fn handle_post_user_host(
    req: Request<Incoming>,
    state: Arc<AppState>,
    handle: &str,
) -> Response<BoxBody> {
    let form: PlaceTokenForm = match parse_form(req).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match state.guests.place_host_token(handle, &form).await {
        Ok(()) => data_response(StatusCode::OK, &""),
        Err(e) => error_response(&e),
    }
}

/// POST /guest
pub async fn handle_post_guest(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let form: GuestRequestForm = match parse_form(req).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match state.guests.request_guest_token(&form, Utc::now()).await {
        Ok(_) => data_response(StatusCode::ACCEPTED, &""),
        Err(e) => error_response(&e),
    }
}
