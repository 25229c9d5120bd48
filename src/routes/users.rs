//! Account and session endpoints
//!
//! - POST   /user          - register
//! - POST   /token         - log in
//! - DELETE /token/{token} - log out

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use super::envelope::{client_ip, data_response, error_response, no_content, parse_form, BoxBody};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    #[serde(default)]
    pub handle_or_email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /user
pub async fn handle_register(
    req: Request<Incoming>,
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Response<BoxBody> {
    let ip = client_ip(&req, addr);
    let form: RegisterForm = match parse_form(req).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match state
        .auth
        .register(&form.handle, &form.email, &form.password, &ip, Utc::now())
        .await
    {
        Ok(session) => data_response(StatusCode::CREATED, &session),
        Err(e) => error_response(&e),
    }
}

/// POST /token
pub async fn handle_login(
    req: Request<Incoming>,
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Response<BoxBody> {
    let ip = client_ip(&req, addr);
    let form: LoginForm = match parse_form(req).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match state
        .auth
        .login(&form.handle_or_email, &form.password, &ip, Utc::now())
        .await
    {
        Ok(session) => data_response(StatusCode::CREATED, &session),
        Err(e) => error_response(&e),
    }
}

/// DELETE /token/{token}
pub async fn handle_logout(state: Arc<AppState>, token: &str) -> Response<BoxBody> {
    match state.auth.logout(token).await {
        Ok(()) => no_content(),
        Err(e) => error_response(&e),
    }
}
