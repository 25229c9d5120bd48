//! JSON envelopes and request helpers shared by every handler
//!
//! Success: `{"data": ...}`
//! Failure: `{"errors": [{"status": "<code>", "title": msg, "detail": msg}]}`

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::types::ImpError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest form body accepted
const MAX_FORM_BYTES: usize = 10240;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full_body(json))
        .unwrap()
}

/// `{"data": data}` with `status`
pub fn data_response<T: Serialize>(status: StatusCode, data: &T) -> Response<BoxBody> {
    let data = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
    json_response(status, &json!({ "data": data }))
}

/// Error envelope with a caller-facing message
pub fn message_response(status: StatusCode, message: &str) -> Response<BoxBody> {
    json_response(
        status,
        &json!({
            "errors": [{
                "status": status.as_u16().to_string(),
                "title": message,
                "detail": message,
            }]
        }),
    )
}

/// Error envelope for `err`. Server errors are logged and reported generically.
pub fn error_response(err: &ImpError) -> Response<BoxBody> {
    if err.is_server_error() {
        error!(error = %err, "Request failed");
    }

    let mut response = message_response(err.status(), &err.public_message());

    if let ImpError::RateLimited {
        retry_after_secs: Some(secs),
        ..
    } = err
    {
        response
            .headers_mut()
            .insert(hyper::header::RETRY_AFTER, HeaderValue::from(*secs));
    }
    response
}

pub fn no_content() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(empty_body())
        .unwrap()
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    message_response(StatusCode::NOT_FOUND, &format!("No route for {}", path))
}

pub fn preflight_response() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

/// Read an `application/x-www-form-urlencoded` body, refusing it as soon as
/// more than `MAX_FORM_BYTES` have arrived
pub async fn parse_form<T, B>(req: Request<B>) -> Result<T, ImpError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = Limited::new(req.into_body(), MAX_FORM_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ImpError::Validation("Request body too large.".into())
            } else {
                ImpError::Validation(format!("Failed to read body: {}", e))
            }
        })?;

    serde_urlencoded::from_bytes(&body.to_bytes())
        .map_err(|e| ImpError::Validation(format!("Invalid form body: {}", e)))
}

/// Client address: first `X-Forwarded-For` entry, else the peer socket
pub fn client_ip<B>(req: &Request<B>, addr: SocketAddr) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

pub fn auth_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response<BoxBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = error_response(&ImpError::NotFound("There is no user with that handle.".into()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["status"], "404");
        assert_eq!(body["errors"][0]["title"], "There is no user with that handle.");
        assert_eq!(body["errors"][0]["detail"], "There is no user with that handle.");
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let response = error_response(&ImpError::RateLimited {
            message: "Too many login attempts.".into(),
            retry_after_secs: Some(4),
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[hyper::header::RETRY_AFTER], "4");
    }

    #[tokio::test]
    async fn test_server_error_is_generic() {
        let response = error_response(&ImpError::Database("E11000 at replica 2".into()));
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["title"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_data_envelope() {
        let body = body_json(data_response(StatusCode::ACCEPTED, &"")).await;
        assert_eq!(body, json!({ "data": "" }));
    }

    #[derive(Debug, serde::Deserialize)]
    struct NonceForm {
        nonce: String,
    }

    #[tokio::test]
    async fn test_parse_form_reads_small_body() {
        let req = Request::new(Full::new(Bytes::from_static(b"nonce=abc%20d")));
        let form: NonceForm = parse_form(req).await.unwrap();
        assert_eq!(form.nonce, "abc d");
    }

    #[tokio::test]
    async fn test_parse_form_stops_at_limit() {
        let mut body = b"nonce=".to_vec();
        body.resize(MAX_FORM_BYTES + 1, b'a');
        let req = Request::new(Full::new(Bytes::from(body)));

        let err = parse_form::<NonceForm, _>(req).await.unwrap_err();
        assert_eq!(err.to_string(), "Request body too large.");
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let req = Request::builder()
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req, addr), "203.0.113.9");

        let req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(&req, addr), "127.0.0.1");
    }
}
