//! Outbound calls to peer hosts
//!
//! Both callbacks are form posts to the peer's API location:
//! - `POST https://<location>/guest` asks the peer to issue a guest token
//! - `POST https://<location>/user/<handle>/host` delivers a token we issued

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ImpError, Result};

/// Body of `POST /guest`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuestRequestForm {
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub nonce: String,
}

/// Body of `POST /user/{handle}/host`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaceTokenForm {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub nonce: String,
}

/// Status and body of a peer's answer
#[derive(Debug, Clone, PartialEq)]
pub struct PeerReply {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn request_guest(&self, location: &str, form: &GuestRequestForm) -> Result<PeerReply>;

    async fn place_token(
        &self,
        location: &str,
        handle: &str,
        form: &PlaceTokenForm,
    ) -> Result<PeerReply>;
}

pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("imp/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    async fn post_form<T: Serialize + Sync>(&self, url: &str, form: &T) -> Result<PeerReply> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| ImpError::Http(format!("POST {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(PeerReply { status, body })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn request_guest(&self, location: &str, form: &GuestRequestForm) -> Result<PeerReply> {
        self.post_form(&guest_url(location), form).await
    }

    async fn place_token(
        &self,
        location: &str,
        handle: &str,
        form: &PlaceTokenForm,
    ) -> Result<PeerReply> {
        self.post_form(&user_host_url(location, handle), form).await
    }
}

fn guest_url(location: &str) -> String {
    format!("https://{}/guest", location.trim_end_matches('/'))
}

fn user_host_url(location: &str, handle: &str) -> String {
    format!(
        "https://{}/user/{}/host",
        location.trim_end_matches('/'),
        urlencoding::encode(handle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_urls() {
        assert_eq!(guest_url("peer.example:4114/"), "https://peer.example:4114/guest");
        assert_eq!(
            user_host_url("api.peer.example/imp", "al ice"),
            "https://api.peer.example/imp/user/al%20ice/host"
        );
    }

    #[test]
    fn test_forms_encode_as_urlencoded() {
        let form = PlaceTokenForm {
            host: "me.example".into(),
            token: "tok".into(),
            nonce: "n&1".into(),
        };
        let encoded = serde_urlencoded::to_string(&form).unwrap();
        assert_eq!(encoded, "host=me.example&token=tok&nonce=n%261");

        let parsed: GuestRequestForm = serde_urlencoded::from_str("handle=bob").unwrap();
        assert_eq!(parsed.handle, "bob");
        assert!(parsed.nonce.is_empty());
    }
}
