//! Host discovery
//!
//! Finds the API location of a peer from nothing but its hostname. Every
//! conformant peer advertises `IMP-API-Location: <version>;<host[:port][/path]>`
//! on its responses. A candidate URL is confirmed once the location it
//! advertises is the candidate itself; an advertisement pointing elsewhere is
//! only a hint, verified by fetching it directly before it is trusted.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::types::{ImpError, Result};

/// Header every imp response carries (`IMP-API-Location`)
pub const IMP_LOCATION_HEADER: &str = "imp-api-location";

/// Fetches one candidate URL
#[async_trait]
pub trait Probe: Send + Sync {
    /// GET `url` (following redirects). Returns the advertised location header
    /// on a 200 response, `None` on transport errors, other statuses or a
    /// missing header.
    async fn probe(&self, url: &str) -> Option<String>;
}

/// Probe backed by a shared reqwest client
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("imp/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "Discovery candidate unreachable");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            debug!(url = %url, status = %response.status(), "Discovery candidate rejected");
            return None;
        }

        response
            .headers()
            .get(IMP_LOCATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

pub struct HostDiscovery {
    probe: Arc<dyn Probe>,
    default_port: u16,
    max_hops: usize,
}

impl HostDiscovery {
    pub fn new(probe: Arc<dyn Probe>, default_port: u16, max_hops: usize) -> Self {
        Self {
            probe,
            default_port,
            max_hops,
        }
    }

    /// Locate the API of `hostname`, returning `host[:port][/path]`
    pub async fn discover(&self, hostname: &str) -> Result<String> {
        let mut queue: VecDeque<String> = VecDeque::from([
            format!("https://{}", hostname),
            format!("https://{}:{}", hostname, self.default_port),
            format!("http://{}", hostname),
        ]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut hops = 0;

        while let Some(url) = queue.pop_front() {
            if !visited.insert(visit_key(&url)) {
                continue;
            }

            let Some(header) = self.probe.probe(&url).await else {
                continue;
            };

            let Some(advertised) = advertised_location(&header) else {
                debug!(url = %url, header = %header, "Empty API location header");
                continue;
            };

            if normalize(&url) == advertised {
                info!(host = %hostname, location = %advertised, "Discovered host API");
                return Ok(advertised);
            }

            // Pointed elsewhere: verify the hint directly before trusting it
            let hint = format!("https://{}", advertised);
            if hops >= self.max_hops {
                debug!(host = %hostname, hint = %hint, "Discovery hop limit reached");
                continue;
            }
            if visited.contains(&visit_key(&hint)) {
                continue;
            }
            hops += 1;
            debug!(host = %hostname, from = %url, to = %hint, "Following API location hint");
            queue.push_front(hint);
        }

        Err(ImpError::HostUnreachable(hostname.to_string()))
    }
}

/// Last `;`-separated segment of the header, normalized
fn advertised_location(header: &str) -> Option<String> {
    let last = header.rsplit(';').next()?.trim();
    let location = normalize(last);
    (!location.is_empty()).then_some(location)
}

/// Full URL as tracked in the visited set
fn visit_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Authority and path of a URL or bare location, lowercased, without scheme
/// or trailing slash
fn normalize(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    without_scheme.trim_end_matches('/').to_lowercase()
}
