//! Host directory
//!
//! Host rows are created on first reference so concurrent handshakes agree
//! on one id before the location is known. The location is filled in by
//! discovery exactly once and reused afterwards.

use std::sync::Arc;

use tracing::warn;

use super::discovery::HostDiscovery;
use crate::db::schemas::HostDoc;
use crate::store::Store;
use crate::types::{ImpError, Result};

pub struct HostDirectory {
    store: Arc<dyn Store>,
    discovery: HostDiscovery,
}

impl HostDirectory {
    pub fn new(store: Arc<dyn Store>, discovery: HostDiscovery) -> Self {
        Self { store, discovery }
    }

    /// Find the host named `hostname`, creating a bare row if it is new
    pub async fn resolve(&self, hostname: &str) -> Result<HostDoc> {
        let name = hostname.trim();
        if name.is_empty() {
            return Err(ImpError::Validation("Host is missing.".into()));
        }
        self.store.find_or_create_host(name).await
    }

    /// Persist a discovered location
    pub async fn record_location(&self, host: &mut HostDoc, location: &str) -> Result<()> {
        self.store.set_host_location(host._id, location).await?;
        host.location = location.to_string();
        Ok(())
    }

    /// API location of `host`, running discovery only if none is known yet
    pub async fn locate(&self, host: &mut HostDoc) -> Result<String> {
        if host.is_located() {
            return Ok(host.location.clone());
        }

        let location = self.discovery.discover(&host.name).await?;
        if let Err(e) = self.record_location(host, &location).await {
            // Still usable for this exchange; the next one rediscovers
            warn!(host = %host.name, error = %e, "Failed to persist host location");
            host.location = location.clone();
        }
        Ok(location)
    }
}
