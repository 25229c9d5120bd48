//! Host document schema
//!
//! One row per peer imp deployment, keyed by its lowercase hostname.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for hosts
pub const HOST_COLLECTION: &str = "hosts";

/// Host document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HostDoc {
    /// MongoDB document ID, assigned when the row is first created
    pub _id: ObjectId,

    /// Hostname as referenced by users and peers (lowercase)
    pub name: String,

    /// Discovered API location (`host[:port][/path]`), empty until resolved
    #[serde(default)]
    pub location: String,

    /// When this host was first referenced
    pub created_at: DateTime,
}

impl HostDoc {
    /// Create a bare host record with no known location
    pub fn new(name: &str) -> Self {
        Self {
            _id: ObjectId::new(),
            name: name.to_lowercase(),
            location: String::new(),
            created_at: DateTime::now(),
        }
    }

    /// Whether discovery has already confirmed an API location
    pub fn is_located(&self) -> bool {
        !self.location.is_empty()
    }
}

impl IntoIndexes for HostDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("name_unique".to_string())
                    .build(),
            ),
        )]
    }
}
