//! UserHost document schema
//!
//! A credential a local user holds for a foreign host. While a handshake is
//! in flight the row carries the nonce and an empty token; once the foreign
//! host places its token the nonce is cleared.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for user host credentials
pub const USER_HOST_COLLECTION: &str = "user_hosts";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserHostDoc {
    pub user_id: ObjectId,
    pub host_id: ObjectId,

    /// Single-use nonce, empty once consumed
    #[serde(default)]
    pub nonce: String,

    /// Token issued by the foreign host, empty until confirmed
    #[serde(default)]
    pub token: String,

    /// When the current handshake was initiated
    pub created_at: DateTime,
}

impl UserHostDoc {
    /// A fresh pending row
    pub fn pending(user_id: ObjectId, host_id: ObjectId, nonce: String, now: DateTime) -> Self {
        Self {
            user_id,
            host_id,
            nonce,
            token: String::new(),
            created_at: now,
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

impl IntoIndexes for UserHostDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "host_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_host_unique".to_string())
                    .build(),
            ),
        )]
    }
}
