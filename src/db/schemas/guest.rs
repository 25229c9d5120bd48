//! Guest document schema
//!
//! A token this host issued for a user of a foreign host. The token and its
//! renewal timestamp are only written after the foreign host confirmed
//! receipt; `requested_at` throttles repeat requests without touching them.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for guests
pub const GUEST_COLLECTION: &str = "guests";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GuestDoc {
    /// Handle of the user on the issuing host, as sent by that host
    pub handle: String,

    /// Lowercase handle used for lookups
    pub handle_key: String,

    pub host_id: ObjectId,

    /// Confirmed guest token, empty until a callback succeeds
    #[serde(default)]
    pub token: String,

    /// When the current token was confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    /// Last time the foreign host asked for a token
    pub requested_at: DateTime,
}

impl GuestDoc {
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

impl IntoIndexes for GuestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "handle_key": 1, "host_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("guest_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "token": 1 },
                Some(
                    IndexOptions::builder()
                        .name("token_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
