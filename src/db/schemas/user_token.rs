//! Session token schema
//!
//! Opaque bearer tokens issued at login, presented as `Authorization: IMP auth=<token>`.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for session tokens
pub const USER_TOKEN_COLLECTION: &str = "user_tokens";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserTokenDoc {
    pub token: String,
    pub user_id: ObjectId,
    pub login_at: DateTime,
    pub last_seen_at: DateTime,
}

impl UserTokenDoc {
    pub fn new(token: String, user_id: ObjectId) -> Self {
        let now = DateTime::now();
        Self {
            token,
            user_id,
            login_at: now,
            last_seen_at: now,
        }
    }
}

impl IntoIndexes for UserTokenDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "token": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("token_unique".to_string())
                    .build(),
            ),
        )]
    }
}
