//! User document schema
//!
//! Stores local accounts and their Argon2 password hashes.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Case-insensitive lookup key for a handle
pub fn handle_key(handle: &str) -> String {
    handle.trim().to_lowercase()
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    /// MongoDB document ID
    pub _id: ObjectId,

    /// Public handle, as the user chose it
    pub handle: String,

    /// Lowercase handle used for unique lookups
    pub handle_key: String,

    /// Email address (lowercase)
    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub biography: String,

    pub joined_at: DateTime,

    #[serde(default)]
    pub is_disabled: bool,
}

impl UserDoc {
    /// Create a new user document
    pub fn new(handle: &str, email: &str, password_hash: String) -> Self {
        Self {
            _id: ObjectId::new(),
            handle: handle.to_string(),
            handle_key: handle_key(handle),
            email: email.trim().to_lowercase(),
            password_hash,
            status: String::new(),
            biography: String::new(),
            joined_at: DateTime::now(),
            is_disabled: false,
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "handle_key": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("handle_key_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .name("email_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
