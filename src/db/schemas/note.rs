//! Note document schema
//!
//! Short texts posted by local users. Deleted notes keep their row with
//! `is_deleted` set.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for notes
pub const NOTE_COLLECTION: &str = "notes";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NoteDoc {
    /// MongoDB document ID; ordering by it is ordering by posting time
    pub _id: ObjectId,

    /// Author
    pub user_id: ObjectId,

    /// Text exactly as posted
    pub text: String,

    #[serde(default)]
    pub group_id: i64,

    pub created_at: DateTime,

    #[serde(default)]
    pub is_edited: bool,

    #[serde(default)]
    pub is_deleted: bool,
}

impl NoteDoc {
    pub fn new(user_id: ObjectId, text: &str, group_id: i64, created_at: DateTime) -> Self {
        Self {
            _id: ObjectId::new(),
            user_id,
            text: text.to_string(),
            group_id,
            created_at,
            is_edited: false,
            is_deleted: false,
        }
    }
}

impl IntoIndexes for NoteDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "_id": -1 },
            Some(
                IndexOptions::builder()
                    .name("user_notes".to_string())
                    .build(),
            ),
        )]
    }
}
