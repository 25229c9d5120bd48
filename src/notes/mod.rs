//! Notes
//!
//! Short texts posted by local users and read back by any signed-in user.
//! Text is stored exactly as posted. Only the author may edit or delete a
//! note; deleting hides it from every read.

use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::schemas::{NoteDoc, UserTokenDoc};
use crate::store::{NoteQuery, Store};
use crate::types::{ImpError, Result};

/// Longest note accepted, in characters
pub const MAX_NOTE_LENGTH: usize = 140;

/// Largest page a listing returns
pub const MAX_NOTES_RETURNED: i64 = 100;

const NO_SUCH_NOTE: &str = "There is no note with that ID.";

/// Public view of a note
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    pub id: String,
    pub user_id: String,
    pub text: String,
    /// Unix seconds
    pub date: i64,
    pub edited: bool,
    pub group_id: i64,
}

impl From<&NoteDoc> for NoteView {
    fn from(note: &NoteDoc) -> Self {
        Self {
            id: note._id.to_hex(),
            user_id: note.user_id.to_hex(),
            text: note.text.clone(),
            date: note.created_at.timestamp_millis() / 1000,
            edited: note.is_edited,
            group_id: note.group_id,
        }
    }
}

/// Body of POST /note and PUT /note/{id}
#[derive(Debug, Default, Deserialize)]
pub struct NoteForm {
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub group: String,
}

/// Query string of GET /note. Malformed values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct NoteListParams {
    pub since_id: Option<String>,
    pub before_id: Option<String>,
    pub since_date: Option<String>,
    pub before_date: Option<String>,
    pub count: Option<String>,
}

impl NoteListParams {
    pub fn to_query(&self) -> NoteQuery {
        let id = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| ObjectId::parse_str(v.trim()).ok())
        };
        let date = |value: &Option<String>| {
            positive(value).map(|secs| bson::DateTime::from_millis(secs.saturating_mul(1000)))
        };

        NoteQuery {
            since_id: id(&self.since_id),
            before_id: id(&self.before_id),
            since: date(&self.since_date),
            before: date(&self.before_date),
            limit: positive(&self.count).map_or(MAX_NOTES_RETURNED, |n| n.min(MAX_NOTES_RETURNED)),
        }
    }
}

fn positive(value: &Option<String>) -> Option<i64> {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
}

pub struct NoteService {
    store: Arc<dyn Store>,
}

impl NoteService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The session user's own notes, newest first
    pub async fn list(&self, session: &UserTokenDoc, params: &NoteListParams) -> Result<Vec<NoteView>> {
        let notes = self
            .store
            .list_notes(session.user_id, &params.to_query())
            .await?;
        Ok(notes.iter().map(NoteView::from).collect())
    }

    pub async fn post(
        &self,
        session: &UserTokenDoc,
        form: &NoteForm,
        now: DateTime<Utc>,
    ) -> Result<NoteView> {
        let text = note_text(&form.note)?;
        let group_id = form.group.trim().parse::<i64>().unwrap_or(0);

        let note = NoteDoc::new(
            session.user_id,
            text,
            group_id,
            bson::DateTime::from_chrono(now),
        );
        self.store.insert_note(&note).await?;

        info!(note = %note._id, "Note posted");
        Ok(NoteView::from(&note))
    }

    pub async fn get(&self, note_id: &str) -> Result<NoteView> {
        let note = self.find(note_id).await?;
        Ok(NoteView::from(&note))
    }

    pub async fn edit(
        &self,
        session: &UserTokenDoc,
        note_id: &str,
        form: &NoteForm,
    ) -> Result<NoteView> {
        let note = self.find(note_id).await?;
        if note.user_id != session.user_id {
            return Err(ImpError::Unauthorized(
                "Only the note's author may edit it.".into(),
            ));
        }

        let text = note_text(&form.note)?;
        let edited = self
            .store
            .edit_note(note._id, text)
            .await?
            .ok_or_else(|| ImpError::NotFound(NO_SUCH_NOTE.into()))?;
        Ok(NoteView::from(&edited))
    }

    pub async fn delete(&self, session: &UserTokenDoc, note_id: &str) -> Result<()> {
        let note = self.find(note_id).await?;
        if note.user_id != session.user_id {
            return Err(ImpError::Unauthorized(
                "Only the note's author may delete it.".into(),
            ));
        }

        if !self.store.delete_note(note._id).await? {
            return Err(ImpError::NotFound(NO_SUCH_NOTE.into()));
        }
        info!(note = %note._id, "Note deleted");
        Ok(())
    }

    async fn find(&self, note_id: &str) -> Result<NoteDoc> {
        let id = ObjectId::parse_str(note_id.trim())
            .map_err(|_| ImpError::Validation("Invalid note ID.".into()))?;
        self.store
            .find_note(id)
            .await?
            .ok_or_else(|| ImpError::NotFound(NO_SUCH_NOTE.into()))
    }
}

fn note_text(text: &str) -> Result<&str> {
    if text.trim().is_empty() {
        return Err(ImpError::Validation("Note is missing.".into()));
    }
    if text.chars().count() > MAX_NOTE_LENGTH {
        return Err(ImpError::Validation(format!(
            "Note must be at most {} characters.",
            MAX_NOTE_LENGTH
        )));
    }
    Ok(text)
}
