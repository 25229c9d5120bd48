//! Persistence seam for the core
//!
//! Every read and write of the core and the account and note endpoints goes
//! through [`Store`]. Each mutation is a single atomic
//! operation at the storage layer: the conditional `claim_*` methods are the
//! compare-and-swap that keeps at most one handshake pending per identity
//! under concurrent requests.
//!
//! Two backends:
//! - [`MongoStore`]: production, unique indexes + upserts
//! - [`MemoryStore`]: dev mode without MongoDB, and the test suite

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};

use crate::db::schemas::{
    GuestDoc, HandleLimitDoc, HostDoc, IpLimitDoc, NoteDoc, UserDoc, UserHostDoc, UserTokenDoc,
};
use crate::types::Result;

/// Paging window for a note listing. Bounds are exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteQuery {
    pub since_id: Option<ObjectId>,
    pub before_id: Option<ObjectId>,
    pub since: Option<DateTime>,
    pub before: Option<DateTime>,
    /// Always positive
    pub limit: i64,
}

impl NoteQuery {
    /// Whether `note` falls inside the window (ignores the limit)
    pub fn matches(&self, note: &NoteDoc) -> bool {
        self.since_id.map_or(true, |id| note._id > id)
            && self.before_id.map_or(true, |id| note._id < id)
            && self.since.map_or(true, |at| note.created_at > at)
            && self.before.map_or(true, |at| note.created_at < at)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for health output
    fn kind(&self) -> &'static str;

    // -------------------------------------------------------------------------
    // Hosts
    // -------------------------------------------------------------------------

    /// Look up a host by (case-insensitive) name, inserting a bare row if absent.
    /// Concurrent callers converge on the same row.
    async fn find_or_create_host(&self, name: &str) -> Result<HostDoc>;

    async fn set_host_location(&self, host_id: ObjectId, location: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Users and session tokens
    // -------------------------------------------------------------------------

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserDoc>>;

    async fn find_user_by_handle_or_email(&self, identifier: &str) -> Result<Option<UserDoc>>;

    /// Insert a user; `Conflict` if the handle is taken
    async fn insert_user(&self, user: &UserDoc) -> Result<()>;

    async fn insert_token(&self, token: &UserTokenDoc) -> Result<()>;

    async fn find_token(&self, token: &str) -> Result<Option<UserTokenDoc>>;

    async fn delete_token(&self, token: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Notes
    // -------------------------------------------------------------------------

    async fn insert_note(&self, note: &NoteDoc) -> Result<()>;

    /// A note that has not been deleted
    async fn find_note(&self, note_id: ObjectId) -> Result<Option<NoteDoc>>;

    /// Live notes by `user_id` inside `query`, newest first
    async fn list_notes(&self, user_id: ObjectId, query: &NoteQuery) -> Result<Vec<NoteDoc>>;

    /// Replace the text of a live note and mark it edited. Returns the
    /// updated note, or `None` if there is no live note with that id.
    async fn edit_note(&self, note_id: ObjectId, text: &str) -> Result<Option<NoteDoc>>;

    /// Mark a live note deleted. Returns whether one was.
    async fn delete_note(&self, note_id: ObjectId) -> Result<bool>;

    // -------------------------------------------------------------------------
    // UserHost: credentials local users hold for foreign hosts
    // -------------------------------------------------------------------------

    async fn find_user_host(
        &self,
        user_id: ObjectId,
        host_id: ObjectId,
    ) -> Result<Option<UserHostDoc>>;

    /// Write `pending` unless a row exists that has a token or was created at or
    /// after `stale_before`. Returns whether the write happened.
    async fn claim_user_host(&self, pending: &UserHostDoc, stale_before: DateTime) -> Result<bool>;

    /// Consume `nonce` and store `token`, only if the row's nonce matches exactly.
    /// Returns whether a row matched.
    async fn place_user_host_token(
        &self,
        user_id: ObjectId,
        host_id: ObjectId,
        nonce: &str,
        token: &str,
    ) -> Result<bool>;

    // -------------------------------------------------------------------------
    // Guests: tokens this host issued for users of foreign hosts
    // -------------------------------------------------------------------------

    async fn find_guest(&self, handle: &str, host_id: ObjectId) -> Result<Option<GuestDoc>>;

    /// Stamp a guest token request at `now` unless one was stamped at or after
    /// `stale_before`. Creates the row with an empty token if absent; never
    /// touches an existing token. Returns whether the stamp was written.
    async fn claim_guest_request(
        &self,
        handle: &str,
        host_id: ObjectId,
        now: DateTime,
        stale_before: DateTime,
    ) -> Result<bool>;

    /// Persist a confirmed guest token (upsert)
    async fn store_guest_token(
        &self,
        handle: &str,
        host_id: ObjectId,
        token: &str,
        now: DateTime,
    ) -> Result<()>;

    // -------------------------------------------------------------------------
    // Rate limiter counters
    // -------------------------------------------------------------------------

    async fn find_handle_limit(&self, handle_key: &str) -> Result<Option<HandleLimitDoc>>;

    /// Insert `{count: 1, delay: 1}` or increment the count and double the delay
    /// (capped at `max_delay_secs`), stamping `now`, in one operation.
    async fn bump_handle_limit(
        &self,
        handle_key: &str,
        now: DateTime,
        max_delay_secs: i64,
    ) -> Result<HandleLimitDoc>;

    async fn clear_handle_limit(&self, handle_key: &str) -> Result<()>;

    async fn find_ip_limit(&self, ip: &str) -> Result<Option<IpLimitDoc>>;

    /// Stamp a login attempt from `ip`, creating the row with a full quota if absent
    async fn record_login_attempt(&self, ip: &str, now: DateTime, daily_quota: i64) -> Result<()>;

    /// Consume one new-account allowance: if the reset time is unset or has
    /// passed, restart the window at `quota - 1` ending `window_secs` from
    /// `now`; otherwise decrement.
    async fn consume_new_user_quota(
        &self,
        ip: &str,
        now: DateTime,
        daily_quota: i64,
        window_secs: i64,
    ) -> Result<IpLimitDoc>;
}

/// `now` shifted by whole seconds
pub(crate) fn add_secs(now: DateTime, secs: i64) -> DateTime {
    DateTime::from_millis(now.timestamp_millis().saturating_add(secs.saturating_mul(1000)))
}
