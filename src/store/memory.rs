//! In-memory store
//!
//! Backs dev mode when MongoDB is unreachable, and the test suite. DashMap's
//! entry API holds the shard lock for the duration of each read-modify-write,
//! which gives the same per-identity atomicity the unique indexes give MongoDB.

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{add_secs, NoteQuery, Store};
use crate::db::schemas::{
    handle_key, GuestDoc, HandleLimitDoc, HostDoc, IpLimitDoc, NoteDoc, UserDoc, UserHostDoc,
    UserTokenDoc,
};
use crate::types::{ImpError, Result};

#[derive(Default)]
pub struct MemoryStore {
    /// Keyed by lowercase name
    hosts: DashMap<String, HostDoc>,
    /// Keyed by handle key
    users: DashMap<String, UserDoc>,
    tokens: DashMap<String, UserTokenDoc>,
    notes: DashMap<ObjectId, NoteDoc>,
    user_hosts: DashMap<(ObjectId, ObjectId), UserHostDoc>,
    guests: DashMap<(String, ObjectId), GuestDoc>,
    handle_limits: DashMap<String, HandleLimitDoc>,
    ip_limits: DashMap<String, IpLimitDoc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of host rows (for tests and diagnostics)
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of user host rows (for tests and diagnostics)
    pub fn user_host_count(&self) -> usize {
        self.user_hosts.len()
    }

    /// Overwrite a user host row, bypassing the claim check
    pub fn put_user_host(&self, row: UserHostDoc) {
        self.user_hosts.insert((row.user_id, row.host_id), row);
    }

    /// Overwrite a guest row, bypassing the claim check
    pub fn put_guest(&self, row: GuestDoc) {
        self.guests.insert((row.handle_key.clone(), row.host_id), row);
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn find_or_create_host(&self, name: &str) -> Result<HostDoc> {
        let host = self
            .hosts
            .entry(name.to_lowercase())
            .or_insert_with(|| HostDoc::new(name));
        Ok(host.value().clone())
    }

    async fn set_host_location(&self, host_id: ObjectId, location: &str) -> Result<()> {
        if let Some(mut host) = self.hosts.iter_mut().find(|h| h._id == host_id) {
            host.location = location.to_string();
        }
        Ok(())
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserDoc>> {
        Ok(self.users.get(&handle_key(handle)).map(|u| u.value().clone()))
    }

    async fn find_user_by_handle_or_email(&self, identifier: &str) -> Result<Option<UserDoc>> {
        let key = handle_key(identifier);
        if let Some(user) = self.users.get(&key) {
            return Ok(Some(user.value().clone()));
        }
        Ok(self
            .users
            .iter()
            .find(|u| u.email == key)
            .map(|u| u.value().clone()))
    }

    async fn insert_user(&self, user: &UserDoc) -> Result<()> {
        match self.users.entry(user.handle_key.clone()) {
            Entry::Occupied(_) => Err(ImpError::Conflict("That handle is already taken.".into())),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn insert_token(&self, token: &UserTokenDoc) -> Result<()> {
        match self.tokens.entry(token.token.clone()) {
            Entry::Occupied(_) => Err(ImpError::Conflict("Document already exists".into())),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn find_token(&self, token: &str) -> Result<Option<UserTokenDoc>> {
        Ok(self.tokens.get(token).map(|t| t.value().clone()))
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        self.tokens.remove(token);
        Ok(())
    }

    async fn insert_note(&self, note: &NoteDoc) -> Result<()> {
        self.notes.insert(note._id, note.clone());
        Ok(())
    }

    async fn find_note(&self, note_id: ObjectId) -> Result<Option<NoteDoc>> {
        Ok(self
            .notes
            .get(&note_id)
            .filter(|n| !n.is_deleted)
            .map(|n| n.value().clone()))
    }

    async fn list_notes(&self, user_id: ObjectId, query: &NoteQuery) -> Result<Vec<NoteDoc>> {
        let mut notes: Vec<NoteDoc> = self
            .notes
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_deleted && query.matches(n))
            .map(|n| n.value().clone())
            .collect();
        notes.sort_by(|a, b| b._id.cmp(&a._id));
        notes.truncate(usize::try_from(query.limit).unwrap_or(0));
        Ok(notes)
    }

    async fn edit_note(&self, note_id: ObjectId, text: &str) -> Result<Option<NoteDoc>> {
        match self.notes.get_mut(&note_id) {
            Some(mut note) if !note.is_deleted => {
                note.text = text.to_string();
                note.is_edited = true;
                Ok(Some(note.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_note(&self, note_id: ObjectId) -> Result<bool> {
        match self.notes.get_mut(&note_id) {
            Some(mut note) if !note.is_deleted => {
                note.is_deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_user_host(
        &self,
        user_id: ObjectId,
        host_id: ObjectId,
    ) -> Result<Option<UserHostDoc>> {
        Ok(self
            .user_hosts
            .get(&(user_id, host_id))
            .map(|r| r.value().clone()))
    }

    async fn claim_user_host(&self, pending: &UserHostDoc, stale_before: DateTime) -> Result<bool> {
        match self.user_hosts.entry((pending.user_id, pending.host_id)) {
            Entry::Vacant(slot) => {
                slot.insert(pending.clone());
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                if row.has_token() || row.created_at >= stale_before {
                    return Ok(false);
                }
                row.nonce = pending.nonce.clone();
                row.created_at = pending.created_at;
                Ok(true)
            }
        }
    }

    async fn place_user_host_token(
        &self,
        user_id: ObjectId,
        host_id: ObjectId,
        nonce: &str,
        token: &str,
    ) -> Result<bool> {
        if nonce.is_empty() {
            return Ok(false);
        }
        match self.user_hosts.get_mut(&(user_id, host_id)) {
            Some(mut row) if row.nonce == nonce => {
                row.nonce.clear();
                row.token = token.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_guest(&self, handle: &str, host_id: ObjectId) -> Result<Option<GuestDoc>> {
        Ok(self
            .guests
            .get(&(handle_key(handle), host_id))
            .map(|g| g.value().clone()))
    }

    async fn claim_guest_request(
        &self,
        handle: &str,
        host_id: ObjectId,
        now: DateTime,
        stale_before: DateTime,
    ) -> Result<bool> {
        match self.guests.entry((handle_key(handle), host_id)) {
            Entry::Vacant(slot) => {
                slot.insert(GuestDoc {
                    handle: handle.to_string(),
                    handle_key: handle_key(handle),
                    host_id,
                    token: String::new(),
                    created_at: None,
                    requested_at: now,
                });
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                if row.requested_at >= stale_before {
                    return Ok(false);
                }
                row.requested_at = now;
                Ok(true)
            }
        }
    }

    async fn store_guest_token(
        &self,
        handle: &str,
        host_id: ObjectId,
        token: &str,
        now: DateTime,
    ) -> Result<()> {
        let mut row = self
            .guests
            .entry((handle_key(handle), host_id))
            .or_insert_with(|| GuestDoc {
                handle: handle.to_string(),
                handle_key: handle_key(handle),
                host_id,
                token: String::new(),
                created_at: None,
                requested_at: now,
            });
        row.token = token.to_string();
        row.created_at = Some(now);
        Ok(())
    }

    async fn find_handle_limit(&self, handle_key: &str) -> Result<Option<HandleLimitDoc>> {
        Ok(self.handle_limits.get(handle_key).map(|l| l.value().clone()))
    }

    async fn bump_handle_limit(
        &self,
        handle_key: &str,
        now: DateTime,
        max_delay_secs: i64,
    ) -> Result<HandleLimitDoc> {
        let limit = match self.handle_limits.entry(handle_key.to_string()) {
            Entry::Vacant(slot) => slot
                .insert(HandleLimitDoc {
                    handle_key: handle_key.to_string(),
                    attempt_count: 1,
                    last_attempt_at: now,
                    next_delay_secs: 1,
                })
                .value()
                .clone(),
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                row.attempt_count += 1;
                row.next_delay_secs = row.next_delay_secs.saturating_mul(2).min(max_delay_secs);
                row.last_attempt_at = now;
                row.clone()
            }
        };
        Ok(limit)
    }

    async fn clear_handle_limit(&self, handle_key: &str) -> Result<()> {
        self.handle_limits.remove(handle_key);
        Ok(())
    }

    async fn find_ip_limit(&self, ip: &str) -> Result<Option<IpLimitDoc>> {
        Ok(self.ip_limits.get(ip).map(|l| l.value().clone()))
    }

    async fn record_login_attempt(&self, ip: &str, now: DateTime, daily_quota: i64) -> Result<()> {
        let mut row = self
            .ip_limits
            .entry(ip.to_string())
            .or_insert_with(|| IpLimitDoc {
                ip: ip.to_string(),
                last_login_attempt_at: None,
                users_allowed: daily_quota,
                count_reset_at: None,
            });
        row.last_login_attempt_at = Some(now);
        Ok(())
    }

    async fn consume_new_user_quota(
        &self,
        ip: &str,
        now: DateTime,
        daily_quota: i64,
        window_secs: i64,
    ) -> Result<IpLimitDoc> {
        let mut row = self
            .ip_limits
            .entry(ip.to_string())
            .or_insert_with(|| IpLimitDoc {
                ip: ip.to_string(),
                last_login_attempt_at: None,
                users_allowed: daily_quota,
                count_reset_at: None,
            });

        let window_over = row.count_reset_at.map_or(true, |reset| reset <= now);
        if window_over {
            row.users_allowed = daily_quota - 1;
            row.count_reset_at = Some(add_secs(now, window_secs));
        } else {
            row.users_allowed -= 1;
        }
        Ok(row.value().clone())
    }
}
