//! MongoDB-backed store
//!
//! Unique indexes on every identity make the conditional upserts behave as
//! compare-and-swap: when the filter misses, the upsert's insert collides
//! with the existing row and the claim is reported as lost.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime};
use tracing::debug;

use super::{add_secs, NoteQuery, Store};
use crate::db::schemas::{
    handle_key, GuestDoc, HandleLimitDoc, HostDoc, IpLimitDoc, NoteDoc, UserDoc, UserHostDoc,
    UserTokenDoc, GUEST_COLLECTION, HANDLE_LIMIT_COLLECTION, HOST_COLLECTION,
    IP_LIMIT_COLLECTION, NOTE_COLLECTION, USER_COLLECTION, USER_HOST_COLLECTION,
    USER_TOKEN_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{ImpError, Result};

pub struct MongoStore {
    hosts: MongoCollection<HostDoc>,
    users: MongoCollection<UserDoc>,
    tokens: MongoCollection<UserTokenDoc>,
    notes: MongoCollection<NoteDoc>,
    user_hosts: MongoCollection<UserHostDoc>,
    guests: MongoCollection<GuestDoc>,
    handle_limits: MongoCollection<HandleLimitDoc>,
    ip_limits: MongoCollection<IpLimitDoc>,
}

impl MongoStore {
    /// Open every collection, applying indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            hosts: mongo.collection(HOST_COLLECTION).await?,
            users: mongo.collection(USER_COLLECTION).await?,
            tokens: mongo.collection(USER_TOKEN_COLLECTION).await?,
            notes: mongo.collection(NOTE_COLLECTION).await?,
            user_hosts: mongo.collection(USER_HOST_COLLECTION).await?,
            guests: mongo.collection(GUEST_COLLECTION).await?,
            handle_limits: mongo.collection(HANDLE_LIMIT_COLLECTION).await?,
            ip_limits: mongo.collection(IP_LIMIT_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl Store for MongoStore {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    async fn find_or_create_host(&self, name: &str) -> Result<HostDoc> {
        let fresh = HostDoc::new(name);
        let host = self
            .hosts
            .upsert_if(
                doc! { "name": &fresh.name },
                doc! {
                    "$setOnInsert": {
                        "_id": fresh._id,
                        "location": "",
                        "created_at": fresh.created_at,
                    }
                },
            )
            .await?;

        match host {
            Some(host) => Ok(host),
            // Two first references raced on the unique name; the winner's row is there now
            None => self
                .hosts
                .find_one(doc! { "name": &fresh.name })
                .await?
                .ok_or_else(|| ImpError::Database(format!("Host {} vanished", fresh.name))),
        }
    }

    async fn set_host_location(&self, host_id: ObjectId, location: &str) -> Result<()> {
        self.hosts
            .update_one(
                doc! { "_id": host_id },
                doc! { "$set": { "location": location } },
                false,
            )
            .await?;
        Ok(())
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserDoc>> {
        self.users
            .find_one(doc! { "handle_key": handle_key(handle) })
            .await
    }

    async fn find_user_by_handle_or_email(&self, identifier: &str) -> Result<Option<UserDoc>> {
        let key = handle_key(identifier);
        self.users
            .find_one(doc! { "$or": [ { "handle_key": &key }, { "email": &key } ] })
            .await
    }

    async fn insert_user(&self, user: &UserDoc) -> Result<()> {
        self.users.insert_one(user).await.map_err(|e| match e {
            ImpError::Conflict(_) => ImpError::Conflict("That handle is already taken.".into()),
            other => other,
        })
    }

    async fn insert_token(&self, token: &UserTokenDoc) -> Result<()> {
        self.tokens.insert_one(token).await
    }

    async fn find_token(&self, token: &str) -> Result<Option<UserTokenDoc>> {
        self.tokens.find_one(doc! { "token": token }).await
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        self.tokens.delete_one(doc! { "token": token }).await?;
        Ok(())
    }

    async fn insert_note(&self, note: &NoteDoc) -> Result<()> {
        self.notes.insert_one(note).await
    }

    async fn find_note(&self, note_id: ObjectId) -> Result<Option<NoteDoc>> {
        self.notes
            .find_one(doc! { "_id": note_id, "is_deleted": false })
            .await
    }

    async fn list_notes(&self, user_id: ObjectId, query: &NoteQuery) -> Result<Vec<NoteDoc>> {
        let mut filter = doc! { "user_id": user_id, "is_deleted": false };

        let mut id_range = doc! {};
        if let Some(id) = query.since_id {
            id_range.insert("$gt", id);
        }
        if let Some(id) = query.before_id {
            id_range.insert("$lt", id);
        }
        if !id_range.is_empty() {
            filter.insert("_id", id_range);
        }

        let mut date_range = doc! {};
        if let Some(at) = query.since {
            date_range.insert("$gt", at);
        }
        if let Some(at) = query.before {
            date_range.insert("$lt", at);
        }
        if !date_range.is_empty() {
            filter.insert("created_at", date_range);
        }

        self.notes
            .find_many(filter, doc! { "_id": -1 }, query.limit)
            .await
    }

    async fn edit_note(&self, note_id: ObjectId, text: &str) -> Result<Option<NoteDoc>> {
        self.notes
            .find_one_and_update(
                doc! { "_id": note_id, "is_deleted": false },
                doc! { "$set": { "text": text, "is_edited": true } },
                false,
            )
            .await
    }

    async fn delete_note(&self, note_id: ObjectId) -> Result<bool> {
        let result = self
            .notes
            .update_one(
                doc! { "_id": note_id, "is_deleted": false },
                doc! { "$set": { "is_deleted": true } },
                false,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn find_user_host(
        &self,
        user_id: ObjectId,
        host_id: ObjectId,
    ) -> Result<Option<UserHostDoc>> {
        self.user_hosts
            .find_one(doc! { "user_id": user_id, "host_id": host_id })
            .await
    }

    async fn claim_user_host(&self, pending: &UserHostDoc, stale_before: DateTime) -> Result<bool> {
        let claimed = self
            .user_hosts
            .upsert_if(
                doc! {
                    "user_id": pending.user_id,
                    "host_id": pending.host_id,
                    "token": "",
                    "created_at": { "$lt": stale_before },
                },
                doc! {
                    "$set": {
                        "nonce": &pending.nonce,
                        "created_at": pending.created_at,
                    }
                },
            )
            .await?;
        Ok(claimed.is_some())
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
        let placed = self
            .user_hosts
            .find_one_and_update(
                doc! { "user_id": user_id, "host_id": host_id, "nonce": nonce },
                doc! { "$set": { "nonce": "", "token": token } },
                false,
            )
            .await?;
        Ok(placed.is_some())
    }

    async fn find_guest(&self, handle: &str, host_id: ObjectId) -> Result<Option<GuestDoc>> {
        self.guests
            .find_one(doc! { "handle_key": handle_key(handle), "host_id": host_id })
            .await
    }

    async fn claim_guest_request(
        &self,
        handle: &str,
        host_id: ObjectId,
        now: DateTime,
        stale_before: DateTime,
    ) -> Result<bool> {
        let claimed = self
            .guests
            .upsert_if(
                doc! {
                    "handle_key": handle_key(handle),
                    "host_id": host_id,
                    "requested_at": { "$lt": stale_before },
                },
                doc! {
                    "$set": { "requested_at": now },
                    "$setOnInsert": { "handle": handle, "token": "" },
                },
            )
            .await?;
        Ok(claimed.is_some())
    }

    async fn store_guest_token(
        &self,
        handle: &str,
        host_id: ObjectId,
        token: &str,
        now: DateTime,
    ) -> Result<()> {
        self.guests
            .update_one(
                doc! { "handle_key": handle_key(handle), "host_id": host_id },
                doc! {
                    "$set": { "token": token, "created_at": now },
                    "$setOnInsert": { "handle": handle, "requested_at": now },
                },
                true,
            )
            .await?;
        Ok(())
    }

    async fn find_handle_limit(&self, handle_key: &str) -> Result<Option<HandleLimitDoc>> {
        self.handle_limits
            .find_one(doc! { "handle_key": handle_key })
            .await
    }

    async fn bump_handle_limit(
        &self,
        handle_key: &str,
        now: DateTime,
        max_delay_secs: i64,
    ) -> Result<HandleLimitDoc> {
        // Field references inside one $set stage see the pre-update values
        let pipeline = vec![doc! {
            "$set": {
                "next_delay_secs": {
                    "$cond": [
                        { "$gt": [ { "$ifNull": [ "$attempt_count", 0_i64 ] }, 0_i64 ] },
                        { "$min": [ { "$multiply": [ "$next_delay_secs", 2_i64 ] }, max_delay_secs ] },
                        1_i64,
                    ]
                },
                "attempt_count": { "$add": [ { "$ifNull": [ "$attempt_count", 0_i64 ] }, 1_i64 ] },
                "last_attempt_at": now,
            }
        }];

        let limit = self
            .handle_limits
            .find_one_and_update(doc! { "handle_key": handle_key }, pipeline, true)
            .await?;

        debug!(handle = %handle_key, "Recorded failed login attempt");
        limit.ok_or_else(|| ImpError::Database("Handle limit upsert returned nothing".into()))
    }

    async fn clear_handle_limit(&self, handle_key: &str) -> Result<()> {
        self.handle_limits
            .delete_one(doc! { "handle_key": handle_key })
            .await?;
        Ok(())
    }

    async fn find_ip_limit(&self, ip: &str) -> Result<Option<IpLimitDoc>> {
        self.ip_limits.find_one(doc! { "ip": ip }).await
    }

    async fn record_login_attempt(&self, ip: &str, now: DateTime, daily_quota: i64) -> Result<()> {
        self.ip_limits
            .update_one(
                doc! { "ip": ip },
                doc! {
                    "$set": { "last_login_attempt_at": now },
                    "$setOnInsert": { "users_allowed": daily_quota },
                },
                true,
            )
            .await?;
        Ok(())
    }

    async fn consume_new_user_quota(
        &self,
        ip: &str,
        now: DateTime,
        daily_quota: i64,
        window_secs: i64,
    ) -> Result<IpLimitDoc> {
        let window_over = doc! {
            "$lte": [ { "$ifNull": [ "$count_reset_at", DateTime::from_millis(0) ] }, now ]
        };
        let pipeline = vec![doc! {
            "$set": {
                "users_allowed": {
                    "$cond": [
                        window_over.clone(),
                        daily_quota - 1,
                        { "$subtract": [ { "$ifNull": [ "$users_allowed", daily_quota ] }, 1_i64 ] },
                    ]
                },
                "count_reset_at": {
                    "$cond": [ window_over, add_secs(now, window_secs), "$count_reset_at" ]
                },
            }
        }];

        self.ip_limits
            .find_one_and_update(doc! { "ip": ip }, pipeline, true)
            .await?
            .ok_or_else(|| ImpError::Database("IP limit upsert returned nothing".into()))
    }
}
