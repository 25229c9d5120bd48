//! Guest handshake
//!
//! Three entry points, each finishing out-of-band:
//!
//! - Flow A, [`GuestService::request_host_token`]: a local user asks for a
//!   token on a peer. We mark the (user, host) pair pending with a fresh nonce,
//!   answer 202, then ask the peer's `/guest` to issue a token.
//! - Flow B, [`GuestService::place_host_token`]: the peer delivers that token.
//!   Possession of the pending nonce is the only credential accepted.
//! - Flow C, [`GuestService::request_guest_token`]: the mirror of Flow A from
//!   the peer's side. We mint a token, answer 202, deliver it to the peer's
//!   `/user/{handle}/host`, and persist it only after the peer accepts it.
//!
//! The pending mark is committed before any callback is dispatched, and the
//! conditional claim in the store guarantees at most one pending handshake
//! per identity however many requests race.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hyper::StatusCode;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::peer::{GuestRequestForm, PeerClient, PlaceTokenForm};
use super::tasks::CallbackRunner;
use crate::auth::random_token;
use crate::db::schemas::{UserHostDoc, UserTokenDoc};
use crate::hosts::HostDirectory;
use crate::store::{add_secs, Store};
use crate::types::{ImpError, Result};

const NO_SUCH_USER: &str = "There is no user with that handle.";
const NOT_REQUESTED: &str = "The user did not request a guest token.";

/// Handshake settings
#[derive(Debug, Clone)]
pub struct GuestConfig {
    /// Our own identity, sent to peers as `host`
    pub api_host: String,
    /// A repeat request inside this window is refused
    pub pending_window: Duration,
}

/// Result of Flow A
#[derive(Debug)]
pub enum HostTokenOutcome {
    /// A token is already held for this host
    Ready { host: String, token: String },
    /// Handshake started; the handle tracks the background completion
    Accepted(JoinHandle<()>),
}

pub struct GuestService {
    store: Arc<dyn Store>,
    directory: Arc<HostDirectory>,
    peer: Arc<dyn PeerClient>,
    runner: CallbackRunner,
    config: GuestConfig,
}

impl GuestService {
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<HostDirectory>,
        peer: Arc<dyn PeerClient>,
        runner: CallbackRunner,
        config: GuestConfig,
    ) -> Self {
        Self {
            store,
            directory,
            peer,
            runner,
            config,
        }
    }

    pub fn runner(&self) -> &CallbackRunner {
        &self.runner
    }

    /// Pending rows created before this instant have expired
    fn stale_before(&self, now: DateTime<Utc>) -> bson::DateTime {
        add_secs(
            bson::DateTime::from_chrono(now),
            -(self.config.pending_window.as_secs() as i64),
        )
    }

    // =========================================================================
    // Flow A
    // =========================================================================

    /// Obtain (or start obtaining) a token for `handle` on `hostname`.
    /// `session` must belong to `handle`.
    pub async fn request_host_token(
        &self,
        session: &UserTokenDoc,
        handle: &str,
        hostname: &str,
        now: DateTime<Utc>,
    ) -> Result<HostTokenOutcome> {
        let user = self
            .store
            .find_user_by_handle(handle)
            .await?
            .ok_or_else(|| ImpError::NotFound(NO_SUCH_USER.into()))?;

        if session.user_id != user._id {
            return Err(ImpError::Unauthorized("Unauthorized".into()));
        }

        let host = self.directory.resolve(hostname).await?;

        if let Some(row) = self.store.find_user_host(user._id, host._id).await? {
            if row.has_token() {
                return Ok(HostTokenOutcome::Ready {
                    host: host.name,
                    token: row.token,
                });
            }
        }

        let pending = UserHostDoc::pending(
            user._id,
            host._id,
            random_token(),
            bson::DateTime::from_chrono(now),
        );

        if !self
            .store
            .claim_user_host(&pending, self.stale_before(now))
            .await?
        {
            // Lost to a pending handshake, or a token landed in between
            return match self.store.find_user_host(user._id, host._id).await? {
                Some(row) if row.has_token() => Ok(HostTokenOutcome::Ready {
                    host: host.name,
                    token: row.token,
                }),
                _ => Err(ImpError::too_many("Too many requests for this host.")),
            };
        }

        debug!(handle = %user.handle, host = %host.name, "Guest token request pending");

        let directory = Arc::clone(&self.directory);
        let peer = Arc::clone(&self.peer);
        let form = GuestRequestForm {
            handle: user.handle.clone(),
            host: self.config.api_host.clone(),
            nonce: pending.nonce,
        };
        let mut host = host;

        let completion = self.runner.spawn("request_guest", async move {
            let location = match directory.locate(&mut host).await {
                Ok(location) => location,
                Err(e) => {
                    warn!(host = %host.name, error = %e, "Host discovery failed");
                    return;
                }
            };

            match peer.request_guest(&location, &form).await {
                Ok(reply) if reply.status == StatusCode::ACCEPTED.as_u16() => {
                    debug!(host = %host.name, handle = %form.handle, "Peer accepted guest request");
                }
                Ok(reply) => warn!(
                    host = %host.name,
                    status = reply.status,
                    body = %reply.body,
                    "Peer refused guest request"
                ),
                Err(e) => warn!(host = %host.name, error = %e, "Guest request failed"),
            }
        });

        Ok(HostTokenOutcome::Accepted(completion))
    }

    // =========================================================================
    // Flow B
    // =========================================================================

    /// Accept a token a peer issued for local user `handle`
    pub async fn place_host_token(&self, handle: &str, form: &PlaceTokenForm) -> Result<()> {
        let hostname = required(&form.host, "Host is missing.")?;
        let token = required(&form.token, "Token is missing.")?;
        let nonce = required(&form.nonce, "Nonce is missing.")?;

        let user = self
            .store
            .find_user_by_handle(handle)
            .await?
            .ok_or_else(|| ImpError::NotFound(NO_SUCH_USER.into()))?;

        let host = self.directory.resolve(hostname).await?;

        if !self
            .store
            .place_user_host_token(user._id, host._id, nonce, token)
            .await?
        {
            debug!(handle = %user.handle, host = %host.name, "Token placement with unknown nonce");
            return Err(ImpError::Unauthorized(NOT_REQUESTED.into()));
        }

        info!(handle = %user.handle, host = %host.name, "Host token placed");
        Ok(())
    }

    // =========================================================================
    // Flow C
    // =========================================================================

    /// Issue a guest token for a peer's user, delivered back to the peer
    pub async fn request_guest_token(
        &self,
        form: &GuestRequestForm,
        now: DateTime<Utc>,
    ) -> Result<JoinHandle<()>> {
        let handle = required(&form.handle, "Handle is missing.")?.to_string();
        let hostname = required(&form.host, "Host is missing.")?;
        let nonce = required(&form.nonce, "Nonce is missing.")?.to_string();

        let host = self.directory.resolve(hostname).await?;

        if !self
            .store
            .claim_guest_request(
                &handle,
                host._id,
                bson::DateTime::from_chrono(now),
                self.stale_before(now),
            )
            .await?
        {
            return Err(ImpError::too_many("Too many requests for this guest."));
        }

        // Minted now, persisted only once the peer accepts it
        let token = random_token();

        let store = Arc::clone(&self.store);
        let directory = Arc::clone(&self.directory);
        let peer = Arc::clone(&self.peer);
        let api_host = self.config.api_host.clone();
        let mut host = host;

        Ok(self.runner.spawn("place_token", async move {
            let location = match directory.locate(&mut host).await {
                Ok(location) => location,
                Err(e) => {
                    warn!(host = %host.name, error = %e, "Host discovery failed");
                    return;
                }
            };

            let placement = PlaceTokenForm {
                host: api_host,
                token,
                nonce,
            };

            match peer.place_token(&location, &handle, &placement).await {
                Ok(reply) if reply.status == StatusCode::OK.as_u16() => {
                    let stored = store
                        .store_guest_token(
                            &handle,
                            host._id,
                            &placement.token,
                            bson::DateTime::from_chrono(Utc::now()),
                        )
                        .await;
                    match stored {
                        Ok(()) => info!(handle = %handle, host = %host.name, "Guest token issued"),
                        Err(e) => warn!(
                            handle = %handle,
                            host = %host.name,
                            error = %e,
                            "Failed to persist confirmed guest token"
                        ),
                    }
                }
                Ok(reply) => warn!(
                    handle = %handle,
                    host = %host.name,
                    status = reply.status,
                    body = %reply.body,
                    "Peer refused guest token"
                ),
                Err(e) => warn!(handle = %handle, host = %host.name, error = %e, "Token delivery failed"),
            }
        }))
    }
}

fn required<'a>(value: &'a str, message: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(ImpError::Validation(message.to_string()))
    } else {
        Ok(value)
    }
}
