//! Rate limiter
//!
//! Two independent throttles guard the credential-issuing endpoints:
//! - per handle: exponential backoff after failed logins, keyed on the
//!   handle exactly as typed so unknown handles cost the same as real ones
//! - per IP: a flat interval between login attempts, and a daily quota of
//!   new accounts
//!
//! All state lives in the store; the limiter itself holds no counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db::schemas::handle_key;
use crate::store::Store;
use crate::types::Result;

/// Length of the new-account quota window
pub const QUOTA_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Outcome of a limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    Allowed,
    Denied { retry_after_secs: i64 },
}

impl Throttle {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Throttle::Allowed)
    }
}

/// Limiter policy
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub new_users_per_ip_per_day: i64,
    pub login_ip_interval_secs: i64,
    pub max_login_delay_secs: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            new_users_per_ip_per_day: 24,
            login_ip_interval_secs: 1,
            max_login_delay_secs: QUOTA_WINDOW_SECS,
        }
    }
}

impl From<&crate::config::Args> for LimitsConfig {
    fn from(args: &crate::config::Args) -> Self {
        Self {
            new_users_per_ip_per_day: args.new_users_per_ip_per_day,
            login_ip_interval_secs: args.login_ip_interval_secs,
            max_login_delay_secs: args.max_login_delay_secs,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    config: LimitsConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, config: LimitsConfig) -> Self {
        Self { store, config }
    }

    // -------------------------------------------------------------------------
    // Per-handle backoff
    // -------------------------------------------------------------------------

    /// Whether a login for `handle` may be attempted at `now`.
    ///
    /// With no recorded failures the floor delay of one second applies, which
    /// an absent row can never violate.
    pub async fn check_handle(&self, handle: &str, now: DateTime<Utc>) -> Result<Throttle> {
        let Some(limit) = self.store.find_handle_limit(&handle_key(handle)).await? else {
            return Ok(Throttle::Allowed);
        };

        let allowed_at = limit.last_attempt_at.timestamp_millis() + limit.next_delay_secs * 1000;
        Ok(wait_until(allowed_at, now))
    }

    /// Record a failed attempt for `handle`: increment the count, double the
    /// delay and stamp `now` in one upsert. Returns the delay now in force.
    pub async fn record_handle_failure(&self, handle: &str, now: DateTime<Utc>) -> Result<i64> {
        let limit = self
            .store
            .bump_handle_limit(
                &handle_key(handle),
                bson::DateTime::from_chrono(now),
                self.config.max_login_delay_secs,
            )
            .await?;

        debug!(
            handle = %handle,
            attempts = limit.attempt_count,
            delay = limit.next_delay_secs,
            "Handle backoff raised"
        );
        Ok(limit.next_delay_secs)
    }

    /// Forget all failures for `handle` after a successful login
    pub async fn clear_handle(&self, handle: &str) -> Result<()> {
        self.store.clear_handle_limit(&handle_key(handle)).await
    }

    // -------------------------------------------------------------------------
    // Per-IP throttles
    // -------------------------------------------------------------------------

    /// Flat throttle between login attempts from one address
    pub async fn check_login_ip(&self, ip: &str, now: DateTime<Utc>) -> Result<Throttle> {
        let last = self
            .store
            .find_ip_limit(ip)
            .await?
            .and_then(|limit| limit.last_login_attempt_at);

        Ok(match last {
            Some(last) => wait_until(
                last.timestamp_millis() + self.config.login_ip_interval_secs * 1000,
                now,
            ),
            None => Throttle::Allowed,
        })
    }

    pub async fn record_login_attempt(&self, ip: &str, now: DateTime<Utc>) -> Result<()> {
        self.store
            .record_login_attempt(
                ip,
                bson::DateTime::from_chrono(now),
                self.config.new_users_per_ip_per_day,
            )
            .await
    }

    /// Whether another account may be created from `ip` at `now`
    pub async fn check_new_user_ip(&self, ip: &str, now: DateTime<Utc>) -> Result<Throttle> {
        let Some(limit) = self.store.find_ip_limit(ip).await? else {
            return Ok(Throttle::Allowed);
        };

        match limit.count_reset_at {
            Some(reset) if limit.users_allowed <= 0 => Ok(wait_until(reset.timestamp_millis(), now)),
            _ => Ok(Throttle::Allowed),
        }
    }

    /// Spend one unit of the daily new-account quota for `ip`.
    /// Returns the allowance left in the current window.
    pub async fn consume_new_user_quota(&self, ip: &str, now: DateTime<Utc>) -> Result<i64> {
        let limit = self
            .store
            .consume_new_user_quota(
                ip,
                bson::DateTime::from_chrono(now),
                self.config.new_users_per_ip_per_day,
                QUOTA_WINDOW_SECS,
            )
            .await?;
        Ok(limit.users_allowed)
    }
}

/// Denied until `allowed_at_millis`, rounded up to whole seconds
fn wait_until(allowed_at_millis: i64, now: DateTime<Utc>) -> Throttle {
    let remaining = allowed_at_millis - now.timestamp_millis();
    if remaining > 0 {
        Throttle::Denied {
            retry_after_secs: (remaining + 999) / 1000,
        }
    } else {
        Throttle::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), LimitsConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_handle_is_allowed() {
        let limiter = limiter();
        assert!(limiter.check_handle("ghost", t0()).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_backoff_doubles_per_failure() {
        let limiter = limiter();
        let mut now = t0();

        for expected in [1, 2, 4] {
            assert!(limiter.check_handle("alice", now).await.unwrap().is_allowed());
            let delay = limiter.record_handle_failure("alice", now).await.unwrap();
            assert_eq!(delay, expected);

            let early = now + Duration::milliseconds(expected * 1000 - 1);
            assert_eq!(
                limiter.check_handle("alice", early).await.unwrap(),
                Throttle::Denied { retry_after_secs: 1 }
            );

            now += Duration::seconds(expected);
        }

        // A fourth failure doubles the wait again
        limiter.record_handle_failure("alice", now).await.unwrap();
        assert_eq!(
            limiter.check_handle("alice", now).await.unwrap(),
            Throttle::Denied { retry_after_secs: 8 }
        );
    }

    #[tokio::test]
    async fn test_backoff_is_case_insensitive_and_capped() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(
            store,
            LimitsConfig {
                max_login_delay_secs: 3,
                ..LimitsConfig::default()
            },
        );

        let now = t0();
        limiter.record_handle_failure("Bob", now).await.unwrap();
        limiter.record_handle_failure("bob", now).await.unwrap();
        let delay = limiter.record_handle_failure("BOB", now).await.unwrap();
        assert_eq!(delay, 3);
    }

    #[tokio::test]
    async fn test_clear_resets_backoff() {
        let limiter = limiter();
        let now = t0();
        for _ in 0..5 {
            limiter.record_handle_failure("alice", now).await.unwrap();
        }
        assert!(!limiter.check_handle("alice", now).await.unwrap().is_allowed());

        limiter.clear_handle("alice").await.unwrap();
        assert!(limiter.check_handle("alice", now).await.unwrap().is_allowed());

        // Next failure starts over at the floor
        assert_eq!(limiter.record_handle_failure("alice", now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_ip_interval() {
        let limiter = limiter();
        let now = t0();
        assert!(limiter.check_login_ip("10.0.0.1", now).await.unwrap().is_allowed());

        limiter.record_login_attempt("10.0.0.1", now).await.unwrap();
        let soon = now + Duration::milliseconds(500);
        assert!(!limiter.check_login_ip("10.0.0.1", soon).await.unwrap().is_allowed());
        assert!(limiter.check_login_ip("10.0.0.2", soon).await.unwrap().is_allowed());

        let later = now + Duration::seconds(1);
        assert!(limiter.check_login_ip("10.0.0.1", later).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_new_user_quota_and_reset() {
        let limiter = limiter();
        let ip = "192.0.2.7";
        let start = t0();

        for i in 0..24 {
            let now = start + Duration::minutes(i);
            assert!(limiter.check_new_user_ip(ip, now).await.unwrap().is_allowed());
            limiter.consume_new_user_quota(ip, now).await.unwrap();
        }

        let now = start + Duration::hours(1);
        assert!(!limiter.check_new_user_ip(ip, now).await.unwrap().is_allowed());

        // Window ends 24h after the first account
        let after_reset = start + Duration::hours(24);
        assert!(limiter.check_new_user_ip(ip, after_reset).await.unwrap().is_allowed());
        let left = limiter.consume_new_user_quota(ip, after_reset).await.unwrap();
        assert_eq!(left, 23);
    }

    #[tokio::test]
    async fn test_exactly_one_more_after_reset_with_small_quota() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryStore::new()),
            LimitsConfig {
                new_users_per_ip_per_day: 1,
                ..LimitsConfig::default()
            },
        );
        let ip = "192.0.2.8";
        let start = t0();

        limiter.consume_new_user_quota(ip, start).await.unwrap();
        assert!(!limiter.check_new_user_ip(ip, start).await.unwrap().is_allowed());

        let after_reset = start + Duration::hours(25);
        assert!(limiter.check_new_user_ip(ip, after_reset).await.unwrap().is_allowed());
        limiter.consume_new_user_quota(ip, after_reset).await.unwrap();
        assert!(!limiter.check_new_user_ip(ip, after_reset).await.unwrap().is_allowed());
    }
}
