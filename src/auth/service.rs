//! Accounts and sessions
//!
//! Login is throttled twice before any password is checked: once per client
//! address (flat interval) and once per handle as typed (doubling backoff).
//! A handle that matches no account is verified against a dummy hash and
//! penalized exactly like a wrong password, so neither timing nor response
//! shape reveals which handles exist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::password::{dummy_hash, hash_password, verify_password};
use super::token::{extract_session_token, random_token};
use crate::db::schemas::{UserDoc, UserTokenDoc};
use crate::limits::{RateLimiter, Throttle};
use crate::store::Store;
use crate::types::{ImpError, Result};

const MAX_HANDLE_LENGTH: usize = 16;
const MIN_PASSWORD_LENGTH: usize = 8;

const BAD_CREDENTIALS: &str =
    "No user was found that matched the handle or email and password given.";

/// Public view of a user; never includes email or password hash
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub handle: String,
    pub status: String,
    pub biography: String,
    pub joined_at: String,
}

impl From<&UserDoc> for UserView {
    fn from(user: &UserDoc) -> Self {
        Self {
            handle: user.handle.clone(),
            status: user.status.clone(),
            biography: user.biography.clone(),
            joined_at: user.joined_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

/// A freshly issued session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: UserView,
    pub token: String,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    limiter: Arc<RateLimiter>,
    dummy_hash: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, limiter: Arc<RateLimiter>) -> Result<Self> {
        Ok(Self {
            store,
            limiter,
            dummy_hash: dummy_hash()?,
        })
    }

    /// Exchange credentials for a session token
    pub async fn login(
        &self,
        handle_or_email: &str,
        password: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let identifier = handle_or_email.trim();
        if identifier.is_empty() {
            return Err(ImpError::Validation("Missing handle or email.".into()));
        }
        if password.is_empty() {
            return Err(ImpError::Validation("Missing password.".into()));
        }

        if let Throttle::Denied { retry_after_secs } = self.limiter.check_login_ip(ip, now).await? {
            return Err(ImpError::RateLimited {
                message: "Too many login attempts from this address.".into(),
                retry_after_secs: Some(retry_after_secs),
            });
        }

        // Keyed on the identifier even when it names no account
        if let Throttle::Denied { retry_after_secs } =
            self.limiter.check_handle(identifier, now).await?
        {
            return Err(ImpError::RateLimited {
                message: "Too many login attempts.".into(),
                retry_after_secs: Some(retry_after_secs),
            });
        }

        let user = self.store.find_user_by_handle_or_email(identifier).await?;
        let hash = user
            .as_ref()
            .map_or(self.dummy_hash.as_str(), |u| u.password_hash.as_str());

        let verified = verify_password(password, hash).unwrap_or_else(|e| {
            warn!(handle = %identifier, error = %e, "Stored password hash is unreadable");
            false
        });

        let user = match user {
            Some(user) if verified && !user.is_disabled => user,
            _ => {
                if let Err(e) = self.limiter.record_handle_failure(identifier, now).await {
                    warn!(handle = %identifier, error = %e, "Failed to record login failure");
                }
                if let Err(e) = self.limiter.record_login_attempt(ip, now).await {
                    warn!(ip = %ip, error = %e, "Failed to record login attempt");
                }
                return Err(ImpError::Unauthorized(BAD_CREDENTIALS.into()));
            }
        };

        self.limiter.clear_handle(identifier).await?;
        let token = self.issue_token(&user).await?;

        info!(handle = %user.handle, "User logged in");
        Ok(Session {
            user: UserView::from(&user),
            token,
        })
    }

    /// Create an account and log it in
    pub async fn register(
        &self,
        handle: &str,
        email: &str,
        password: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if let Throttle::Denied { retry_after_secs } =
            self.limiter.check_new_user_ip(ip, now).await?
        {
            return Err(ImpError::RateLimited {
                message: "Too many new users from this address.".into(),
                retry_after_secs: Some(retry_after_secs),
            });
        }

        let handle = handle.trim();
        validate_handle(handle)?;

        let email = email.trim();
        if !email.contains('@') {
            return Err(ImpError::Validation("Email is invalid.".into()));
        }

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ImpError::Validation(format!(
                "Password must be at least {} characters.",
                MIN_PASSWORD_LENGTH
            )));
        }

        let user = UserDoc::new(handle, email, hash_password(password)?);
        self.store.insert_user(&user).await?;

        let remaining = self.limiter.consume_new_user_quota(ip, now).await?;
        let token = self.issue_token(&user).await?;

        info!(handle = %user.handle, ip = %ip, remaining, "User registered");
        Ok(Session {
            user: UserView::from(&user),
            token,
        })
    }

    /// Invalidate a session token
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.store.delete_token(token).await
    }

    /// Resolve an `Authorization` header to its session
    pub async fn authenticate(&self, header: Option<&str>) -> Result<UserTokenDoc> {
        let token = extract_session_token(header)
            .ok_or_else(|| ImpError::Unauthorized("Unauthorized".into()))?;

        self.store
            .find_token(token)
            .await?
            .ok_or_else(|| ImpError::Unauthorized("Unauthorized".into()))
    }

    async fn issue_token(&self, user: &UserDoc) -> Result<String> {
        let session = UserTokenDoc::new(random_token(), user._id);
        self.store.insert_token(&session).await?;
        Ok(session.token)
    }
}

fn validate_handle(handle: &str) -> Result<()> {
    let valid = !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LENGTH
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ImpError::Validation(format!(
            "Handle must be 1-{} letters, digits or underscores.",
            MAX_HANDLE_LENGTH
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::LimitsConfig;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn service() -> AuthService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::new(store.clone(), LimitsConfig::default()));
        AuthService::new(store, limiter).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let session = auth
            .register("alice", "alice@example.com", "hunter22!", "10.0.0.1", t0())
            .await
            .unwrap();
        assert_eq!(session.user.handle, "alice");

        let login = auth
            .login("ALICE", "hunter22!", "10.0.0.1", t0())
            .await
            .unwrap();
        assert_ne!(login.token, session.token);

        let header = format!("IMP auth={}", login.token);
        assert!(auth.authenticate(Some(&header)).await.is_ok());

        auth.logout(&login.token).await.unwrap();
        assert!(matches!(
            auth.authenticate(Some(&header)).await,
            Err(ImpError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let auth = service();
        let ip = "10.0.0.1";
        for (handle, email, password) in [
            ("", "a@example.com", "longenough"),
            ("has space", "a@example.com", "longenough"),
            ("waytoolonghandle17", "a@example.com", "longenough"),
            ("alice", "not-an-email", "longenough"),
            ("alice", "a@example.com", "short"),
        ] {
            let err = auth.register(handle, email, password, ip, t0()).await.unwrap_err();
            assert!(matches!(err, ImpError::Validation(_)), "{handle} {email}");
        }

        auth.register("alice", "a@example.com", "longenough", ip, t0())
            .await
            .unwrap();
        let err = auth
            .register("Alice", "b@example.com", "longenough", ip, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ImpError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_handle_backs_off_like_real_one() {
        let auth = service();
        let now = t0();

        let err = auth.login("nobody", "whatever1", "10.0.0.1", now).await.unwrap_err();
        assert!(matches!(err, ImpError::Unauthorized(_)));

        // Different address, so only the handle backoff applies
        let err = auth
            .login("nobody", "whatever1", "10.0.0.2", now + Duration::milliseconds(500))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Too many login attempts.");
    }

    #[tokio::test]
    async fn test_ip_throttle_precedes_handle_check() {
        let auth = service();
        let now = t0();
        auth.login("first", "whatever1", "10.0.0.9", now).await.unwrap_err();

        let err = auth
            .login("second", "whatever1", "10.0.0.9", now + Duration::milliseconds(200))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Too many login attempts from this address.");
    }

    #[tokio::test]
    async fn test_success_clears_backoff() {
        let auth = service();
        let now = t0();
        auth.register("bob", "bob@example.com", "correct-horse", "10.0.0.1", now)
            .await
            .unwrap();

        for i in 0..3 {
            let at = now + Duration::seconds(10 * i);
            auth.login("bob", "wrong-horse", &format!("10.1.0.{i}"), at)
                .await
                .unwrap_err();
        }

        let at = now + Duration::seconds(100);
        auth.login("bob", "correct-horse", "10.2.0.1", at).await.unwrap();

        // Immediately after success a wrong password is judged, not throttled
        let err = auth
            .login("bob", "wrong-horse", "10.2.0.2", at)
            .await
            .unwrap_err();
        assert!(matches!(err, ImpError::Unauthorized(_)));
    }
}
