//! Rate limiter counters
//!
//! `HandleLimitDoc` is keyed on the handle as typed (case-folded), never on a
//! resolved user, so unknown handles back off exactly like real ones.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

pub const HANDLE_LIMIT_COLLECTION: &str = "handle_limits";
pub const IP_LIMIT_COLLECTION: &str = "ip_limits";

/// Failed-login backoff for one handle
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HandleLimitDoc {
    pub handle_key: String,

    /// Consecutive failed attempts
    pub attempt_count: i64,

    pub last_attempt_at: DateTime,

    /// Seconds that must pass after `last_attempt_at`; doubles per failure
    pub next_delay_secs: i64,
}

/// Per-IP login throttle and new-account quota
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IpLimitDoc {
    pub ip: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_attempt_at: Option<DateTime>,

    /// New accounts still allowed in the current window
    pub users_allowed: i64,

    /// When `users_allowed` resets; unset until the first account is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_reset_at: Option<DateTime>,
}

impl IntoIndexes for HandleLimitDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "handle_key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("handle_key_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl IntoIndexes for IpLimitDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "ip": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("ip_unique".to_string())
                    .build(),
            ),
        )]
    }
}
