//! Configuration for imp
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// imp - federated social host
///
/// Serves local accounts and lets users of other imp hosts
/// authenticate here as guests.
#[derive(Parser, Debug, Clone)]
#[command(name = "imp")]
#[command(about = "Federated social host with cross-host guest authentication")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Public API location of this host (e.g. "imp.example.com" or "example.com:4114")
    /// Sent to peers as our identity and advertised in every response
    #[arg(long, env = "API_HOST")]
    pub api_host: Option<String>,

    /// API version advertised in the IMP-API-Location header
    #[arg(long, env = "API_VERSION", default_value = "1")]
    pub api_version: String,

    /// Port probed during discovery when the bare domain does not answer
    #[arg(long, env = "IMP_DEFAULT_PORT", default_value = "4114")]
    pub default_port: u16,

    /// Enable development mode (in-memory store fallback, default api host)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "imp")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Pending window for a guest token exchange, in seconds.
    /// A repeat request inside the window is rejected with 429.
    #[arg(long, env = "GUEST_TOKEN_TIMEOUT_SECS", default_value = "30")]
    pub pending_window_secs: u64,

    /// Deadline for one background completion (discovery + callback), in seconds
    #[arg(long, env = "CALLBACK_TIMEOUT_SECS", default_value = "20")]
    pub callback_timeout_secs: u64,

    /// Maximum concurrent background completions
    #[arg(long, env = "CALLBACK_WORKERS", default_value = "16")]
    pub callback_workers: usize,

    /// Maximum advertised-location hops followed during discovery
    #[arg(long, env = "DISCOVERY_MAX_HOPS", default_value = "5")]
    pub discovery_max_hops: usize,

    /// New accounts allowed per client IP per 24 hours
    #[arg(long, env = "NEW_USERS_PER_IP_PER_DAY", default_value = "24")]
    pub new_users_per_ip_per_day: i64,

    /// Minimum seconds between login attempts from one IP
    #[arg(long, env = "LOGIN_IP_INTERVAL_SECS", default_value = "1")]
    pub login_ip_interval_secs: i64,

    /// Ceiling for the doubling per-handle login delay, in seconds
    #[arg(long, env = "MAX_LOGIN_DELAY_SECS", default_value = "86400")]
    pub max_login_delay_secs: i64,
}

impl Args {
    /// Effective public identity of this host (defaults to localhost in dev mode)
    pub fn api_host(&self) -> String {
        match &self.api_host {
            Some(host) => host.trim().trim_end_matches('/').to_lowercase(),
            None => format!("localhost:{}", self.listen.port()),
        }
    }

    /// Value of the IMP-API-Location header, `<version>;<host[:port]>`
    pub fn api_location_header(&self) -> String {
        format!("{};{}", self.api_version, self.api_host())
    }

    pub fn pending_window(&self) -> Duration {
        Duration::from_secs(self.pending_window_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.api_host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err("API_HOST is required in production mode".to_string());
        }

        if self.pending_window_secs == 0 {
            return Err("GUEST_TOKEN_TIMEOUT_SECS must be greater than zero".to_string());
        }

        // A callback that outlives the pending window would race a legitimate retry
        if self.callback_timeout_secs == 0 || self.callback_timeout_secs > self.pending_window_secs {
            return Err(
                "CALLBACK_TIMEOUT_SECS must be between 1 and GUEST_TOKEN_TIMEOUT_SECS".to_string(),
            );
        }

        if self.callback_workers == 0 {
            return Err("CALLBACK_WORKERS must be at least 1".to_string());
        }

        if self.discovery_max_hops == 0 {
            return Err("DISCOVERY_MAX_HOPS must be at least 1".to_string());
        }

        if self.new_users_per_ip_per_day < 1 {
            return Err("NEW_USERS_PER_IP_PER_DAY must be at least 1".to_string());
        }

        if self.login_ip_interval_secs < 0 || self.max_login_delay_secs < 1 {
            return Err("Login throttle intervals must be positive".to_string());
        }

        Ok(())
    }
}
