//! Time-windowed attempt limiting with progressive lockout
//!
//! Used twice:
//! - login brute-force protection, keyed by normalized identifier
//! - generic per-route throttling, keyed by `client-ip + route`
//!
//! Records live in a sharded concurrent map; each key's read-check-increment
//! runs under that key's shard lock, and a background sweep evicts idle
//! records.

mod attempts;

pub use attempts::{spawn_sweep_task, AttemptLimiter};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Limits for one limiter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Attempts allowed per window; the attempt that reaches this count is denied
    pub max_attempts: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Lock length in milliseconds once `max_attempts` is reached (0 = deny until window resets)
    pub lock_ms: u64,
    /// Records idle for this many windows are swept
    pub idle_windows: u32,
}

impl LimitConfig {
    /// Login protection: 5 attempts per 5 minutes, then a 15 minute lock
    pub const fn login() -> Self {
        Self {
            max_attempts: 5,
            window_ms: 5 * 60 * 1000,
            lock_ms: 15 * 60 * 1000,
            idle_windows: 6,
        }
    }

    /// Generic route throttle: 10 requests per minute, no extended lock
    pub const fn route() -> Self {
        Self {
            max_attempts: 10,
            window_ms: 60 * 1000,
            lock_ms: 0,
            idle_windows: 6,
        }
    }

    pub(crate) fn window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.window_ms as i64)
    }

    pub(crate) fn lock(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.lock_ms as i64)
    }

    pub(crate) fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.window_ms * u64::from(self.idle_windows.max(1))) as i64)
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl Decision {
    fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            locked_until: None,
        }
    }

    fn deny(locked_until: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            locked_until: Some(locked_until),
        }
    }

    /// Seconds until the lock lifts, rounded up (0 if allowed)
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.locked_until {
            Some(until) if until > now => {
                let ms = (until - now).num_milliseconds().max(0) as u64;
                ms.div_ceil(1000).max(1)
            }
            Some(_) => 1,
            None => 0,
        }
    }
}

/// Case-fold and trim an identity so variants share one record
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Key for the generic route throttle
pub fn route_key(client_ip: &str, route: &str) -> String {
    format!("{}|{}", client_ip.trim(), normalize_identity(route))
}
