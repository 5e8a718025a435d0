//! Attempt record store
//!
//! In-memory storage for attempt records with idle eviction.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{normalize_identity, Decision, LimitConfig};
use crate::types::{Result, SurveyError};

/// Per-identity attempt state
#[derive(Debug, Clone)]
struct AttemptRecord {
    count: u32,
    window_start: DateTime<Utc>,
    /// Always >= `window_start` when set
    locked_until: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
}

impl AttemptRecord {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
            locked_until: None,
            last_activity: now,
        }
    }
}

/// Sliding-window attempt limiter
pub struct AttemptLimiter {
    /// Limiter name for logs ("login", "route")
    name: &'static str,
    config: LimitConfig,
    records: DashMap<String, AttemptRecord>,
}

impl AttemptLimiter {
    pub fn new(name: &'static str, config: LimitConfig) -> Self {
        Self {
            name,
            config,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    /// Record an attempt for `identity` and decide whether it may proceed
    pub fn check(&self, identity: &str) -> Decision {
        self.check_at(identity, Utc::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock
    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> Decision {
        let key = normalize_identity(identity);
        let cfg = &self.config;

        // The entry guard holds the shard lock for the whole read-modify-write
        match self.records.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(AttemptRecord::fresh(now));
                Decision::allow(cfg.max_attempts.saturating_sub(1))
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.last_activity = now;

                let lock_elapsed = match record.locked_until {
                    Some(until) if now < until => return Decision::deny(until),
                    Some(_) => true,
                    None => false,
                };

                if lock_elapsed || now - record.window_start > cfg.window() {
                    *record = AttemptRecord::fresh(now);
                    return Decision::allow(cfg.max_attempts.saturating_sub(1));
                }

                record.count = record.count.saturating_add(1);
                if record.count >= cfg.max_attempts {
                    // Without an extended lock the denial lasts until the window closes
                    let until = if cfg.lock_ms == 0 {
                        record.window_start + cfg.window()
                    } else {
                        now + cfg.lock()
                    };
                    record.locked_until = Some(until);
                    warn!(
                        "{} limiter: {} locked until {} after {} attempts",
                        self.name,
                        occupied.key(),
                        until,
                        cfg.max_attempts
                    );
                    Decision::deny(until)
                } else {
                    Decision::allow(cfg.max_attempts - record.count)
                }
            }
        }
    }

    /// Check and convert a denial into [`SurveyError::RateLimited`]
    pub fn enforce(&self, identity: &str) -> Result<Decision> {
        let now = Utc::now();
        let decision = self.check_at(identity, now);
        match decision.locked_until {
            Some(locked_until) if !decision.allowed => Err(SurveyError::RateLimited {
                locked_until,
                retry_after_secs: decision.retry_after_secs(now),
            }),
            _ => Ok(decision),
        }
    }

    /// Forget `identity` entirely (e.g. after a successful login)
    pub fn reset(&self, identity: &str) {
        self.records.remove(&normalize_identity(identity));
    }

    /// Remove records idle longer than the configured threshold
    ///
    /// Records with an active lock are kept regardless of idleness.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let idle = self.config.idle_threshold();
        let before = self.records.len();
        self.records.retain(|_, record| {
            let locked = record.locked_until.is_some_and(|until| now < until);
            locked || now - record.last_activity <= idle
        });
        before.saturating_sub(self.records.len())
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Spawn a background task to periodically sweep idle records
pub fn spawn_sweep_task(limiter: Arc<AttemptLimiter>, interval: Duration) {
    let name = limiter.name;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                debug!("{} limiter sweep: removed {} idle records", limiter.name, removed);
            }
        }
    });
    info!("{} limiter sweep task started ({:?} interval)", name, interval);
}
