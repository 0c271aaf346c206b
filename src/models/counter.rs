//! Rate-limit and lockout domain models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sliding-window attempt counter, keyed by caller identifier (usually an IP)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitCounter {
    /// Attempts inside the current window only
    pub attempts: u32,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitCounter {
    /// The window restarts once the first attempt in it is older than `window`
    pub fn window_elapsed(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.first_attempt_at > window
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }
}

/// Per-account failed-attempt counter, independent of the identifier track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutCounter {
    pub subject_id: String,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_failed_at: DateTime<Utc>,
}

impl LockoutCounter {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts left in the current window after this one
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after: Option<Duration>,
    pub reason: Option<String>,
}

impl RateLimitDecision {
    pub fn allow(remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at,
            retry_after: None,
            reason: None,
        }
    }

    pub fn deny(reason: &str, retry_after: Option<Duration>, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
            retry_after,
            reason: Some(reason.to_string()),
        }
    }
}

/// Event handed to the injected alert hook when an identifier crosses the
/// alert threshold
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub identifier: String,
    pub subject_id: Option<String>,
    pub attempts: u32,
    pub occurred_at: DateTime<Utc>,
}
