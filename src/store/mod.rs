//! Storage contracts for refresh token records and rate-limit counters.
//!
//! Services hold no authoritative state of their own; everything lives behind
//! these traits. Any method may fail with `AuthError::Storage` and callers
//! decide whether to surface it or fail open (rate-limit path only).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::{LockoutCounter, RateLimitCounter, RefreshRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgTokenStore;

/// Store for refresh token records.
///
/// Records are keyed by the SHA-256 hash of the signed token value.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new record. The token hash must be unique.
    async fn save(&self, record: &RefreshRecord) -> Result<()>;

    /// Look up a record by token hash. Expired records are still returned
    /// until swept; the caller owns the expiry verdict.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>>;

    /// Atomically flip `used` from false to true.
    ///
    /// Returns false when the record is already used or absent. This is the
    /// load-bearing primitive of rotation: two concurrent refreshes of the
    /// same token must not both observe an unused record.
    async fn claim_if_unused(&self, token_hash: &str) -> Result<bool>;

    /// Delete one record. No-op when absent.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<()>;

    /// Delete every record for a subject, returning how many were removed.
    /// Idempotent: a second call removes nothing and does not fail.
    async fn delete_all_for_subject(&self, subject_id: &str) -> Result<u64>;

    /// Delete the oldest records of a subject beyond `max_sessions`,
    /// returning how many were removed. `max_sessions` of 0 is a no-op.
    async fn prune_to_session_cap(&self, subject_id: &str, max_sessions: u32) -> Result<u64>;

    /// Remove expired records, returning how many were swept. Intended for an
    /// owner-run background task where the backend has no native TTL.
    async fn sweep_expired(&self) -> Result<u64>;
}

/// Store for the two independent throttling tracks: identifier counters and
/// account lockouts.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Current counter for an identifier, if any. Implementations clear
    /// counters whose window and block have both lapsed.
    async fn get_counter(&self, key: &str) -> Result<Option<RateLimitCounter>>;

    /// Atomic increment-and-fetch. Creates the counter (attempts = 1) when
    /// absent or when `window` has elapsed since its first attempt.
    async fn increment_counter(&self, key: &str, window: Duration) -> Result<RateLimitCounter>;

    /// Mark an identifier blocked until the given instant.
    async fn set_blocked_until(&self, key: &str, until: DateTime<Utc>) -> Result<()>;

    /// Unconditionally drop an identifier's counter.
    async fn clear_counter(&self, key: &str) -> Result<()>;

    /// Current lockout state for a subject, if any.
    async fn get_lockout(&self, subject_id: &str) -> Result<Option<LockoutCounter>>;

    /// Atomic failed-attempt increment-and-fetch; `ttl` bounds how long the
    /// entry survives after the last failure.
    async fn increment_lockout(&self, subject_id: &str, ttl: Duration) -> Result<LockoutCounter>;

    /// Mark a subject locked until the given instant.
    async fn set_locked_until(&self, subject_id: &str, until: DateTime<Utc>) -> Result<()>;

    /// Unconditionally drop a subject's lockout state.
    async fn clear_lockout(&self, subject_id: &str) -> Result<()>;
}
