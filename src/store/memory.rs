//! In-memory store adapter
//!
//! Reference implementation over `DashMap`, used by tests and embedded
//! deployments. Atomicity comes from the per-shard entry locks: `claim_if_unused`
//! and the increment operations mutate under a single entry guard, never as a
//! separate read and write. Expiry is passive (stale entries cleared on read)
//! plus `sweep_expired` for an owner-run background sweep.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::Result;
use crate::models::{LockoutCounter, RateLimitCounter, RefreshRecord};

use super::{RateLimitStore, TokenStore};

struct CounterEntry {
    counter: RateLimitCounter,
    expires_at: DateTime<Utc>,
}

struct LockoutEntry {
    counter: LockoutCounter,
    expires_at: DateTime<Utc>,
}

/// In-memory implementation of both store contracts
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, RefreshRecord>,
    counters: DashMap<String, CounterEntry>,
    lockouts: DashMap<String, LockoutEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live refresh records (diagnostics)
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn save(&self, record: &RefreshRecord) -> Result<()> {
        self.records.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>> {
        Ok(self.records.get(token_hash).map(|r| r.clone()))
    }

    async fn claim_if_unused(&self, token_hash: &str) -> Result<bool> {
        // get_mut holds the shard write lock for the whole check-and-set
        match self.records.get_mut(token_hash) {
            Some(mut record) if !record.used => {
                record.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<()> {
        self.records.remove(token_hash);
        Ok(())
    }

    async fn delete_all_for_subject(&self, subject_id: &str) -> Result<u64> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            if record.subject_id == subject_id {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn prune_to_session_cap(&self, subject_id: &str, max_sessions: u32) -> Result<u64> {
        if max_sessions == 0 {
            return Ok(0);
        }

        let mut sessions: Vec<(String, DateTime<Utc>)> = self
            .records
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .map(|r| (r.token_hash.clone(), r.created_at))
            .collect();

        // Newest first; everything past the cap goes
        sessions.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (hash, _) in sessions.into_iter().skip(max_sessions as usize) {
            if self.records.remove(&hash).is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut swept = 0;
        self.records.retain(|_, record| {
            if record.is_expired(now) {
                swept += 1;
                false
            } else {
                true
            }
        });
        Ok(swept)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get_counter(&self, key: &str) -> Result<Option<RateLimitCounter>> {
        let now = Utc::now();
        let expired = match self.counters.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at < now => true,
            Some(entry) => return Ok(Some(entry.counter.clone())),
        };
        if expired {
            self.counters.remove(key);
        }
        Ok(None)
    }

    async fn increment_counter(&self, key: &str, window: Duration) -> Result<RateLimitCounter> {
        let now = Utc::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                counter: RateLimitCounter {
                    attempts: 0,
                    first_attempt_at: now,
                    last_attempt_at: now,
                    blocked_until: None,
                },
                expires_at: now + window,
            });

        // Stale or window-elapsed counters restart; an active block survives
        if entry.expires_at < now || entry.counter.window_elapsed(now, window) {
            let blocked_until = entry.counter.blocked_until.filter(|until| *until > now);
            entry.counter = RateLimitCounter {
                attempts: 0,
                first_attempt_at: now,
                last_attempt_at: now,
                blocked_until,
            };
        }

        entry.counter.attempts += 1;
        entry.counter.last_attempt_at = now;
        entry.expires_at = (now + window).max(entry.counter.blocked_until.unwrap_or(now));

        Ok(entry.counter.clone())
    }

    async fn set_blocked_until(&self, key: &str, until: DateTime<Utc>) -> Result<()> {
        let now = Utc::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                counter: RateLimitCounter {
                    attempts: 0,
                    first_attempt_at: now,
                    last_attempt_at: now,
                    blocked_until: None,
                },
                expires_at: until,
            });
        entry.counter.blocked_until = Some(until);
        entry.expires_at = entry.expires_at.max(until);
        Ok(())
    }

    async fn clear_counter(&self, key: &str) -> Result<()> {
        self.counters.remove(key);
        Ok(())
    }

    async fn get_lockout(&self, subject_id: &str) -> Result<Option<LockoutCounter>> {
        let now = Utc::now();
        let expired = match self.lockouts.get(subject_id) {
            None => return Ok(None),
            Some(entry) if entry.expires_at < now => true,
            Some(entry) => return Ok(Some(entry.counter.clone())),
        };
        if expired {
            self.lockouts.remove(subject_id);
        }
        Ok(None)
    }

    async fn increment_lockout(&self, subject_id: &str, ttl: Duration) -> Result<LockoutCounter> {
        let now = Utc::now();
        let mut entry = self
            .lockouts
            .entry(subject_id.to_string())
            .or_insert_with(|| LockoutEntry {
                counter: LockoutCounter {
                    subject_id: subject_id.to_string(),
                    failed_attempts: 0,
                    locked_until: None,
                    last_failed_at: now,
                },
                expires_at: now + ttl,
            });

        if entry.expires_at < now {
            entry.counter.failed_attempts = 0;
            entry.counter.locked_until = None;
        }

        entry.counter.failed_attempts += 1;
        entry.counter.last_failed_at = now;
        entry.expires_at = (now + ttl).max(entry.counter.locked_until.unwrap_or(now));

        Ok(entry.counter.clone())
    }

    async fn set_locked_until(&self, subject_id: &str, until: DateTime<Utc>) -> Result<()> {
        let now = Utc::now();
        let mut entry = self
            .lockouts
            .entry(subject_id.to_string())
            .or_insert_with(|| LockoutEntry {
                counter: LockoutCounter {
                    subject_id: subject_id.to_string(),
                    failed_attempts: 0,
                    locked_until: None,
                    last_failed_at: now,
                },
                expires_at: until,
            });
        entry.counter.locked_until = Some(until);
        // The whole entry lapses when the lock does, so a released lock does
        // not instantly re-trip on the stale failure count
        entry.expires_at = until;
        Ok(())
    }

    async fn clear_lockout(&self, subject_id: &str) -> Result<()> {
        self.lockouts.remove(subject_id);
        Ok(())
    }
}
