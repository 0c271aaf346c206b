//! Token domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client device context presented alongside a credential operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Opaque fingerprint computed by the client
    pub fingerprint: String,
    pub source_addr: Option<String>,
    pub user_agent: Option<String>,
}

/// Persisted refresh token record
///
/// The raw token value is never stored; records are keyed by the SHA-256 hash
/// of the signed token. `used` only ever transitions false -> true.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshRecord {
    /// Matches the `jti` claim of the signed refresh token
    pub id: String,
    pub subject_id: String,
    pub token_hash: String,
    pub device_hash: Option<String>,
    pub source_addr: Option<String>,
    pub user_agent: Option<String>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Credential pair returned by issuance and refresh
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}
