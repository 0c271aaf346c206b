//! Security checks applied to a refresh attempt
//!
//! Pure decision logic; the destructive consequences (cascade revocation,
//! record deletion) are carried out by the token service.

use chrono::{DateTime, Utc};

use crate::auth::hash::hash_fingerprint;
use crate::auth::jwt::RefreshClaims;
use crate::models::{DeviceInfo, RefreshRecord};

/// Terminal verdict on a single refresh attempt; no check has a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityVerdict {
    Pass,
    /// An already-used token was presented again — evidence of theft
    Replay,
    DeviceMismatch,
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct SecurityChecks {
    pub reuse_detection_enabled: bool,
    pub device_binding_enabled: bool,
}

impl SecurityChecks {
    /// Evaluate the checks in their fixed order: reuse, device binding,
    /// expiry.
    ///
    /// Reuse runs first so a reused-and-expired token still trips the replay
    /// alarm instead of dying quietly as expired.
    pub fn evaluate(
        &self,
        record: &RefreshRecord,
        claims: &RefreshClaims,
        device: Option<&DeviceInfo>,
        now: DateTime<Utc>,
    ) -> SecurityVerdict {
        if self.reuse_detection_enabled && record.used {
            return SecurityVerdict::Replay;
        }

        if self.device_binding_enabled {
            if let Some(expected) = claims.device_hash.as_deref() {
                let presented = device.map(|d| hash_fingerprint(&d.fingerprint));
                if presented.as_deref() != Some(expected) {
                    return SecurityVerdict::DeviceMismatch;
                }
            }
        }

        if record.is_expired(now) {
            return SecurityVerdict::Expired;
        }

        SecurityVerdict::Pass
    }
}
