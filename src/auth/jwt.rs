//! JWT signing and verification
//! Implements the access token + refresh token pair with separate secrets
//! and an explicit `kind` discriminator checked on every verification

use crate::{
    config::{parse_expiry, AuthConfig},
    error::AuthError,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::hash::generate_token_id;

pub const KIND_ACCESS: &str = "access";
pub const KIND_REFRESH: &str = "refresh";

/// Claims carried by access tokens; never persisted
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (account ID)
    pub sub: String,

    /// Credential kind discriminator (always "access")
    pub kind: String,

    /// Identity attributes
    #[serde(default)]
    pub roles: Vec<String>,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// Unique token identifier
    pub jti: String,
}

/// Claims carried by refresh tokens
///
/// `jti` matches the persisted [`RefreshRecord`](crate::models::RefreshRecord)
/// id for audit correlation. `roles` ride along so rotation can reissue an
/// access token without a user lookup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,

    /// Credential kind discriminator (always "refresh")
    pub kind: String,

    pub jti: String,

    /// Device fingerprint hash, present when device binding is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_hash: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    pub iat: i64,

    pub exp: i64,
}

/// Signs and verifies both credential kinds
///
/// Stateless; the two kinds use distinct secrets, but verification never
/// relies on which secret happened to validate — the `kind` claim is checked
/// explicitly.
pub struct JwtCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl JwtCodec {
    /// Create the codec from config; rejects short secrets and malformed
    /// expiry strings here rather than at sign time
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let access_secret = config.token.access_secret.expose_secret();
        let refresh_secret = config.token.refresh_secret.expose_secret();

        // Min 32 bytes for HS256
        if access_secret.len() < 32 || refresh_secret.len() < 32 {
            return Err(AuthError::Config("Token secret too short (min 32 chars)".to_string()));
        }

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_expiry: parse_expiry(&config.token.access_expiry)?,
            refresh_expiry: parse_expiry(&config.token.refresh_expiry)?,
        })
    }

    /// Sign an access token
    pub fn sign_access(&self, subject_id: &str, roles: &[String]) -> Result<String, AuthError> {
        let now = Utc::now();
        let expiration = now + self.access_expiry;

        let claims = AccessClaims {
            sub: subject_id.to_string(),
            kind: KIND_ACCESS.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: generate_token_id(),
        };

        encode(&Header::default(), &claims, &self.access_encoding).map_err(|e| {
            tracing::error!("Failed to encode access token: {:?}", e);
            AuthError::Config(format!("Failed to encode access token: {e}"))
        })
    }

    /// Sign a refresh token, returning the token and its `jti`
    pub fn sign_refresh(
        &self,
        subject_id: &str,
        roles: &[String],
        device_hash: Option<String>,
    ) -> Result<(String, String), AuthError> {
        let now = Utc::now();
        let expiration = now + self.refresh_expiry;
        let jti = generate_token_id();

        let claims = RefreshClaims {
            sub: subject_id.to_string(),
            kind: KIND_REFRESH.to_string(),
            jti: jti.clone(),
            device_hash,
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.refresh_encoding).map_err(|e| {
            tracing::error!("Failed to encode refresh token: {:?}", e);
            AuthError::Config(format!("Failed to encode refresh token: {e}"))
        })?;

        Ok((token, jti))
    }

    /// Verify an access token
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        match decode::<AccessClaims>(token, &self.access_decoding, &validation) {
            Ok(data) => {
                if data.claims.kind != KIND_ACCESS {
                    tracing::debug!(kind = %data.claims.kind, "Token kind mismatch, expected 'access'");
                    return Err(AuthError::WrongCredentialKind);
                }
                Ok(data.claims)
            }
            Err(e) => Err(self.map_decode_error(token, e, &self.refresh_decoding)),
        }
    }

    /// Verify a refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        match decode::<RefreshClaims>(token, &self.refresh_decoding, &validation) {
            Ok(data) => {
                if data.claims.kind != KIND_REFRESH {
                    tracing::debug!(kind = %data.claims.kind, "Token kind mismatch, expected 'refresh'");
                    return Err(AuthError::WrongCredentialKind);
                }
                Ok(data.claims)
            }
            Err(e) => Err(self.map_decode_error(token, e, &self.access_decoding)),
        }
    }

    /// Map a jsonwebtoken failure to the typed error kinds
    ///
    /// A signature failure is cross-checked against the other kind's key so a
    /// well-formed token of the wrong kind surfaces as `WrongCredentialKind`
    /// instead of a generic malformed error.
    fn map_decode_error(
        &self,
        token: &str,
        error: jsonwebtoken::errors::Error,
        other_kind_key: &DecodingKey,
    ) -> AuthError {
        use jsonwebtoken::errors::ErrorKind;

        match error.kind() {
            ErrorKind::ExpiredSignature => AuthError::CredentialExpired,
            ErrorKind::InvalidSignature => {
                let validation = Validation::new(Algorithm::HS256);
                match decode::<serde_json::Value>(token, other_kind_key, &validation) {
                    Ok(_) => AuthError::WrongCredentialKind,
                    Err(e2) if matches!(e2.kind(), ErrorKind::ExpiredSignature) => {
                        AuthError::WrongCredentialKind
                    }
                    Err(_) => AuthError::MalformedCredential,
                }
            }
            _ => {
                tracing::debug!("Token validation failed: {:?}", error);
                AuthError::MalformedCredential
            }
        }
    }

    /// Seconds until a freshly signed access token expires
    pub fn access_expiry_secs(&self) -> i64 {
        self.access_expiry.num_seconds()
    }

    pub fn refresh_expiry(&self) -> Duration {
        self.refresh_expiry
    }
}
