//! Credential signing, verification and hashing

pub mod hash;
pub mod jwt;

pub use hash::{generate_token_id, hash_fingerprint, hash_token};
pub use jwt::{AccessClaims, JwtCodec, RefreshClaims, KIND_ACCESS, KIND_REFRESH};
