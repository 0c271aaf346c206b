//! Business logic services layer

pub mod rate_limit_service;
pub mod security;
pub mod token_service;

pub use rate_limit_service::{AlertHook, RateLimitEngine};
pub use security::{SecurityChecks, SecurityVerdict};
pub use token_service::TokenService;
