//! Domain models

pub mod counter;
pub mod token;

pub use counter::{AlertEvent, LockoutCounter, RateLimitCounter, RateLimitDecision};
pub use token::{DeviceInfo, RefreshRecord, TokenPair};
