//! 凭据生命周期与限流引擎
//! 提供访问/刷新令牌的签发、轮换、重放检测与吊销，
//! 以及按标识限流 + 按账户防爆破锁定的决策引擎

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;
