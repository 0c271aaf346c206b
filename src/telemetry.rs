//! 日志初始化
//! 结构化日志输出；启动时记录一份安全配置摘要，便于事后审计
//! 当时生效的轮换/绑定/限流参数

use crate::config::AuthConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 初始化结构化日志
///
/// 过滤器优先取 `RUST_LOG`，否则用配置的级别并压低 sqlx 的噪音。
/// 重复调用安全：全局 subscriber 已存在时静默返回（测试会多次初始化）。
pub fn init_telemetry(config: &AuthConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.logging.level)));

    let log_layer = match config.logging.format.to_lowercase().as_str() {
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed(),
    };

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    // 安全配置摘要：值得留痕的开关，不含任何密钥
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        rotation_enabled = config.security.rotation_enabled,
        reuse_detection_enabled = config.security.reuse_detection_enabled,
        device_binding_enabled = config.security.device_binding_enabled,
        rate_limit_max_attempts = config.rate_limit.max_attempts,
        rate_limit_window_ms = config.rate_limit.window_ms,
        brute_force_enabled = config.brute_force.enabled,
        "Telemetry initialized"
    );
}
