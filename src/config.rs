//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息；
//! 过期时间字符串（"15m"、"7d"）在加载时解析校验，而非签发时才失败

use chrono::Duration;
use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// 访问令牌密钥（使用 Secret 包装，防止日志泄露）
    pub access_secret: Secret<String>,
    /// 刷新令牌密钥（必须与访问令牌密钥不同）
    pub refresh_secret: Secret<String>,
    /// 访问令牌有效期，例如 "15m"
    pub access_expiry: String,
    /// 刷新令牌有效期，例如 "7d"
    pub refresh_expiry: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// 刷新时轮换刷新令牌
    pub rotation_enabled: bool,
    /// 检测已使用刷新令牌的重放
    pub reuse_detection_enabled: bool,
    /// 将刷新令牌绑定到设备指纹
    pub device_binding_enabled: bool,
    /// 每个账户的最大并发会话数（0 表示不限制）
    pub max_concurrent_sessions: u32,
    /// 是否信任 X-Forwarded-For 头
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// 窗口内的最大尝试次数
    pub max_attempts: u32,
    /// 滑动窗口长度（毫秒）
    pub window_ms: u64,
    /// 超限后的封禁时长（毫秒）
    pub block_duration_ms: u64,
    /// 成功请求不计入窗口
    pub skip_successful: bool,
    /// 失败请求不计入窗口
    pub skip_failed: bool,
    /// 白名单（无条件放行）
    #[serde(default)]
    pub allow_list: Vec<String>,
    /// 黑名单（无条件拒绝）
    #[serde(default)]
    pub deny_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BruteForceConfig {
    /// 是否启用账户级防爆破锁定
    pub enabled: bool,
    /// 触发锁定的失败次数
    pub max_failed_attempts: u32,
    /// 锁定时长（毫秒）
    pub lockout_duration_ms: u64,
    /// 成功后清零失败计数
    pub reset_on_success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// 是否启用告警回调
    pub enabled: bool,
    /// 触发告警的尝试次数阈值
    pub threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    /// 获取连接超时时间（秒）
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_secs() -> u64 {
    30
}

impl DatabaseConfig {
    /// 按配置建立 Postgres 连接池（仅 Postgres 适配器需要）
    pub async fn connect(&self) -> Result<sqlx::PgPool, sqlx::Error> {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(self.acquire_timeout_secs))
            .connect(self.url.expose_secret())
            .await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token: TokenConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub brute_force: BruteForceConfig,
    pub alert: AlertConfig,
    /// 仅 Postgres 适配器消费；内存部署无需配置
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
}

/// 解析过期时间字符串，固定单位表: s / m / h / d
///
/// 例如 "30s"、"15m"、"12h"、"7d"。
pub fn parse_expiry(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if value.len() < 2 {
        return Err(ConfigError::Message(format!("Invalid expiry string: {value:?}")));
    }

    let unit = value.chars().last().unwrap_or(' ');
    let amount: i64 = value[..value.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| ConfigError::Message(format!("Invalid expiry amount in {value:?}")))?;

    if amount <= 0 {
        return Err(ConfigError::Message(format!("Expiry must be positive: {value:?}")));
    }

    match unit {
        's' => Ok(Duration::seconds(amount)),
        'm' => Ok(Duration::minutes(amount)),
        'h' => Ok(Duration::hours(amount)),
        'd' => Ok(Duration::days(amount)),
        _ => Err(ConfigError::Message(format!(
            "Invalid expiry unit in {value:?}. Must be one of: s, m, h, d"
        ))),
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms as i64)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::milliseconds(self.block_duration_ms as i64)
    }
}

impl BruteForceConfig {
    pub fn lockout_duration(&self) -> Duration {
        Duration::milliseconds(self.lockout_duration_ms as i64)
    }
}

impl AuthConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("token.access_secret", "change-this-access-secret-min-32-chars!")?
            .set_default("token.refresh_secret", "change-this-refresh-secret-min-32-chars!")?
            .set_default("token.access_expiry", "15m")?
            .set_default("token.refresh_expiry", "7d")?
            .set_default("security.rotation_enabled", true)?
            .set_default("security.reuse_detection_enabled", true)?
            .set_default("security.device_binding_enabled", false)?
            .set_default("security.max_concurrent_sessions", 0)?
            .set_default("security.trust_proxy", true)?
            .set_default("rate_limit.max_attempts", 10)?
            .set_default("rate_limit.window_ms", 60_000)?
            .set_default("rate_limit.block_duration_ms", 300_000)?
            .set_default("rate_limit.skip_successful", false)?
            .set_default("rate_limit.skip_failed", false)?
            .set_default("brute_force.enabled", true)?
            .set_default("brute_force.max_failed_attempts", 5)?
            .set_default("brute_force.lockout_duration_ms", 1_800_000)?
            .set_default("brute_force.reset_on_success", true)?
            .set_default("alert.enabled", false)?
            .set_default("alert.threshold", 20)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?;

        // 从环境变量加载配置（前缀为 AUTH_）
        settings = settings.add_source(
            Environment::with_prefix("AUTH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("rate_limit.allow_list")
                .with_list_parse_key("rate_limit.deny_list"),
        );

        let config: AuthConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证令牌密钥长度（HS256 至少 32 字符）
        if self.token.access_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "Access token secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.token.refresh_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "Refresh token secret must be at least 32 characters long".to_string(),
            ));
        }

        // 两类令牌必须使用不同的密钥
        if self.token.access_secret.expose_secret() == self.token.refresh_secret.expose_secret() {
            return Err(ConfigError::Message(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }

        // 验证过期时间字符串（在这里失败，而非签发时）
        parse_expiry(&self.token.access_expiry)?;
        parse_expiry(&self.token.refresh_expiry)?;

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证限流配置
        if self.rate_limit.max_attempts < 1 {
            return Err(ConfigError::Message(
                "rate_limit.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.rate_limit.window_ms == 0 || self.rate_limit.block_duration_ms == 0 {
            return Err(ConfigError::Message(
                "rate_limit.window_ms and block_duration_ms must be positive".to_string(),
            ));
        }

        // 验证防爆破配置
        if self.brute_force.max_failed_attempts < 1 {
            return Err(ConfigError::Message(
                "brute_force.max_failed_attempts must be at least 1".to_string(),
            ));
        }

        if self.brute_force.lockout_duration_ms == 0 {
            return Err(ConfigError::Message(
                "brute_force.lockout_duration_ms must be positive".to_string(),
            ));
        }

        // 验证告警阈值
        if self.alert.threshold < 1 {
            return Err(ConfigError::Message(
                "alert.threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
