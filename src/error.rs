//! 统一错误模型
//! 定义所有错误类型和错误响应格式

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AuthError>;

/// 认证与限流错误类型
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed credential")]
    MalformedCredential,

    #[error("Credential expired")]
    CredentialExpired,

    #[error("Wrong credential kind")]
    WrongCredentialKind,

    #[error("Unknown refresh token")]
    UnknownRefreshToken,

    /// 已使用的刷新令牌被再次出示——视为令牌被盗，已级联吊销该账户全部会话
    #[error("Concurrent usage of refresh token detected")]
    ConcurrentUsageDetected,

    #[error("Device fingerprint mismatch")]
    DeviceMismatch,

    #[error("Rate limit exceeded")]
    RateLimited {
        retry_after_secs: i64,
        reason: String,
    },

    #[error("Account temporarily locked")]
    AccountLocked { retry_after_secs: i64 },

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedCredential
            | AuthError::CredentialExpired
            | AuthError::WrongCredentialKind
            | AuthError::UnknownRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::ConcurrentUsageDetected | AuthError::DeviceMismatch => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } | AuthError::AccountLocked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AuthError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AuthError::MalformedCredential => "Invalid credential".to_string(),
            AuthError::CredentialExpired => "Credential expired".to_string(),
            AuthError::WrongCredentialKind => "Invalid credential".to_string(),
            AuthError::UnknownRefreshToken => "Invalid credential".to_string(),
            AuthError::ConcurrentUsageDetected => "Session revoked".to_string(),
            AuthError::DeviceMismatch => "Device not recognized".to_string(),
            AuthError::RateLimited { reason, .. } => format!("Too many requests: {reason}"),
            AuthError::AccountLocked { .. } => "Account temporarily locked".to_string(),
            AuthError::Storage(_) => "Service temporarily unavailable".to_string(),
            AuthError::Config(_) => "Configuration error".to_string(),
        }
    }

    /// 被限流/锁定时，距离解除的秒数
    pub fn retry_after_secs(&self) -> Option<i64> {
        match self {
            AuthError::RateLimited { retry_after_secs, .. }
            | AuthError::AccountLocked { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs();
        let request_id = uuid::Uuid::new_v4().to_string();

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.user_message(),
                request_id,
            },
        };

        // 记录错误日志
        tracing::error!(
            code = self.code(),
            message = %self,
            request_id = %error_response.error.request_id,
            "Auth error"
        );

        let mut response = (status, Json(error_response)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = secs.max(0).to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// 从 sqlx 错误转换（存储不可用，不吞掉也不重试）
impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AuthError {
    fn from(e: config::ConfigError) -> Self {
        AuthError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::MalformedCredential.code(), 401);
        assert_eq!(AuthError::CredentialExpired.code(), 401);
        assert_eq!(AuthError::UnknownRefreshToken.code(), 401);
        assert_eq!(AuthError::ConcurrentUsageDetected.code(), 403);
        assert_eq!(AuthError::DeviceMismatch.code(), 403);
        assert_eq!(
            AuthError::RateLimited {
                retry_after_secs: 30,
                reason: "rate_limited".to_string()
            }
            .code(),
            429
        );
        assert_eq!(AuthError::AccountLocked { retry_after_secs: 60 }.code(), 429);
        assert_eq!(AuthError::Storage("down".to_string()).code(), 503);
    }

    #[test]
    fn test_retry_after_only_for_throttling() {
        let limited = AuthError::RateLimited {
            retry_after_secs: 30,
            reason: "rate_limited".to_string(),
        };
        assert_eq!(limited.retry_after_secs(), Some(30));
        assert_eq!(AuthError::AccountLocked { retry_after_secs: 60 }.retry_after_secs(), Some(60));
        assert_eq!(AuthError::MalformedCredential.retry_after_secs(), None);
    }

    #[test]
    fn test_user_message_no_sensitive_info() {
        let error = AuthError::Storage("connection refused to 10.0.0.5:5432".to_string());
        let message = error.user_message();
        assert!(!message.contains("10.0.0.5"));
    }
}
