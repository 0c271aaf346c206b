//! HTTP 中间件集成测试
//!
//! 测试限流中间件的放行、拒绝和存储故障时的 fail-open 行为

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use auth_guard::config::{
    AlertConfig, AuthConfig, BruteForceConfig, LoggingConfig, RateLimitConfig,
    SecurityConfig, TokenConfig,
};
use auth_guard::error::{AuthError, Result};
use auth_guard::middleware::{rate_limit_middleware, GuardState};
use auth_guard::models::{LockoutCounter, RateLimitCounter};
use auth_guard::services::RateLimitEngine;
use auth_guard::store::{MemoryStore, RateLimitStore};
use secrecy::Secret;

/// 创建测试配置：3 次 / 1 秒窗口
fn create_test_config() -> AuthConfig {
    AuthConfig {
        token: TokenConfig {
            access_secret: Secret::new("test_access_secret_32_characters!!".to_string()),
            refresh_secret: Secret::new("test_refresh_secret_32_characters!".to_string()),
            access_expiry: "15m".to_string(),
            refresh_expiry: "7d".to_string(),
        },
        security: SecurityConfig {
            rotation_enabled: true,
            reuse_detection_enabled: true,
            device_binding_enabled: false,
            max_concurrent_sessions: 0,
            trust_proxy: true,
        },
        rate_limit: RateLimitConfig {
            max_attempts: 3,
            window_ms: 1_000,
            block_duration_ms: 60_000,
            skip_successful: false,
            skip_failed: false,
            allow_list: vec![],
            deny_list: vec![],
        },
        brute_force: BruteForceConfig {
            enabled: true,
            max_failed_attempts: 5,
            lockout_duration_ms: 60_000,
            reset_on_success: true,
        },
        alert: AlertConfig {
            enabled: false,
            threshold: 20,
        },
        database: None,
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
        },
    }
}

/// 所有操作都失败的限流存储，用于模拟后端故障
struct FailingStore;

#[async_trait]
impl RateLimitStore for FailingStore {
    async fn get_counter(&self, _key: &str) -> Result<Option<RateLimitCounter>> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn increment_counter(&self, _key: &str, _window: Duration) -> Result<RateLimitCounter> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn set_blocked_until(&self, _key: &str, _until: DateTime<Utc>) -> Result<()> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn clear_counter(&self, _key: &str) -> Result<()> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn get_lockout(&self, _subject_id: &str) -> Result<Option<LockoutCounter>> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn increment_lockout(&self, _subject_id: &str, _ttl: Duration) -> Result<LockoutCounter> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn set_locked_until(&self, _subject_id: &str, _until: DateTime<Utc>) -> Result<()> {
        Err(AuthError::Storage("injected outage".to_string()))
    }

    async fn clear_lockout(&self, _subject_id: &str) -> Result<()> {
        Err(AuthError::Storage("injected outage".to_string()))
    }
}

async fn ok_handler() -> &'static str {
    "ok"
}

fn build_app(engine: Arc<RateLimitEngine>, trust_proxy: bool) -> Router {
    let state = Arc::new(GuardState {
        rate_limiter: engine,
        trust_proxy,
    });

    Router::new()
        .route("/login", get(ok_handler))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}

fn request_from(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/login")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_request_under_the_limit_passes() {
    let config = create_test_config();
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));
    let app = build_app(engine, true);

    let response = app.oneshot(request_from("192.0.2.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_blocked_identifier_gets_429_with_retry_after() {
    let config = create_test_config();
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));

    for _ in 0..3 {
        engine.record("192.0.2.1", None, false).await.unwrap();
    }

    let app = build_app(engine, true);
    let response = app.oneshot(request_from("192.0.2.1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get("retry-after")
        .expect("Retry-After on 429")
        .to_str()
        .unwrap()
        .parse::<i64>()
        .unwrap();
    assert!(retry_after >= 1);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], 429);
}

#[tokio::test]
async fn test_block_scopes_to_the_offending_ip() {
    let config = create_test_config();
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));

    for _ in 0..3 {
        engine.record("192.0.2.1", None, false).await.unwrap();
    }

    let app = build_app(engine, true);
    let response = app.oneshot(request_from("198.51.100.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_untrusted_proxy_ignores_forwarded_header() {
    let config = create_test_config();
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));

    for _ in 0..3 {
        engine.record("192.0.2.1", None, false).await.unwrap();
    }

    // trust_proxy 关闭时头内的被封 IP 不生效，回退到回环地址
    let app = build_app(engine, false);
    let response = app.oneshot(request_from("192.0.2.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_deny_listed_ip_gets_429() {
    let mut config = create_test_config();
    config.rate_limit.deny_list = vec!["192.0.2.66".to_string()];
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));

    let app = build_app(engine, true);
    let response = app.oneshot(request_from("192.0.2.66")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_middleware_alone_moves_the_counters() {
    let config = create_test_config();
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));
    let app = build_app(engine, true);

    // 不手动调用 record：中间件自己按响应状态计数
    for _ in 0..3 {
        let response = app.clone().oneshot(request_from("192.0.2.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(request_from("192.0.2.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_successful_responses_skippable() {
    let mut config = create_test_config();
    config.rate_limit.skip_successful = true;
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(MemoryStore::new())));
    let app = build_app(engine, true);

    for _ in 0..5 {
        let response = app.clone().oneshot(request_from("192.0.2.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let config = create_test_config();
    let engine = Arc::new(RateLimitEngine::new(&config, Arc::new(FailingStore)));

    let app = build_app(engine, true);
    let response = app.oneshot(request_from("192.0.2.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
