//! 配置加载与校验测试
//!
//! 环境变量是进程级共享状态，所有用例都必须串行执行

use auth_guard::config::AuthConfig;
use secrecy::ExposeSecret;
use serial_test::serial;

const TEST_VARS: &[&str] = &[
    "AUTH_TOKEN__ACCESS_SECRET",
    "AUTH_TOKEN__REFRESH_SECRET",
    "AUTH_TOKEN__ACCESS_EXPIRY",
    "AUTH_TOKEN__REFRESH_EXPIRY",
    "AUTH_SECURITY__DEVICE_BINDING_ENABLED",
    "AUTH_SECURITY__MAX_CONCURRENT_SESSIONS",
    "AUTH_RATE_LIMIT__MAX_ATTEMPTS",
    "AUTH_RATE_LIMIT__ALLOW_LIST",
    "AUTH_RATE_LIMIT__DENY_LIST",
    "AUTH_BRUTE_FORCE__MAX_FAILED_ATTEMPTS",
    "AUTH_DATABASE__URL",
    "AUTH_DATABASE__MAX_CONNECTIONS",
    "AUTH_LOGGING__LEVEL",
    "AUTH_LOGGING__FORMAT",
];

/// 清理所有测试涉及的环境变量
fn clear_test_env() {
    for var in TEST_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_load_without_overrides() {
    clear_test_env();

    let config = AuthConfig::from_env().expect("defaults should load");

    assert_eq!(config.token.access_expiry, "15m");
    assert_eq!(config.token.refresh_expiry, "7d");
    assert!(config.security.rotation_enabled);
    assert!(config.security.reuse_detection_enabled);
    assert!(!config.security.device_binding_enabled);
    assert_eq!(config.security.max_concurrent_sessions, 0);
    assert_eq!(config.rate_limit.max_attempts, 10);
    assert_eq!(config.rate_limit.window_ms, 60_000);
    assert!(config.rate_limit.allow_list.is_empty());
    assert!(config.brute_force.enabled);
    assert_eq!(config.brute_force.max_failed_attempts, 5);
    assert_eq!(config.logging.format, "json");
}

#[test]
#[serial]
fn test_database_section_is_optional() {
    clear_test_env();

    // 内存部署：不导出任何 AUTH_DATABASE__* 也能加载
    let config = AuthConfig::from_env().expect("config loads without a database section");
    assert!(config.database.is_none());
}

#[test]
#[serial]
fn test_database_url_materializes_the_section() {
    clear_test_env();
    std::env::set_var("AUTH_DATABASE__URL", "postgresql://localhost/auth_test");

    let config = AuthConfig::from_env().expect("database section should load");

    let database = config.database.expect("section present when URL is set");
    assert_eq!(database.url.expose_secret(), "postgresql://localhost/auth_test");
    assert_eq!(database.max_connections, 10);
    assert_eq!(database.acquire_timeout_secs, 30);

    clear_test_env();
}

#[test]
#[serial]
fn test_env_overrides_take_effect() {
    clear_test_env();
    std::env::set_var("AUTH_RATE_LIMIT__MAX_ATTEMPTS", "3");
    std::env::set_var("AUTH_TOKEN__ACCESS_EXPIRY", "30m");
    std::env::set_var("AUTH_SECURITY__DEVICE_BINDING_ENABLED", "true");
    std::env::set_var("AUTH_LOGGING__FORMAT", "pretty");

    let config = AuthConfig::from_env().expect("overrides should load");

    assert_eq!(config.rate_limit.max_attempts, 3);
    assert_eq!(config.token.access_expiry, "30m");
    assert!(config.security.device_binding_enabled);
    assert_eq!(config.logging.format, "pretty");

    clear_test_env();
}

#[test]
#[serial]
fn test_comma_separated_lists_parse() {
    clear_test_env();
    std::env::set_var("AUTH_RATE_LIMIT__ALLOW_LIST", "10.0.0.1,10.0.0.2");
    std::env::set_var("AUTH_RATE_LIMIT__DENY_LIST", "203.0.113.7");

    let config = AuthConfig::from_env().expect("lists should parse");

    assert_eq!(config.rate_limit.allow_list, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(config.rate_limit.deny_list, vec!["203.0.113.7"]);

    clear_test_env();
}

#[test]
#[serial]
fn test_secret_is_loaded_from_env() {
    clear_test_env();
    std::env::set_var(
        "AUTH_TOKEN__ACCESS_SECRET",
        "an-overridden-access-secret-of-32-chars!",
    );

    let config = AuthConfig::from_env().expect("secret override should load");
    assert_eq!(
        config.token.access_secret.expose_secret(),
        "an-overridden-access-secret-of-32-chars!"
    );

    clear_test_env();
}

#[test]
#[serial]
fn test_short_secret_is_rejected() {
    clear_test_env();
    std::env::set_var("AUTH_TOKEN__ACCESS_SECRET", "too-short");

    assert!(AuthConfig::from_env().is_err());

    clear_test_env();
}

#[test]
#[serial]
fn test_identical_secrets_are_rejected() {
    clear_test_env();
    let secret = "the-same-secret-for-both-token-kinds!!!!";
    std::env::set_var("AUTH_TOKEN__ACCESS_SECRET", secret);
    std::env::set_var("AUTH_TOKEN__REFRESH_SECRET", secret);

    assert!(AuthConfig::from_env().is_err());

    clear_test_env();
}

#[test]
#[serial]
fn test_malformed_expiry_is_rejected_at_load() {
    clear_test_env();
    std::env::set_var("AUTH_TOKEN__REFRESH_EXPIRY", "7w");

    assert!(AuthConfig::from_env().is_err());

    clear_test_env();
}

#[test]
#[serial]
fn test_invalid_log_level_is_rejected() {
    clear_test_env();
    std::env::set_var("AUTH_LOGGING__LEVEL", "verbose");

    assert!(AuthConfig::from_env().is_err());

    clear_test_env();
}
