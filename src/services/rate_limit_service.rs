//! 限流与防爆破决策引擎
//!
//! 两条独立的维度：按调用方标识（通常是 IP）的滑动窗口限流，和按账户的
//! 失败锁定。二者同时评估但从不合并计数——多 IP 攻击单账户仍会累积账户
//! 锁定，单 IP 探测多账户仍会累积地址封禁。

use crate::{
    config::{AlertConfig, AuthConfig, BruteForceConfig, RateLimitConfig},
    error::Result,
    models::{AlertEvent, RateLimitDecision},
    store::RateLimitStore,
};
use chrono::Utc;
use std::sync::Arc;

/// 注入的告警回调；具体投递方式（webhook/邮件）不是这里的关注点
pub type AlertHook = Arc<dyn Fn(AlertEvent) + Send + Sync>;

/// 限流决策引擎，自身无状态
pub struct RateLimitEngine {
    store: Arc<dyn RateLimitStore>,
    rate_limit: RateLimitConfig,
    brute_force: BruteForceConfig,
    alert: AlertConfig,
    alert_hook: Option<AlertHook>,
}

impl RateLimitEngine {
    pub fn new(config: &AuthConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            rate_limit: config.rate_limit.clone(),
            brute_force: config.brute_force.clone(),
            alert: config.alert.clone(),
            alert_hook: None,
        }
    }

    /// 注入告警回调
    pub fn with_alert_hook(mut self, hook: AlertHook) -> Self {
        self.alert_hook = Some(hook);
        self
    }

    /// 评估一次请求是否放行
    ///
    /// 固定顺序：白名单 → 黑名单 → 账户锁定 → 滑动窗口计数。
    /// check 本身不计数；调用方在操作完成后通过 [`record`](Self::record)
    /// 回报结果。
    pub async fn check(
        &self,
        identifier: &str,
        subject_id: Option<&str>,
    ) -> Result<RateLimitDecision> {
        let now = Utc::now();
        let window = self.rate_limit.window();

        // (a) 白名单无条件放行（优先于黑名单）
        if self.rate_limit.allow_list.iter().any(|e| e == identifier) {
            return Ok(RateLimitDecision::allow(self.rate_limit.max_attempts, now));
        }

        // (b) 黑名单无条件拒绝
        if self.rate_limit.deny_list.iter().any(|e| e == identifier) {
            return Ok(RateLimitDecision::deny("blacklisted", None, now));
        }

        // (c) 账户锁定（与地址计数独立）
        if self.brute_force.enabled {
            if let Some(subject_id) = subject_id {
                if let Some(lockout) = self.store.get_lockout(subject_id).await? {
                    if let Some(locked_until) = lockout.locked_until.filter(|u| *u > now) {
                        return Ok(RateLimitDecision::deny(
                            "account_locked",
                            Some(locked_until - now),
                            locked_until,
                        ));
                    }

                    if lockout.failed_attempts >= self.brute_force.max_failed_attempts {
                        let locked_until = now + self.brute_force.lockout_duration();
                        self.store.set_locked_until(subject_id, locked_until).await?;
                        tracing::warn!(
                            subject_id,
                            failed_attempts = lockout.failed_attempts,
                            "Account lockout engaged"
                        );
                        metrics::counter!("auth_lockouts_engaged_total").increment(1);
                        return Ok(RateLimitDecision::deny(
                            "account_locked",
                            Some(self.brute_force.lockout_duration()),
                            locked_until,
                        ));
                    }
                }
            }
        }

        // (d) 按标识的滑动窗口
        let counter = match self.store.get_counter(identifier).await? {
            None => return Ok(RateLimitDecision::allow(self.rate_limit.max_attempts, now + window)),
            Some(counter) => counter,
        };

        if let Some(blocked_until) = counter.blocked_until {
            if blocked_until > now {
                return Ok(RateLimitDecision::deny(
                    "rate_limited",
                    Some(blocked_until - now),
                    blocked_until,
                ));
            }
            // 封禁期已服满：丢弃旧计数，从全新窗口开始
            self.store.clear_counter(identifier).await?;
            return Ok(RateLimitDecision::allow(self.rate_limit.max_attempts, now + window));
        }

        // 窗口已过：计数逻辑上归零
        if counter.window_elapsed(now, window) {
            return Ok(RateLimitDecision::allow(self.rate_limit.max_attempts, now + window));
        }

        if counter.attempts >= self.rate_limit.max_attempts {
            let blocked_until = now + self.rate_limit.block_duration();
            self.store.set_blocked_until(identifier, blocked_until).await?;
            tracing::warn!(
                identifier,
                attempts = counter.attempts,
                "Identifier blocked by rate limiter"
            );
            metrics::counter!("auth_rate_limit_blocks_total").increment(1);

            if self.alert.enabled && counter.attempts >= self.alert.threshold {
                self.fire_alert(identifier, subject_id, counter.attempts);
            }

            return Ok(RateLimitDecision::deny(
                "rate_limited",
                Some(self.rate_limit.block_duration()),
                blocked_until,
            ));
        }

        Ok(RateLimitDecision::allow(
            self.rate_limit.max_attempts - counter.attempts - 1,
            counter.first_attempt_at + window,
        ))
    }

    /// 回报一次操作结果，更新两条计数维度
    pub async fn record(
        &self,
        identifier: &str,
        subject_id: Option<&str>,
        success: bool,
    ) -> Result<()> {
        let skip = (success && self.rate_limit.skip_successful)
            || (!success && self.rate_limit.skip_failed);

        if !skip {
            self.store
                .increment_counter(identifier, self.rate_limit.window())
                .await?;
        }

        // 账户维度独立更新
        if self.brute_force.enabled {
            if let Some(subject_id) = subject_id {
                if success {
                    if self.brute_force.reset_on_success {
                        self.store.clear_lockout(subject_id).await?;
                    }
                } else {
                    let lockout = self
                        .store
                        .increment_lockout(subject_id, self.brute_force.lockout_duration())
                        .await?;
                    tracing::debug!(
                        subject_id,
                        failed_attempts = lockout.failed_attempts,
                        "Recorded failed attempt"
                    );
                }
            }
        }

        Ok(())
    }

    /// 管理员操作：解除账户锁定
    pub async fn unlock_account(&self, subject_id: &str) -> Result<()> {
        self.store.clear_lockout(subject_id).await?;
        tracing::info!(subject_id, "Account unlocked by operator");
        Ok(())
    }

    /// 管理员操作：解除标识封禁
    pub async fn unlock_identifier(&self, identifier: &str) -> Result<()> {
        self.store.clear_counter(identifier).await?;
        tracing::info!(identifier, "Identifier unblocked by operator");
        Ok(())
    }

    /// 触发告警回调（fire-and-forget）
    fn fire_alert(&self, identifier: &str, subject_id: Option<&str>, attempts: u32) {
        let event = AlertEvent {
            identifier: identifier.to_string(),
            subject_id: subject_id.map(|s| s.to_string()),
            attempts,
            occurred_at: Utc::now(),
        };

        tracing::warn!(
            identifier = %event.identifier,
            attempts = event.attempts,
            "Alert threshold crossed"
        );
        metrics::counter!("auth_alerts_fired_total").increment(1);

        if let Some(hook) = &self.alert_hook {
            hook(event);
        }
    }
}
