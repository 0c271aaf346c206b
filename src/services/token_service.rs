//! 令牌生命周期服务：签发、刷新（轮换）、吊销

use crate::{
    auth::hash::{hash_fingerprint, hash_token},
    auth::jwt::JwtCodec,
    config::AuthConfig,
    error::{AuthError, Result},
    models::{DeviceInfo, RefreshRecord, TokenPair},
    services::security::{SecurityChecks, SecurityVerdict},
    store::TokenStore,
};
use chrono::Utc;
use std::sync::Arc;

/// 令牌生命周期管理器
///
/// 自身无状态，所有权威状态都在注入的 TokenStore 中。
pub struct TokenService {
    codec: JwtCodec,
    store: Arc<dyn TokenStore>,
    checks: SecurityChecks,
    rotation_enabled: bool,
    max_concurrent_sessions: u32,
}

impl TokenService {
    pub fn new(config: &AuthConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Ok(Self {
            codec: JwtCodec::from_config(config)?,
            store,
            checks: SecurityChecks {
                reuse_detection_enabled: config.security.reuse_detection_enabled,
                device_binding_enabled: config.security.device_binding_enabled,
            },
            rotation_enabled: config.security.rotation_enabled,
            max_concurrent_sessions: config.security.max_concurrent_sessions,
        })
    }

    /// 签发一对新凭据
    ///
    /// 无需任何已有状态；除存储故障外总是成功。
    pub async fn issue(
        &self,
        subject_id: &str,
        roles: &[String],
        device: Option<&DeviceInfo>,
    ) -> Result<TokenPair> {
        let device_hash = if self.checks.device_binding_enabled {
            device.map(|d| hash_fingerprint(&d.fingerprint))
        } else {
            None
        };

        let access_token = self.codec.sign_access(subject_id, roles)?;
        let (refresh_token, jti) = self.codec.sign_refresh(subject_id, roles, device_hash.clone())?;

        let now = Utc::now();
        let record = RefreshRecord {
            id: jti,
            subject_id: subject_id.to_string(),
            token_hash: hash_token(&refresh_token),
            device_hash,
            source_addr: device.and_then(|d| d.source_addr.clone()),
            user_agent: device.and_then(|d| d.user_agent.clone()),
            used: false,
            created_at: now,
            expires_at: now + self.codec.refresh_expiry(),
        };

        self.store.save(&record).await?;

        // 会话上限：淘汰最旧的会话
        if self.max_concurrent_sessions > 0 {
            let pruned = self
                .store
                .prune_to_session_cap(subject_id, self.max_concurrent_sessions)
                .await?;
            if pruned > 0 {
                tracing::debug!(subject_id, pruned, "Evicted sessions over the cap");
            }
        }

        metrics::counter!("auth_tokens_issued_total").increment(1);

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.codec.access_expiry_secs(),
        })
    }

    /// 用刷新令牌换取新的凭据对
    ///
    /// 验证签名 → 查找记录 → 安全检查 → 原子占用旧记录 → 签发新对。
    /// 占用（标记 used）发生在签发之前：若签发失败，调用方被锁在门外
    /// 而不是还能重放旧令牌——故意的 fail-closed 选择。
    pub async fn refresh(
        &self,
        presented: &str,
        device: Option<&DeviceInfo>,
    ) -> Result<TokenPair> {
        let claims = self.codec.verify_refresh(presented)?;

        let token_hash = hash_token(presented);
        let record = self
            .store
            .find_by_hash(&token_hash)
            .await?
            .ok_or(AuthError::UnknownRefreshToken)?;

        match self.checks.evaluate(&record, &claims, device, Utc::now()) {
            SecurityVerdict::Pass => {}
            SecurityVerdict::Replay => {
                tracing::warn!(
                    subject_id = %record.subject_id,
                    jti = %record.id,
                    "Refresh token replay detected, revoking all sessions"
                );
                metrics::counter!("auth_replays_detected_total").increment(1);
                self.cascade_revoke(&record.subject_id).await;
                return Err(AuthError::ConcurrentUsageDetected);
            }
            SecurityVerdict::DeviceMismatch => {
                // 单次指纹不符不构成失窃证据，不消耗令牌、不动其他会话
                tracing::warn!(subject_id = %record.subject_id, "Device fingerprint mismatch");
                return Err(AuthError::DeviceMismatch);
            }
            SecurityVerdict::Expired => {
                self.store.delete_by_hash(&token_hash).await?;
                return Err(AuthError::CredentialExpired);
            }
        }

        if self.rotation_enabled {
            // 原子占用：并发刷新同一令牌时最多一个成功，输家按重放处理
            if !self.store.claim_if_unused(&token_hash).await? {
                tracing::warn!(
                    subject_id = %record.subject_id,
                    jti = %record.id,
                    "Lost refresh claim race, treating as replay"
                );
                metrics::counter!("auth_replays_detected_total").increment(1);
                self.cascade_revoke(&record.subject_id).await;
                return Err(AuthError::ConcurrentUsageDetected);
            }
        }

        let pair = self.issue(&record.subject_id, &claims.roles, device).await?;
        metrics::counter!("auth_tokens_refreshed_total").increment(1);

        Ok(pair)
    }

    /// 校验访问令牌（转发给编解码器）
    pub fn verify_access(&self, token: &str) -> Result<crate::auth::jwt::AccessClaims> {
        self.codec.verify_access(token)
    }

    /// 吊销单个刷新令牌（单设备登出），幂等
    pub async fn revoke_one(&self, refresh_token: &str) -> Result<()> {
        self.store.delete_by_hash(&hash_token(refresh_token)).await?;
        metrics::counter!("auth_tokens_revoked_total").increment(1);
        Ok(())
    }

    /// 吊销账户的全部刷新令牌（全设备登出），幂等
    pub async fn revoke_all(&self, subject_id: &str) -> Result<u64> {
        let revoked = self.store.delete_all_for_subject(subject_id).await?;
        if revoked > 0 {
            tracing::info!(subject_id, revoked, "Revoked all sessions");
        }
        Ok(revoked)
    }

    /// 重放触发的级联吊销
    ///
    /// 必须完成（或重试一次）——即使最终的错误上报失败，吊销也已生效。
    async fn cascade_revoke(&self, subject_id: &str) {
        for attempt in 1..=2u8 {
            match self.store.delete_all_for_subject(subject_id).await {
                Ok(revoked) => {
                    tracing::warn!(subject_id, revoked, "Cascade revocation complete");
                    return;
                }
                Err(e) if attempt < 2 => {
                    tracing::warn!(subject_id, error = %e, "Cascade revocation failed, retrying");
                }
                Err(e) => {
                    tracing::error!(subject_id, error = %e, "Cascade revocation failed after retry");
                }
            }
        }
    }
}
