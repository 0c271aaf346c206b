//! Postgres token store (刷新令牌数据访问)
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE refresh_tokens (
//!     id          TEXT PRIMARY KEY,
//!     subject_id  TEXT NOT NULL,
//!     token_hash  TEXT NOT NULL UNIQUE,
//!     device_hash TEXT,
//!     source_addr TEXT,
//!     user_agent  TEXT,
//!     used        BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     expires_at  TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX idx_refresh_tokens_subject ON refresh_tokens (subject_id);
//! ```

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::RefreshRecord;

use super::TokenStore;

pub struct PgTokenStore {
    db: PgPool,
}

impl PgTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    /// 存储刷新令牌记录
    async fn save(&self, record: &RefreshRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                id, subject_id, token_hash, device_hash, source_addr, user_agent,
                used, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.subject_id)
        .bind(&record.token_hash)
        .bind(&record.device_hash)
        .bind(&record.source_addr)
        .bind(&record.user_agent)
        .bind(record.used)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 根据哈希查找刷新令牌记录
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>> {
        let record = sqlx::query_as::<_, RefreshRecord>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;

        Ok(record)
    }

    /// 原子地将 used 从 false 置为 true
    ///
    /// 条件更新由数据库保证原子性：两个并发刷新最多一个能命中
    /// `used = FALSE` 的行。
    async fn claim_if_unused(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET used = TRUE WHERE token_hash = $1 AND used = FALSE",
        )
        .bind(token_hash)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除单条记录（单设备登出）
    async fn delete_by_hash(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// 删除账户的全部记录（全设备登出 / 重放级联吊销）
    async fn delete_all_for_subject(&self, subject_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE subject_id = $1")
            .bind(subject_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 删除超出会话上限的最旧记录
    async fn prune_to_session_cap(&self, subject_id: &str, max_sessions: u32) -> Result<u64> {
        if max_sessions == 0 {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE subject_id = $1
                AND token_hash NOT IN (
                    SELECT token_hash FROM refresh_tokens
                    WHERE subject_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                )
            "#,
        )
        .bind(subject_id)
        .bind(max_sessions as i64)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// 清理过期的刷新令牌记录
    async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
