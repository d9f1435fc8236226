use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// 監査イベントシンク
///
/// 2FAの状態遷移が成功するたびに1件記録する。
/// 記録失敗で2FA操作自体を失敗させてはならない（呼び出し側で
/// ログに残して握りつぶす）
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(
        &self,
        user_id: Uuid,
        event_name: &str,
        occurred_at: OffsetDateTime,
    ) -> Result<(), AppError>;
}

/// PostgreSQL実装
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(
        &self,
        user_id: Uuid,
        event_name: &str,
        occurred_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (user_id, event_name, occurred_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(event_name)
        .bind(occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
