use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// 2FAフィールドの更新内容
///
/// 1操作 = 1回の save で状態遷移全体をコミットする（部分更新を残さない）
#[derive(Debug, Clone)]
pub struct TwoFactorUpdate {
    pub mfa_enabled: bool,
    pub mfa_secret_encrypted: Option<Vec<u8>>,
    pub mfa_backup_code_hashes: Vec<String>,
}

/// ユーザーレコードストア
///
/// 2FAコアは1操作につき load と save を各1回だけ発行する。
/// 同一ユーザーへの並行遷移が両方コミットされないよう、save は
/// version 列の条件付きUPDATE（楽観ロック）で保護すること
#[async_trait]
pub trait UserRecordStore: Send + Sync {
    /// ユーザーIDでユーザーを検索
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// 2FAフィールドを更新
    ///
    /// # Errors
    /// `expected_version` が現在値と一致しない場合は
    /// `AppError::ConcurrentUpdate`（並行更新との競合）
    async fn save_two_factor(
        &self,
        user_id: Uuid,
        expected_version: i64,
        update: TwoFactorUpdate,
    ) -> Result<(), AppError>;
}

/// PostgreSQL実装
#[derive(Clone)]
pub struct PgUserRecordStore {
    pool: PgPool,
}

impl PgUserRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRecordStore for PgUserRecordStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, mfa_enabled, mfa_secret_encrypted,
                   mfa_backup_code_hashes, version, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn save_two_factor(
        &self,
        user_id: Uuid,
        expected_version: i64,
        update: TwoFactorUpdate,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET mfa_enabled = $3,
                mfa_secret_encrypted = $4,
                mfa_backup_code_hashes = $5,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(user_id)
        .bind(expected_version)
        .bind(update.mfa_enabled)
        .bind(update.mfa_secret_encrypted)
        .bind(update.mfa_backup_code_hashes)
        .execute(&self.pool)
        .await?;

        // 更新0件 = version不一致（直前に読んだレコードが別の遷移で更新済み）
        if result.rows_affected() == 0 {
            return Err(AppError::ConcurrentUpdate);
        }

        Ok(())
    }
}
