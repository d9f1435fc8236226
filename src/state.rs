use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{PgAuditSink, PgUserRecordStore};
use crate::services::{TotpService, TwoFactorService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 二要素認証サービス
    pub two_factor_service: TwoFactorService,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        let totp_service = TotpService::new(
            config.totp_issuer.clone(),
            config.encryption_key.expose_secret(),
            config.totp_window_steps,
        )?;

        let user_store = Arc::new(PgUserRecordStore::new(db_pool.clone()));
        let audit_sink = Arc::new(PgAuditSink::new(db_pool.clone()));

        let two_factor_service = TwoFactorService::new(
            user_store,
            audit_sink,
            totp_service,
            config.backup_code_count,
        );

        Ok(Self {
            db_pool,
            config,
            two_factor_service,
        })
    }
}
