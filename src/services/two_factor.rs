use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{TwoFactorState, User};
use crate::repositories::{AuditSink, TwoFactorUpdate, UserRecordStore};
use crate::services::{backup_codes, totp::TotpService};

const EVENT_SETUP_STARTED: &str = "2fa.setup_started";
const EVENT_ENABLED: &str = "2fa.enabled";
const EVENT_DISABLED: &str = "2fa.disabled";
const EVENT_BACKUP_CODE_USED: &str = "2fa.backup_code_used";
const EVENT_BACKUP_CODES_REGENERATED: &str = "2fa.backup_codes_regenerated";

/// 2FA設定開始時に一度だけ返却される情報
///
/// 平文シークレットと平文バックアップコードはこのレスポンス限り。
/// 以後は復元不可能（DBにはハッシュ・暗号文のみ残る）
#[derive(Debug)]
pub struct TwoFactorEnrollment {
    /// Base32エンコードされたシークレット（手入力用）
    pub secret: String,
    /// 認証アプリ登録用の otpauth URI（QRコード化は呼び出し側）
    pub otpauth_uri: String,
    /// 平文バックアップコード
    pub backup_codes: Vec<String>,
}

/// 2FA状態の照会結果
#[derive(Debug)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub pending: bool,
    pub backup_codes_remaining: usize,
}

/// トークン照合の結果（ログイン検証経路）
enum TokenMatch {
    Totp,
    BackupCode { remaining: Vec<String> },
    NoMatch,
}

/// 二要素認証オーケストレーター
///
/// ユーザーごとの状態遷移
/// Disabled → PendingVerification → Enabled → Disabled を管理する。
/// 各操作はユーザーレコードの load と save を1回ずつ発行し、遷移全体を
/// 1回の save でコミットする。並行遷移の二重コミットはストア側の
/// 楽観ロックで防ぐ。
///
/// 検証失敗の扱いは操作によって異なる:
/// - 設定時・管理操作（disable / regenerate）の不一致は `TotpInvalid` エラー
/// - ログイン検証の不一致は正常系の `false` 返却（呼び出し側が再試行を促す）
///
/// # Note
/// disable はバックアップコードでも実行できるが、regenerate はTOTPのみ。
/// 盗まれたバックアップコードが自分で新しいコード一式を発行できないための
/// 非対称。仕様変更はプロダクトオーナー確認の上で行うこと
#[derive(Clone)]
pub struct TwoFactorService {
    user_store: Arc<dyn UserRecordStore>,
    audit: Arc<dyn AuditSink>,
    totp_service: TotpService,
    backup_code_count: usize,
}

impl TwoFactorService {
    /// 新しい TwoFactorService を作成
    pub fn new(
        user_store: Arc<dyn UserRecordStore>,
        audit: Arc<dyn AuditSink>,
        totp_service: TotpService,
        backup_code_count: usize,
    ) -> Self {
        Self {
            user_store,
            audit,
            totp_service,
            backup_code_count,
        }
    }

    /// 2FA状態を照会
    pub async fn status(&self, user_id: Uuid) -> Result<TwoFactorStatus, AppError> {
        let user = self.load_user(user_id).await?;
        let state = user.two_factor_state();

        Ok(TwoFactorStatus {
            enabled: state == TwoFactorState::Enabled,
            pending: state == TwoFactorState::PendingVerification,
            backup_codes_remaining: user.mfa_backup_code_hashes.len(),
        })
    }

    /// 2FA設定を開始
    ///
    /// シークレットとバックアップコードを生成してステージする
    /// （enabled は false のまま）。初回コード検証が成功するまで
    /// このシークレットはログイン検証に使用できない。
    ///
    /// # Note
    /// 検証前のシークレットが残っている場合は新しいものに置き換える
    /// （設定のやり直しを許可）
    pub async fn enable_two_factor(&self, user_id: Uuid) -> Result<TwoFactorEnrollment, AppError> {
        let user = self.load_user(user_id).await?;

        if user.two_factor_state() == TwoFactorState::Enabled {
            return Err(AppError::TotpAlreadyEnabled);
        }

        let secret = TotpService::generate_secret()?;
        let codes = backup_codes::generate_codes(self.backup_code_count)?;
        let hashes = codes.iter().map(|c| backup_codes::hash_code(c)).collect();
        let encrypted = self.totp_service.encrypt_secret(&secret)?;

        self.user_store
            .save_two_factor(
                user.id,
                user.version,
                TwoFactorUpdate {
                    mfa_enabled: false,
                    mfa_secret_encrypted: Some(encrypted),
                    mfa_backup_code_hashes: hashes,
                },
            )
            .await?;

        self.emit_audit(user.id, EVENT_SETUP_STARTED).await;
        tracing::info!(user_id = %user.id, "2FA設定開始");

        Ok(TwoFactorEnrollment {
            otpauth_uri: self.totp_service.otpauth_uri(&user.email, &secret),
            secret,
            backup_codes: codes,
        })
    }

    /// 初回コード検証で2FAを有効化
    ///
    /// 失敗しても状態は PendingVerification のまま（再試行可能）
    pub async fn verify_and_enable(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        let user = self.load_user(user_id).await?;

        match user.two_factor_state() {
            TwoFactorState::Enabled => return Err(AppError::TotpAlreadyEnabled),
            TwoFactorState::Disabled => return Err(AppError::TotpSetupRequired),
            TwoFactorState::PendingVerification => {}
        }

        let secret = self.decrypt_secret_of(&user)?;
        if !self.totp_service.verify_code(&secret, code)? {
            return Err(AppError::TotpInvalid);
        }

        self.user_store
            .save_two_factor(
                user.id,
                user.version,
                TwoFactorUpdate {
                    mfa_enabled: true,
                    mfa_secret_encrypted: user.mfa_secret_encrypted.clone(),
                    mfa_backup_code_hashes: user.mfa_backup_code_hashes.clone(),
                },
            )
            .await?;

        self.emit_audit(user.id, EVENT_ENABLED).await;
        tracing::info!(user_id = %user.id, "2FA有効化完了");

        Ok(())
    }

    /// ログイン時のトークン検証（TOTPまたはバックアップコード）
    ///
    /// 不一致はエラーではなく `false` を返す。バックアップコードが
    /// 一致した場合は使用済みコードを集合から除去して保存する
    /// （厳格なワンタイム性）
    pub async fn verify_login(&self, user_id: Uuid, token: &str) -> Result<bool, AppError> {
        let user = self.load_user(user_id).await?;

        if user.two_factor_state() != TwoFactorState::Enabled {
            return Err(AppError::TotpNotEnabled);
        }

        let secret = self.decrypt_secret_of(&user)?;
        match self.match_token(&user, &secret, token)? {
            TokenMatch::Totp => Ok(true),
            TokenMatch::BackupCode { remaining } => {
                self.user_store
                    .save_two_factor(
                        user.id,
                        user.version,
                        TwoFactorUpdate {
                            mfa_enabled: true,
                            mfa_secret_encrypted: user.mfa_secret_encrypted.clone(),
                            mfa_backup_code_hashes: remaining,
                        },
                    )
                    .await?;

                self.emit_audit(user.id, EVENT_BACKUP_CODE_USED).await;
                tracing::info!(user_id = %user.id, "バックアップコードでログイン検証");
                Ok(true)
            }
            TokenMatch::NoMatch => Ok(false),
        }
    }

    /// 2FAを無効化
    ///
    /// TOTPまたはバックアップコードで本人確認の上、シークレットと
    /// バックアップコードを完全に消去する
    pub async fn disable_two_factor(&self, user_id: Uuid, token: &str) -> Result<(), AppError> {
        let user = self.load_user(user_id).await?;

        if user.two_factor_state() != TwoFactorState::Enabled {
            return Err(AppError::TotpNotEnabled);
        }

        let secret = self.decrypt_secret_of(&user)?;
        if let TokenMatch::NoMatch = self.match_token(&user, &secret, token)? {
            return Err(AppError::TotpInvalid);
        }

        // バックアップコード一致時も個別消費は不要（全消去に含まれる）
        self.user_store
            .save_two_factor(
                user.id,
                user.version,
                TwoFactorUpdate {
                    mfa_enabled: false,
                    mfa_secret_encrypted: None,
                    mfa_backup_code_hashes: vec![],
                },
            )
            .await?;

        self.emit_audit(user.id, EVENT_DISABLED).await;
        tracing::info!(user_id = %user.id, "2FA無効化完了");

        Ok(())
    }

    /// バックアップコードを再生成
    ///
    /// 検証はTOTPのみ受け付ける（バックアップコード不可）。
    /// 成功時はハッシュ集合を丸ごと置き換え、新しい平文コードを返す
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, AppError> {
        let user = self.load_user(user_id).await?;

        if user.two_factor_state() != TwoFactorState::Enabled {
            return Err(AppError::TotpNotEnabled);
        }

        let secret = self.decrypt_secret_of(&user)?;
        if !self.totp_service.verify_code(&secret, code)? {
            return Err(AppError::TotpInvalid);
        }

        let codes = backup_codes::generate_codes(self.backup_code_count)?;
        let hashes = codes.iter().map(|c| backup_codes::hash_code(c)).collect();

        self.user_store
            .save_two_factor(
                user.id,
                user.version,
                TwoFactorUpdate {
                    mfa_enabled: true,
                    mfa_secret_encrypted: user.mfa_secret_encrypted.clone(),
                    mfa_backup_code_hashes: hashes,
                },
            )
            .await?;

        self.emit_audit(user.id, EVENT_BACKUP_CODES_REGENERATED).await;
        tracing::info!(user_id = %user.id, "バックアップコード再生成");

        Ok(codes)
    }

    /// ユーザーを取得（不在は NotFound）
    async fn load_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.user_store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    /// 有効状態のシークレットを復号
    fn decrypt_secret_of(&self, user: &User) -> Result<String, AppError> {
        let encrypted = user.mfa_secret_encrypted.as_deref().ok_or_else(|| {
            // enabled ⇒ シークレット非空 の不変条件が破れている（DB手動操作など）
            tracing::error!(user_id = %user.id, "シークレットのないユーザーに対する2FA操作");
            AppError::Internal(anyhow::anyhow!("mfa secret missing"))
        })?;
        self.totp_service.decrypt_secret(encrypted)
    }

    /// ログイン検証経路のトークン照合: TOTP優先、次にバックアップコード
    fn match_token(&self, user: &User, secret: &str, token: &str) -> Result<TokenMatch, AppError> {
        if self.totp_service.verify_code(secret, token)? {
            return Ok(TokenMatch::Totp);
        }

        let remaining = backup_codes::consume(&user.mfa_backup_code_hashes, token);
        if remaining.len() < user.mfa_backup_code_hashes.len() {
            return Ok(TokenMatch::BackupCode { remaining });
        }

        Ok(TokenMatch::NoMatch)
    }

    /// 監査イベントを記録（失敗しても操作は失敗させない）
    async fn emit_audit(&self, user_id: Uuid, event_name: &str) {
        if let Err(e) = self
            .audit
            .record(user_id, event_name, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(error = ?e, user_id = %user_id, event = event_name, "監査イベントの記録に失敗");
        }
    }
}
