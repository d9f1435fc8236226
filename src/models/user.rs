use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザーレコード（二要素認証フィールドを含む）
///
/// シークレットは AES-256-GCM で暗号化されて保存される
/// バックアップコードはSHA-256ハッシュのみ保存（平文は保存しない）
/// 平文シークレット・平文コードはログに出力禁止
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub mfa_enabled: bool,
    #[serde(skip)]
    pub mfa_secret_encrypted: Option<Vec<u8>>,
    #[serde(skip)]
    pub mfa_backup_code_hashes: Vec<String>,
    /// 楽観ロック用のバージョン番号（2FA更新のたびに加算）
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// ユーザーごとの二要素認証の状態
///
/// Disabled → PendingVerification → Enabled → Disabled の順に遷移する。
/// PendingVerification はシークレット生成済み・初回コード未検証の状態で、
/// この状態のシークレットはログイン検証には使用できない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorState {
    Disabled,
    PendingVerification,
    Enabled,
}

impl User {
    /// 現在の2FA状態を導出
    pub fn two_factor_state(&self) -> TwoFactorState {
        match (self.mfa_enabled, &self.mfa_secret_encrypted) {
            (true, _) => TwoFactorState::Enabled,
            (false, Some(_)) => TwoFactorState::PendingVerification,
            (false, None) => TwoFactorState::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(enabled: bool, secret: Option<Vec<u8>>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            mfa_enabled: enabled,
            mfa_secret_encrypted: secret,
            mfa_backup_code_hashes: vec![],
            version: 0,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_state_disabled() {
        assert_eq!(
            user_with(false, None).two_factor_state(),
            TwoFactorState::Disabled
        );
    }

    #[test]
    fn test_state_pending_verification() {
        assert_eq!(
            user_with(false, Some(vec![1, 2, 3])).two_factor_state(),
            TwoFactorState::PendingVerification
        );
    }

    #[test]
    fn test_state_enabled() {
        assert_eq!(
            user_with(true, Some(vec![1, 2, 3])).two_factor_state(),
            TwoFactorState::Enabled
        );
    }
}
