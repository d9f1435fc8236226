use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// === 2FA Status ===

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub pending: bool,
    pub backup_codes_remaining: usize,
}

/// GET /api/2fa/status
///
/// 2FAの有効状態と残りバックアップコード数を返す
///
/// # Note
/// 呼び出し元のユーザーIDは上流のセッション層で認証済みであること
pub async fn two_factor_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.two_factor_service.status(query.user_id).await?;

    Ok(Json(StatusResponse {
        enabled: status.enabled,
        pending: status.pending,
        backup_codes_remaining: status.backup_codes_remaining,
    }))
}

// === 2FA Setup ===

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub secret: String,
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
}

/// POST /api/2fa/setup
///
/// 2FA設定を開始（シークレット・バックアップコード生成）
///
/// # Security
/// - 平文シークレット・平文コードはこのレスポンスで一度だけ返却
/// - いずれもログ出力禁止
pub async fn setup_2fa(
    State(state): State<AppState>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, AppError> {
    let enrollment = state
        .two_factor_service
        .enable_two_factor(request.user_id)
        .await?;

    Ok(Json(SetupResponse {
        secret: enrollment.secret,
        otpauth_uri: enrollment.otpauth_uri,
        backup_codes: enrollment.backup_codes,
    }))
}

// === 2FA Setup Verify ===

#[derive(Debug, Deserialize)]
pub struct VerifySetupRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifySetupResponse {
    pub enabled: bool,
}

/// POST /api/2fa/setup/verify
///
/// 2FA設定確認（初回コード検証で有効化）
///
/// # Security
/// - コードはログ出力禁止
pub async fn verify_setup_2fa(
    State(state): State<AppState>,
    Json(request): Json<VerifySetupRequest>,
) -> Result<Json<VerifySetupResponse>, AppError> {
    validate_totp_code(&request.code)?;

    state
        .two_factor_service
        .verify_and_enable(request.user_id, &request.code)
        .await?;

    Ok(Json(VerifySetupResponse { enabled: true }))
}

// === 2FA Login Verify ===

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

/// POST /api/2fa/verify
///
/// ログイン時のコード検証（TOTPまたはバックアップコード）
///
/// 不一致は 200 + valid: false で返す（再入力を促すのは呼び出し側）
pub async fn verify_2fa(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    validate_token(&request.code)?;

    let valid = state
        .two_factor_service
        .verify_login(request.user_id, &request.code)
        .await?;

    Ok(Json(VerifyResponse { valid }))
}

// === 2FA Disable ===

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct DisableResponse {
    pub disabled: bool,
}

/// POST /api/2fa/disable
///
/// 2FA無効化（TOTPまたはバックアップコードで本人確認）
pub async fn disable_2fa(
    State(state): State<AppState>,
    Json(request): Json<DisableRequest>,
) -> Result<Json<DisableResponse>, AppError> {
    validate_token(&request.code)?;

    state
        .two_factor_service
        .disable_two_factor(request.user_id, &request.code)
        .await?;

    Ok(Json(DisableResponse { disabled: true }))
}

// === Backup Codes Regenerate ===

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub backup_codes: Vec<String>,
}

/// POST /api/2fa/backup-codes/regenerate
///
/// バックアップコードの再生成（TOTPコードのみ受け付ける）
///
/// # Security
/// - 新しい平文コードはこのレスポンスで一度だけ返却
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<RegenerateResponse>, AppError> {
    validate_totp_code(&request.code)?;

    let backup_codes = state
        .two_factor_service
        .regenerate_backup_codes(request.user_id, &request.code)
        .await?;

    Ok(Json(RegenerateResponse { backup_codes }))
}

// === Helper Functions ===

/// TOTPコードバリデーション（6桁数字のみ）
fn validate_totp_code(code: &str) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}

/// ログイン検証トークンのバリデーション
///
/// TOTPコード（6桁数字）または XXXX-XXXX 形式のバックアップコードを許可
fn validate_token(token: &str) -> Result<(), AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }

    let is_totp = token.len() == 6 && token.chars().all(|c| c.is_ascii_digit());
    let is_backup = token.len() == 9
        && token
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 4 { c == '-' } else { c.is_ascii_hexdigit() });

    if !is_totp && !is_backup {
        return Err(AppError::Validation(
            "認証コードまたはバックアップコードの形式が不正です".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_code() {
        let result = validate_totp_code("");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_short_code() {
        let result = validate_totp_code("12345");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_non_digit_code() {
        let result = validate_totp_code("12345a");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_valid_code() {
        let result = validate_totp_code("123456");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_accepts_totp() {
        let result = validate_token("123456");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_accepts_backup_code() {
        let result = validate_token("AB12-CD34");
        assert!(result.is_ok());
        // 小文字もサービス側で正規化されるので許可
        let result = validate_token("ab12-cd34");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_rejects_empty() {
        let result = validate_token("   ");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_token_rejects_malformed() {
        assert!(validate_token("12345").is_err());
        assert!(validate_token("AB12CD34").is_err());
        assert!(validate_token("AB12-CD3Z").is_err());
        assert!(validate_token("AB12-CD345").is_err());
    }
}
