use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("ユーザーが見つかりません")]
    UserNotFound,

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("二要素認証は既に有効です")]
    TotpAlreadyEnabled,

    #[error("二要素認証が有効化されていません")]
    TotpNotEnabled,

    #[error("二要素認証の設定が開始されていません")]
    TotpSetupRequired,

    #[error("同時更新が競合しました")]
    ConcurrentUpdate,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::UserNotFound => (
                StatusCode::NOT_FOUND,
                "ユーザーが見つかりません".to_string(),
            ),
            Self::TotpInvalid => (
                StatusCode::UNAUTHORIZED,
                "認証コードが正しくありません".to_string(),
            ),
            Self::TotpAlreadyEnabled => {
                (StatusCode::CONFLICT, "二要素認証は既に有効です".to_string())
            }
            Self::TotpNotEnabled => (
                StatusCode::BAD_REQUEST,
                "二要素認証が有効化されていません".to_string(),
            ),
            Self::TotpSetupRequired => (
                StatusCode::BAD_REQUEST,
                "二要素認証の設定が開始されていません".to_string(),
            ),
            Self::ConcurrentUpdate => {
                tracing::warn!("2FA設定の同時更新が競合");
                (
                    StatusCode::CONFLICT,
                    "別の更新と競合しました。再試行してください".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
