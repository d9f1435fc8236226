use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::error::AppError;
use crate::services::base32;

type HmacSha1 = Hmac<Sha1>;

/// 時間ステップ（ミリ秒）。認証アプリの標準に合わせて30秒固定
const TIME_STEP_MILLIS: i64 = 30_000;
/// シークレット長（バイト）
const SECRET_LEN: usize = 20;
/// AES-GCM nonce 長（バイト）
const NONCE_LEN: usize = 12;

/// TOTP (Time-based One-Time Password) サービス
///
/// コード導出は HMAC-SHA1 + 動的切り出し（6桁・30秒ステップ）。
/// 導出ロジックはこのモジュールに隔離されているため、外部ライブラリ
/// 実装への差し替えは呼び出し側に影響しない。
///
/// # Security
/// - シークレットはAES-256-GCMで暗号化してDB保存
/// - シークレット平文・コードはログに出力しない
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
    encryption_key: [u8; 32],
    window_steps: u8,
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（認証アプリに表示される）
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    /// * `window_steps` - 検証時に許容する前後の時間ステップ数
    pub fn new(
        issuer: String,
        encryption_key_base64: &str,
        window_steps: u8,
    ) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "TOTP暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        let encryption_key: [u8; 32] = key_bytes.try_into().map_err(|v: Vec<u8>| {
            tracing::error!(expected = 32, actual = v.len(), "TOTP暗号化キーの長さが不正");
            AppError::Internal(anyhow::anyhow!("encryption key must be 32 bytes"))
        })?;

        Ok(Self {
            issuer,
            encryption_key,
            window_steps,
        })
    }

    /// 20バイトのランダムシークレットを生成し、Base32でエンコード
    ///
    /// # Errors
    /// エントロピー源の枯渇はドメインエラーではなくシステムエラーとして扱う
    pub fn generate_secret() -> Result<String, AppError> {
        let mut bytes = [0u8; SECRET_LEN];
        rand::thread_rng().try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(error = ?e, "乱数生成に失敗");
            AppError::Internal(anyhow::anyhow!("rng failure"))
        })?;
        Ok(base32::encode(&bytes))
    }

    /// シークレットをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt_secret(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.try_fill_bytes(&mut nonce_bytes).map_err(|e| {
            tracing::error!(error = ?e, "nonce生成に失敗");
            AppError::Internal(anyhow::anyhow!("rng failure"))
        })?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), secret.as_bytes())
            .map_err(|e| {
                tracing::error!(error = ?e, "シークレット暗号化エラー");
                AppError::Internal(anyhow::anyhow!("encryption error"))
            })?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// 暗号化されたシークレットを復号
    pub fn decrypt_secret(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < NONCE_LEN {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| {
                tracing::error!(error = ?e, "シークレット復号エラー");
                AppError::Internal(anyhow::anyhow!("decryption error"))
            })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }

    /// otpauth URI を構築（認証アプリのQRコード読み取り用）
    ///
    /// # Note
    /// Key URI Format 準拠。認証アプリ互換のためフォーマットは変更不可
    pub fn otpauth_uri(&self, email: &str, secret: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{email}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30",
            issuer = urlencoding::encode(&self.issuer),
            email = urlencoding::encode(email),
            secret = secret,
        )
    }

    /// TOTPコードを検証
    ///
    /// # Note
    /// 設定された window_steps に応じて前後の時間ステップを許容する。
    /// 同一ステップ内でのコード再利用は検出しない（TOTPの標準挙動）
    pub fn verify_code(&self, secret: &str, code: &str) -> Result<bool, AppError> {
        // 入力検証: コードは6桁の数字のみ
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let secret_bytes = base32::decode(secret);
        if secret_bytes.is_empty() {
            tracing::error!("シークレットのBase32デコード結果が空");
            return Err(AppError::Internal(anyhow::anyhow!("empty totp secret")));
        }

        Ok(verify_at(
            &secret_bytes,
            code,
            now_millis()?,
            self.window_steps,
        ))
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })
    }
}

/// 指定時刻のTOTPコードを導出
///
/// counter = floor(timestamp / 30秒) を8バイトビッグエンディアンで
/// HMAC-SHA1 にかけ、動的切り出しで6桁コードにする
pub fn code_at(secret: &[u8], timestamp_millis: i64) -> String {
    hotp(secret, (timestamp_millis / TIME_STEP_MILLIS) as u64)
}

/// 指定時刻を中心に前後 window_steps ステップでコードを照合
///
/// 先頭ゼロを保持するため文字列比較で照合する（数値比較は不可）
pub fn verify_at(secret: &[u8], code: &str, timestamp_millis: i64, window_steps: u8) -> bool {
    let window = i64::from(window_steps);
    for step in -window..=window {
        let ts = timestamp_millis + step * TIME_STEP_MILLIS;
        if ts < 0 {
            continue;
        }
        if code_at(secret, ts) == code {
            return true;
        }
    }
    false
}

/// HOTP (RFC 4226): HMAC-SHA1 + 動的切り出し
fn hotp(secret: &[u8], counter: u64) -> String {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(secret).expect("HMAC は任意長のキーを受け付ける");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // 動的切り出し: 末尾バイトの下位ニブルをオフセットとして4バイト取り出す
    let offset = (digest[19] & 0x0f) as usize;
    let truncated = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff;

    format!("{:06}", truncated % 1_000_000)
}

/// 現在時刻をUNIXエポックからのミリ秒で取得
fn now_millis() -> Result<i64, AppError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!(error = ?e, "システム時刻取得エラー");
            AppError::Internal(anyhow::anyhow!("system time error"))
        })?;
    Ok(now.as_millis() as i64)
}
