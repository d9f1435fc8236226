use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,
    /// TOTP検証の許容ステップ数（前後N×30秒）
    #[serde(default = "default_totp_window_steps")]
    pub totp_window_steps: u8,
    /// バックアップコードの発行数
    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: usize,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOTP_ISSUER: &str = "Yellow Cross";
const DEFAULT_TOTP_WINDOW_STEPS: u8 = 1;
const DEFAULT_BACKUP_CODE_COUNT: usize = 10;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_totp_issuer() -> String {
    DEFAULT_TOTP_ISSUER.to_string()
}

fn default_totp_window_steps() -> u8 {
    DEFAULT_TOTP_WINDOW_STEPS
}

fn default_backup_code_count() -> usize {
    DEFAULT_BACKUP_CODE_COUNT
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
