//! バックアップコード管理
//!
//! 認証デバイス喪失時の復旧用ワンタイムコード。
//! 平文は生成時に一度だけ返却し、DBにはSHA-256ハッシュのみ保存する。
//! 使用済みコードのハッシュは集合から削除する（墓石は残さない）。

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// コードの乱数長（バイト）。16進8文字 = XXXX-XXXX
const CODE_BYTES: usize = 4;
/// ハイフン区切りのグループ長
const GROUP_LEN: usize = 4;

/// バックアップコードを一括生成
///
/// 各コードは暗号論的乱数4バイトを大文字16進にした XXXX-XXXX 形式
///
/// # Errors
/// エントロピー源の枯渇はシステムエラーとして伝播する
pub fn generate_codes(count: usize) -> Result<Vec<String>, AppError> {
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut bytes = [0u8; CODE_BYTES];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(error = ?e, "乱数生成に失敗");
            AppError::Internal(anyhow::anyhow!("rng failure"))
        })?;
        codes.push(format_code(&bytes));
    }
    Ok(codes)
}

/// コードをSHA-256でハッシュ化（16進小文字）
///
/// # Note
/// ハイフンを含む文字列全体をハッシュする。検証側が再ハッシュして
/// 比較できるよう決定的であること
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 提出されたコードがハッシュ集合に含まれるか検証
pub fn verify(hashes: &[String], submitted: &str) -> bool {
    let hash = hash_code(&normalize(submitted));
    hashes.iter().any(|h| h == &hash)
}

/// 一致したコードのハッシュを集合から除去した新しい集合を返す
///
/// 一致しない場合は集合をそのまま返す。呼び出し側は「変化なし」を
/// 検証失敗として扱うこと（ここではエラーにしない）
pub fn consume(hashes: &[String], submitted: &str) -> Vec<String> {
    let hash = hash_code(&normalize(submitted));
    hashes.iter().filter(|h| *h != &hash).cloned().collect()
}

/// 提出コードの正規化（前後空白の除去と大文字化）
///
/// 保存側のハッシュは生成時の正確な文字列形式に対して計算される
fn normalize(submitted: &str) -> String {
    submitted.trim().to_ascii_uppercase()
}

/// 4バイトを XXXX-XXXX 形式に整形
fn format_code(bytes: &[u8; CODE_BYTES]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    format!("{}-{}", &hex[..GROUP_LEN], &hex[GROUP_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_upper_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    }

    #[test]
    fn test_generate_codes_format() {
        let codes = generate_codes(10).unwrap();
        assert_eq!(codes.len(), 10);
        for code in &codes {
            // XXXX-XXXX（Xは大文字16進）
            assert_eq!(code.len(), 9);
            let (head, tail) = code.split_at(4);
            assert!(is_upper_hex(head));
            assert_eq!(&tail[..1], "-");
            assert!(is_upper_hex(&tail[1..]));
        }
    }

    #[test]
    fn test_generate_codes_are_distinct() {
        // 4バイト乱数10個の衝突確率は誕生日限界的に無視できる
        let codes = generate_codes(10).unwrap();
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_code("ABCD-1234"), hash_code("ABCD-1234"));
        assert_ne!(hash_code("ABCD-1234"), hash_code("ABCD-1235"));
    }

    #[test]
    fn test_verify_membership() {
        let hashes = vec![hash_code("ABCD-1234"), hash_code("00FF-EE11")];
        assert!(verify(&hashes, "ABCD-1234"));
        assert!(verify(&hashes, "00FF-EE11"));
        assert!(!verify(&hashes, "DEAD-BEEF"));
    }

    #[test]
    fn test_verify_normalizes_input() {
        let hashes = vec![hash_code("ABCD-1234")];
        assert!(verify(&hashes, "abcd-1234"));
        assert!(verify(&hashes, "  ABCD-1234  "));
    }

    #[test]
    fn test_consume_removes_only_match() {
        let hashes = vec![hash_code("ABCD-1234"), hash_code("00FF-EE11")];
        let remaining = consume(&hashes, "ABCD-1234");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0], hash_code("00FF-EE11"));
    }

    #[test]
    fn test_consume_is_single_use() {
        let hashes = vec![hash_code("ABCD-1234")];
        let after_first = consume(&hashes, "ABCD-1234");
        assert!(after_first.is_empty());

        // 2回目は no-op（コードの再利用は不可）
        let after_second = consume(&after_first, "ABCD-1234");
        assert!(after_second.is_empty());
        assert!(!verify(&after_first, "ABCD-1234"));
    }

    #[test]
    fn test_consume_miss_leaves_set_unchanged() {
        let hashes = vec![hash_code("ABCD-1234")];
        let remaining = consume(&hashes, "DEAD-BEEF");
        assert_eq!(remaining, hashes);
    }
}
