//! Base32 コーデック（RFC 4648、パディングなし）
//!
//! エンコードは標準の RFC 4648 アルファベット（A-Z2-7）。
//! デコードは認証アプリ互換のため寛容に動作する:
//! - 大文字小文字を区別しない
//! - アルファベット外の文字（ハイフン・空白など）は読み飛ばす
//! - 末尾の端数ビットは切り捨てる
//! - 不正入力でもエラーにしない
//!
//! 認証アプリやユーザー入力はシークレットを小文字・ハイフン区切りで
//! 返すことがあるため、この挙動は互換性要件として変更不可。

use data_encoding::BASE32_NOPAD;

/// バイト列をBase32文字列にエンコード
pub fn encode(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes)
}

/// Base32文字列をバイト列にデコード（寛容モード）
pub fn decode(input: &str) -> Vec<u8> {
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(input.len() * 5 / 8);

    for c in input.chars() {
        let c = c.to_ascii_uppercase();
        let value = match c {
            'A'..='Z' => c as u32 - 'A' as u32,
            '2'..='7' => c as u32 - '2' as u32 + 26,
            // アルファベット外は読み飛ばす
            _ => continue,
        };

        buffer = (buffer << 5) | value;
        bits += 5;

        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }

    // 末尾の端数ビット（bits < 8）はゼロパディング由来なので捨てる
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rfc4648_vectors() {
        // RFC 4648 §10 のテストベクター（パディング除去済み）
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "MY");
        assert_eq!(encode(b"fo"), "MZXQ");
        assert_eq!(encode(b"foo"), "MZXW6");
        assert_eq!(encode(b"foob"), "MZXW6YQ");
        assert_eq!(encode(b"fooba"), "MZXW6YTB");
        assert_eq!(encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_decode_inverse_of_encode() {
        // 5バイトの倍数はパディングの曖昧さがなく完全に復元できる
        let buffers: [&[u8]; 3] = [b"fooba", b"0123456789", &[0u8; 20]];
        for b in buffers {
            assert_eq!(decode(&encode(b)), b);
        }
    }

    #[test]
    fn test_decode_truncates_partial_byte() {
        // "MY" = 10ビット → 1バイト + 端数2ビット（切り捨て）
        assert_eq!(decode("MY"), b"f");
        assert_eq!(decode("MZXW6"), b"foo");
    }

    #[test]
    fn test_decode_case_insensitive() {
        assert_eq!(decode("mzxw6ytboi"), b"foobar");
        assert_eq!(decode("MzXw6yTbOi"), b"foobar");
    }

    #[test]
    fn test_decode_skips_foreign_characters() {
        // ハイフン・空白・パディング文字は無視される
        assert_eq!(decode("MZXW-6YTB-OI"), b"foobar");
        assert_eq!(decode(" MZXW6 YTBOI "), b"foobar");
        assert_eq!(decode("MY======"), b"f");
    }

    #[test]
    fn test_decode_garbage_yields_empty() {
        // 不正入力でもエラーにしない
        assert_eq!(decode("!!!???"), Vec::<u8>::new());
        assert_eq!(decode(""), Vec::<u8>::new());
    }

    #[test]
    fn test_twenty_byte_secret_is_32_chars() {
        // 20バイト（160ビット）= 32文字ちょうど
        assert_eq!(encode(&[0xABu8; 20]).len(), 32);
    }
}
