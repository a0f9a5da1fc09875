//! Hexadecimal text codec for key material.
//!
//! Keys and nonces are persisted as hex text. Decoding is strict: the
//! trimmed text must be valid hex and decode to exactly the expected number
//! of bytes. Nothing is truncated or padded.

use magmacrypt_common::{Error, Result, SensitiveBytes};

/// Encode bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex text of any even length.
///
/// Leading and trailing whitespace (such as a trailing newline in a key
/// file) is ignored. Upper- and lowercase digits are both accepted.
///
/// # Errors
/// - `MalformedEncoding` if the text contains non-hex characters or has
///   an odd number of digits
pub fn decode_hex(text: &str) -> Result<SensitiveBytes> {
    hex::decode(text.trim())
        .map(SensitiveBytes::new)
        .map_err(|e| Error::MalformedEncoding(e.to_string()))
}

/// Decode hex text that must yield exactly `N` bytes.
///
/// `on_length` builds the error returned when the text is well-formed but
/// of the wrong size, so key and nonce callers can report their own
/// length variant.
pub(crate) fn decode_hex_exact<const N: usize>(
    text: &str,
    on_length: impl FnOnce(usize) -> Error,
) -> Result<[u8; N]> {
    let decoded = decode_hex(text)?;
    decoded
        .to_array::<N>()
        .ok_or_else(|| on_length(decoded.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_error(actual: usize) -> Error {
        Error::InvalidKeyLength {
            expected: 4,
            actual,
        }
    }

    #[test]
    fn test_decode_accepts_mixed_case_and_whitespace() {
        let decoded = decode_hex("  DeadBEEF\n").unwrap();
        assert_eq!(decoded.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        let result = decode_hex("zz00");
        assert!(matches!(result, Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let result = decode_hex("abc");
        assert!(matches!(result, Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn test_decode_exact_length_mismatch() {
        let result = decode_hex_exact::<4>("001122", length_error);
        assert!(matches!(
            result,
            Err(Error::InvalidKeyLength {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_decode_exact_prefers_encoding_error() {
        // Bad characters are reported even when the length is also wrong.
        let result = decode_hex_exact::<4>("xyz", length_error);
        assert!(matches!(result, Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn test_encode_is_lowercase() {
        assert_eq!(encode_hex(&[0xAB, 0x01]), "ab01");
        let decoded = decode_hex_exact::<2>(&encode_hex(&[0xAB, 0x01]), length_error).unwrap();
        assert_eq!(decoded, [0xAB, 0x01]);
    }
}
