//! Key and nonce types with secure memory handling.
//!
//! Key types zeroize their memory on drop so that key material does not
//! persist after the owner is done with it, including on error paths.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::{decode_hex_exact, encode_hex};
use crate::kdf::{self, DerivedKeyRecord};
use magmacrypt_common::{Error, Result};

/// Length of cipher and master keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of a nonce in bytes; one cipher block.
pub const NONCE_LENGTH: usize = 8;

fn key_length_error(actual: usize) -> Error {
    Error::InvalidKeyLength {
        expected: KEY_LENGTH,
        actual,
    }
}

fn nonce_length_error(actual: usize) -> Error {
    Error::InvalidNonceLength {
        expected: NONCE_LENGTH,
        actual,
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Key for the Magma block cipher.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LENGTH],
}

impl CipherKey {
    /// Create a cipher key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a cipher key from a slice.
    ///
    /// # Errors
    /// - `InvalidKeyLength` unless `key` is exactly KEY_LENGTH bytes
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = key.try_into().map_err(|_| key_length_error(key.len()))?;
        Ok(Self { key })
    }

    /// Parse a key from 64 hex characters.
    ///
    /// # Errors
    /// - `MalformedEncoding` for non-hex text
    /// - `InvalidKeyLength` if the text does not decode to KEY_LENGTH bytes
    pub fn from_hex(text: &str) -> Result<Self> {
        decode_hex_exact::<KEY_LENGTH>(text, key_length_error).map(Self::from_bytes)
    }

    /// Encode the key as lowercase hex.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.key)
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a random cipher key.
    pub fn generate() -> Self {
        Self {
            key: random_bytes(),
        }
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

/// Root key for key diversification.
///
/// Purpose-specific keys are derived from it with a label and context;
/// it is never used to encrypt data directly.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Parse a master key from 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self> {
        decode_hex_exact::<KEY_LENGTH>(text, key_length_error).map(Self::from_bytes)
    }

    /// Encode the key as lowercase hex.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.key)
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a random master key.
    pub fn generate() -> Self {
        Self {
            key: random_bytes(),
        }
    }

    /// Derive a purpose-specific key with the default KDF parameters.
    pub fn derive(&self, label: &str, context: &str) -> Result<DerivedKeyRecord> {
        kdf::derive_key(&self.key, label, context)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Initial counter value for one keystream pass.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LENGTH]);

impl Nonce {
    /// Create a nonce from raw bytes.
    pub fn from_bytes(bytes: [u8; NONCE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    ///
    /// # Errors
    /// - `InvalidNonceLength` unless `bytes` is exactly NONCE_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; NONCE_LENGTH] = bytes
            .try_into()
            .map_err(|_| nonce_length_error(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Parse a nonce from 16 hex characters.
    pub fn from_hex(text: &str) -> Result<Self> {
        decode_hex_exact::<NONCE_LENGTH>(text, nonce_length_error).map(Self)
    }

    /// Encode the nonce as lowercase hex.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    /// Get the nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LENGTH] {
        &self.0
    }

    /// Generate a random nonce.
    pub fn generate() -> Self {
        Self(random_bytes())
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_key_from_slice_rejects_wrong_length() {
        let result = CipherKey::from_slice(&[0u8; 31]);
        assert!(matches!(
            result,
            Err(Error::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: 31
            })
        ));
        assert!(CipherKey::from_slice(&[0u8; KEY_LENGTH]).is_ok());
    }

    #[test]
    fn test_cipher_key_hex_roundtrip() {
        let key = CipherKey::from_bytes([0x5Au8; KEY_LENGTH]);
        let text = key.to_hex();
        assert_eq!(text.len(), 64);

        let parsed = CipherKey::from_hex(&text.to_uppercase()).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_cipher_key_hex_wrong_length() {
        // 31 bytes of valid hex must not be silently accepted
        let result = CipherKey::from_hex(&"00".repeat(31));
        assert!(matches!(result, Err(Error::InvalidKeyLength { actual: 31, .. })));
    }

    #[test]
    fn test_cipher_key_hex_malformed() {
        let text = format!("{}zz", "00".repeat(31));
        let result = CipherKey::from_hex(&text);
        assert!(matches!(result, Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn test_nonce_validation() {
        assert!(matches!(
            Nonce::from_slice(&[0u8; 7]),
            Err(Error::InvalidNonceLength {
                expected: NONCE_LENGTH,
                actual: 7
            })
        ));
        assert!(matches!(
            Nonce::from_hex("0011223344556677889900"),
            Err(Error::InvalidNonceLength { actual: 11, .. })
        ));

        let nonce = Nonce::from_hex("0102030405060708\n").unwrap();
        assert_eq!(nonce.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(nonce.to_hex(), "0102030405060708");
    }

    #[test]
    fn test_generate_differs() {
        let key1 = CipherKey::generate();
        let key2 = CipherKey::generate();

        // Random keys should be different
        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_ne!(Nonce::generate(), Nonce::generate());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let key = CipherKey::from_bytes([1u8; KEY_LENGTH]);
        let master = MasterKey::from_bytes([1u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "CipherKey([REDACTED])");
        assert_eq!(format!("{:?}", master), "MasterKey([REDACTED])");
    }

    #[test]
    fn test_master_key_derive_is_deterministic() {
        let master = MasterKey::from_bytes([0u8; KEY_LENGTH]);

        let key1 = master.derive("test_label", "test_context").unwrap();
        let key2 = master.derive("test_label", "test_context").unwrap();

        // Same input should produce same key
        assert_eq!(key1, key2);

        // Different input should produce different key
        let key3 = master.derive("test_label2", "test_context2").unwrap();
        assert_ne!(key1, key3);
    }
}
