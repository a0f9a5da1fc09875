//! Key diversification using PBKDF2-HMAC-SHA256.
//!
//! A purpose-specific key is derived from a master key and a
//! `(label, context)` pair. The diversification string
//! `label || "||" || context` is used as the PBKDF2 salt, so the same
//! inputs always produce the same key.

use hmac::Hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::{CipherKey, MasterKey, KEY_LENGTH};
use magmacrypt_common::{Error, Result};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Default maximum label length in bytes of UTF-8.
pub const LABEL_MAX_LEN: usize = 64;

/// Default maximum context length in bytes of UTF-8.
pub const CONTEXT_MAX_LEN: usize = 64;

/// Separator between label and context in the diversification string.
const SEPARATOR: &str = "||";

/// Label reported before anything has been derived.
pub const DEFAULT_LABEL: &str = "default_label";

/// Context reported before anything has been derived.
pub const DEFAULT_CONTEXT: &str = "default_context";

/// Parameters for PBKDF2 key diversification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// Labels longer than this many bytes are truncated.
    pub label_max_len: usize,
    /// Contexts longer than this many bytes are truncated.
    pub context_max_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            label_max_len: LABEL_MAX_LEN,
            context_max_len: CONTEXT_MAX_LEN,
        }
    }
}

/// A derived key together with the label and context that produced it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeyRecord {
    key: [u8; KEY_LENGTH],
    label: String,
    context: String,
}

impl DerivedKeyRecord {
    /// Rebuild a record from persisted parts.
    pub fn from_parts(
        key: [u8; KEY_LENGTH],
        label: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            key,
            label: label.into(),
            context: context.into(),
        }
    }

    /// Derived key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Label after truncation.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Context after truncation.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Use the derived bytes as a block cipher key.
    pub fn to_cipher_key(&self) -> CipherKey {
        CipherKey::from_bytes(self.key)
    }
}

impl PartialEq for DerivedKeyRecord {
    /// Constant-time on the key bytes.
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.key.ct_eq(&other.key))
            && self.label == other.label
            && self.context == other.context
    }
}

impl Eq for DerivedKeyRecord {}

impl fmt::Debug for DerivedKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeyRecord")
            .field("key", &"[REDACTED]")
            .field("label", &self.label)
            .field("context", &self.context)
            .finish()
    }
}

/// Keep at most `max` bytes of the UTF-8 encoding.
///
/// The cut may land inside a code point; the salt uses the raw bytes.
fn truncate_bytes(value: &str, max: usize) -> &[u8] {
    let bytes = value.as_bytes();
    &bytes[..bytes.len().min(max)]
}

/// Derive a key with the default parameters.
///
/// # Errors
/// - `InvalidKeyLength` unless `master_key` is exactly KEY_LENGTH bytes
pub fn derive_key(master_key: &[u8], label: &str, context: &str) -> Result<DerivedKeyRecord> {
    derive_key_with_params(master_key, label, context, &KdfParams::default())
}

/// Derive a key from `master_key` diversified by `label` and `context`.
///
/// # Preconditions
/// - `master_key` is KEY_LENGTH bytes
/// - `params.iterations` is at least 1
///
/// # Postconditions
/// - The derived key is KEY_LENGTH bytes
/// - Identical inputs always produce an identical key
/// - The record carries the truncated label and context; a code point
///   split by truncation shows as U+FFFD there
pub fn derive_key_with_params(
    master_key: &[u8],
    label: &str,
    context: &str,
    params: &KdfParams,
) -> Result<DerivedKeyRecord> {
    if master_key.len() != KEY_LENGTH {
        return Err(Error::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: master_key.len(),
        });
    }
    if params.iterations == 0 {
        return Err(Error::InvalidInput(
            "PBKDF2 iterations must be at least 1".to_string(),
        ));
    }

    let label = truncate_bytes(label, params.label_max_len);
    let context = truncate_bytes(context, params.context_max_len);
    let diversifier = [label, SEPARATOR.as_bytes(), context].concat();

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(
        master_key,
        &diversifier,
        params.iterations,
        &mut key,
    )
    .map_err(|e| Error::Crypto(format!("PBKDF2 failed: {e}")))?;

    Ok(DerivedKeyRecord {
        key,
        label: String::from_utf8_lossy(label).into_owned(),
        context: String::from_utf8_lossy(context).into_owned(),
    })
}

/// Owner of a master key and the keys derived from it.
///
/// Replaces process-wide master key state: whoever issues derived keys
/// holds one of these and passes it explicitly.
#[derive(Debug)]
pub struct KeyDerivationContext {
    master_key: MasterKey,
    params: KdfParams,
    current: Option<DerivedKeyRecord>,
}

impl KeyDerivationContext {
    /// Create a context around an existing master key.
    pub fn new(master_key: MasterKey) -> Self {
        Self::with_params(master_key, KdfParams::default())
    }

    /// Create a context with custom KDF parameters.
    pub fn with_params(master_key: MasterKey, params: KdfParams) -> Self {
        Self {
            master_key,
            params,
            current: None,
        }
    }

    /// Create a context with a freshly generated master key.
    pub fn generate() -> Self {
        Self::new(MasterKey::generate())
    }

    /// KDF parameters in use.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Master key in use.
    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }

    /// Derive a key and remember it as the current one.
    pub fn derive(&mut self, label: &str, context: &str) -> Result<&DerivedKeyRecord> {
        let record =
            derive_key_with_params(self.master_key.as_bytes(), label, context, &self.params)?;
        Ok(&*self.current.insert(record))
    }

    /// Most recently derived key, if any.
    pub fn current(&self) -> Option<&DerivedKeyRecord> {
        self.current.as_ref()
    }

    /// Label and context of the current key, or the defaults.
    pub fn current_parameters(&self) -> (&str, &str) {
        match &self.current {
            Some(record) => (record.label(), record.context()),
            None => (DEFAULT_LABEL, DEFAULT_CONTEXT),
        }
    }

    /// Replace the current key with one loaded from storage.
    pub fn restore(&mut self, record: DerivedKeyRecord) {
        self.current = Some(record);
    }

    /// Replace the master key.
    ///
    /// Previously derived keys are not re-derived; the current record keeps
    /// its bytes and nothing links it to the old master key afterwards.
    /// The old master key is zeroized when dropped here.
    pub fn rotate_master_key(&mut self, master_key: MasterKey) {
        self.master_key = master_key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_MASTER: [u8; KEY_LENGTH] = [0u8; KEY_LENGTH];

    fn fast_params() -> KdfParams {
        KdfParams {
            iterations: 2,
            ..KdfParams::default()
        }
    }

    #[test]
    fn test_derive_key_deterministic() {
        let key1 = derive_key(&ZERO_MASTER, "test_label", "test_context").unwrap();
        let key2 = derive_key(&ZERO_MASTER, "test_label", "test_context").unwrap();

        assert_eq!(key1, key2);
        assert_eq!(key1.as_bytes().len(), KEY_LENGTH);
    }

    #[test]
    fn test_derive_key_golden_vectors() {
        let key1 = derive_key(&ZERO_MASTER, "test_label", "test_context").unwrap();
        assert_eq!(
            hex::encode(key1.as_bytes()),
            "a711be766a5955b0f3ae280ae60d30b9dab3332a5d151ecc0a6d21c2120a7629"
        );

        let key2 = derive_key(&ZERO_MASTER, "test_label2", "test_context2").unwrap();
        assert_eq!(
            hex::encode(key2.as_bytes()),
            "835f0d6cd92154c51364457197badcb8a8d5ef1463a165692bd2cce7e498f513"
        );
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_truncates_inputs() {
        let long_label = "a".repeat(100);
        let long_context = "b".repeat(65);

        let record = derive_key(&ZERO_MASTER, &long_label, &long_context).unwrap();
        assert_eq!(record.label(), "a".repeat(64));
        assert_eq!(record.context(), "b".repeat(64));
        assert_eq!(
            hex::encode(record.as_bytes()),
            "941133179cbe7ae60a6b3d6068e9b5b9b84064030c66fb24c849c7a8a4c83671"
        );
    }

    #[test]
    fn test_truncation_counts_utf8_bytes() {
        let record = derive_key(&ZERO_MASTER, &"ключ".repeat(20), "ctx").unwrap();
        assert_eq!(record.label(), "ключ".repeat(8));
        assert_eq!(record.label().len(), LABEL_MAX_LEN);
        assert_eq!(
            hex::encode(record.as_bytes()),
            "9032d569973e2940335d562a8ad4983b276432e1d3b9aae87670763437b7d57f"
        );
    }

    #[test]
    fn test_truncation_may_split_code_point() {
        let label = format!("a{}", "я".repeat(40));
        let record = derive_key(&ZERO_MASTER, &label, "ctx").unwrap();
        assert_eq!(
            hex::encode(record.as_bytes()),
            "ede46c59e146b99e348f22b42cc8708e50a105929648f59d80f2fc61387afee5"
        );
        assert!(record.label().ends_with('\u{FFFD}'));
        assert_eq!(truncate_bytes(&label, LABEL_MAX_LEN).len(), LABEL_MAX_LEN);
        assert_eq!(truncate_bytes("short", LABEL_MAX_LEN), b"short");
    }

    #[test]
    fn test_separator_is_part_of_salt() {
        // Moving a character across the separator changes the salt
        let key1 = derive_key_with_params(&ZERO_MASTER, "ab", "c", &fast_params()).unwrap();
        let key2 = derive_key_with_params(&ZERO_MASTER, "a", "bc", &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_rejects_bad_input() {
        assert!(matches!(
            derive_key(&[0u8; 16], "l", "c"),
            Err(Error::InvalidKeyLength { actual: 16, .. })
        ));

        let params = KdfParams {
            iterations: 0,
            ..KdfParams::default()
        };
        assert!(matches!(
            derive_key_with_params(&ZERO_MASTER, "l", "c", &params),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_params_from_json_fill_defaults() {
        let params: KdfParams = serde_json::from_str(r#"{"iterations": 500}"#).unwrap();
        assert_eq!(params.iterations, 500);
        assert_eq!(params.label_max_len, LABEL_MAX_LEN);
        assert_eq!(params.context_max_len, CONTEXT_MAX_LEN);
    }

    #[test]
    fn test_context_tracks_current_record() {
        let mut ctx =
            KeyDerivationContext::with_params(MasterKey::from_bytes(ZERO_MASTER), fast_params());
        assert!(ctx.current().is_none());
        assert_eq!(ctx.current_parameters(), (DEFAULT_LABEL, DEFAULT_CONTEXT));

        let derived = ctx.derive("disk", "backup").unwrap().clone();
        assert_eq!(ctx.current(), Some(&derived));
        assert_eq!(ctx.current_parameters(), ("disk", "backup"));
    }

    #[test]
    fn test_rotation_keeps_issued_keys() {
        let mut ctx =
            KeyDerivationContext::with_params(MasterKey::from_bytes(ZERO_MASTER), fast_params());
        let before = ctx.derive("label", "context").unwrap().clone();

        ctx.rotate_master_key(MasterKey::from_bytes([7u8; KEY_LENGTH]));
        assert_eq!(ctx.current(), Some(&before));

        let after = ctx.derive("label", "context").unwrap().clone();
        assert_ne!(before.as_bytes(), after.as_bytes());
    }

    #[test]
    fn test_restore_record() {
        let mut ctx = KeyDerivationContext::generate();
        ctx.restore(DerivedKeyRecord::from_parts([3u8; KEY_LENGTH], "l", "c"));
        assert_eq!(ctx.current_parameters(), ("l", "c"));
    }

    #[test]
    fn test_derived_key_feeds_cipher() {
        let record = derive_key_with_params(&ZERO_MASTER, "file", "enc", &fast_params()).unwrap();
        let key = record.to_cipher_key();
        assert_eq!(key.as_bytes(), record.as_bytes());
        assert!(crate::magma::MagmaCipher::new(key.as_bytes()).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let record = DerivedKeyRecord::from_parts([9u8; KEY_LENGTH], "l", "c");
        let debug = format!("{:?}", record);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("9, 9"));
    }
}
