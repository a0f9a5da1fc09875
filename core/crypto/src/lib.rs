//! Cryptographic primitives for MagmaCrypt.
//!
//! This module provides:
//! - The Magma 64-bit block cipher with a 256-bit key
//! - Counter-mode keystream encryption for streams and files
//! - Key diversification using PBKDF2-HMAC-SHA256
//! - Key and nonce types with hex encoding and automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Derived keys are compared in constant time
//!
//! The stream mode provides confidentiality only; ciphertext is not
//! authenticated.

pub mod encoding;
pub mod kdf;
pub mod keys;
pub mod magma;
pub mod stream;

pub use kdf::{
    derive_key, derive_key_with_params, DerivedKeyRecord, KdfParams, KeyDerivationContext,
};
pub use keys::{CipherKey, MasterKey, Nonce, KEY_LENGTH, NONCE_LENGTH};
pub use magma::{MagmaCipher, BLOCK_SIZE};
pub use stream::{
    decrypt, decrypt_bytes, decrypt_file, encrypt, encrypt_bytes, encrypt_file, CounterState,
    KeystreamProcessor,
};
