//! Magma 64-bit block cipher.
//!
//! A 32-round Feistel network over 64-bit blocks with a 256-bit key. Blocks
//! are read and written little-endian, the round function is a modular
//! addition followed by a nibble-wise S-box substitution and a rotation by
//! 11 bits.
//!
//! # Security Guarantees
//! - The round key schedule is zeroized on drop
//! - The cipher holds no mutable state and can be shared across threads

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::{CipherKey, KEY_LENGTH};
use magmacrypt_common::{Error, Result};

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 8;

/// Number of Feistel rounds.
pub const ROUNDS: usize = 32;

/// Number of 32-bit words in the raw key.
const KEY_WORDS: usize = KEY_LENGTH / 4;

/// Left rotation applied at the end of the round function.
const ROUND_ROTATION: u32 = 11;

/// S-box rows; row `i` substitutes nibble `i` counted from the least
/// significant end of the word.
const SBOX: [[u8; 16]; 8] = [
    [4, 10, 9, 2, 13, 8, 0, 14, 6, 11, 1, 12, 7, 15, 5, 3],
    [14, 11, 4, 12, 6, 13, 15, 10, 2, 3, 8, 1, 0, 7, 5, 9],
    [5, 8, 1, 13, 10, 3, 4, 2, 14, 15, 12, 7, 6, 0, 9, 11],
    [7, 13, 10, 1, 0, 8, 9, 15, 14, 4, 6, 12, 11, 2, 5, 3],
    [6, 12, 7, 1, 5, 15, 13, 8, 4, 10, 9, 14, 0, 3, 11, 2],
    [4, 11, 10, 0, 7, 2, 1, 13, 3, 6, 8, 5, 9, 12, 15, 14],
    [13, 11, 4, 1, 3, 15, 5, 9, 0, 10, 14, 7, 6, 8, 2, 12],
    [1, 15, 13, 0, 5, 7, 10, 4, 9, 2, 3, 14, 6, 11, 8, 12],
];

/// The 32 round keys expanded from a 256-bit key.
///
/// Words 0..8 are the key as little-endian words, 8..24 repeat them twice
/// and 24..32 hold them in reverse order.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RoundKeySchedule {
    words: [u32; ROUNDS],
}

impl RoundKeySchedule {
    /// Expand a raw key into the round key schedule.
    pub fn expand(key: &[u8; KEY_LENGTH]) -> Self {
        let mut base = [0u32; KEY_WORDS];
        for (word, chunk) in base.iter_mut().zip(key.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let mut words = [0u32; ROUNDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = if i < 24 {
                base[i % KEY_WORDS]
            } else {
                base[KEY_WORDS - 1 - (i % KEY_WORDS)]
            };
        }
        base.zeroize();

        Self { words }
    }

    /// Round keys in application order.
    pub fn words(&self) -> &[u32; ROUNDS] {
        &self.words
    }
}

/// Round function: add the round key, substitute every nibble, rotate.
#[inline]
fn round_function(half: u32, round_key: u32) -> u32 {
    let value = half.wrapping_add(round_key);

    let mut substituted = 0u32;
    for (i, row) in SBOX.iter().enumerate() {
        let shift = 4 * i as u32;
        let nibble = (value >> shift) & 0x0F;
        substituted |= u32::from(row[nibble as usize]) << shift;
    }

    substituted.rotate_left(ROUND_ROTATION)
}

/// Magma block cipher keyed by an expanded 256-bit key.
#[derive(Clone)]
pub struct MagmaCipher {
    schedule: RoundKeySchedule,
}

impl MagmaCipher {
    /// Create a cipher from raw key bytes.
    ///
    /// # Errors
    /// - `InvalidKeyLength` unless `key` is exactly KEY_LENGTH bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: &[u8; KEY_LENGTH] = key.try_into().map_err(|_| Error::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: key.len(),
        })?;
        Ok(Self {
            schedule: RoundKeySchedule::expand(key),
        })
    }

    /// Create a cipher from a validated key.
    pub fn from_key(key: &CipherKey) -> Self {
        Self {
            schedule: RoundKeySchedule::expand(key.as_bytes()),
        }
    }

    /// Access the round key schedule.
    pub fn schedule(&self) -> &RoundKeySchedule {
        &self.schedule
    }

    /// Encrypt one block.
    ///
    /// The halves are written back as `(right, left)` after the last round.
    pub fn encrypt_block(&self, dst: &mut [u8; BLOCK_SIZE], src: &[u8; BLOCK_SIZE]) {
        feistel(self.schedule.words.iter(), dst, src);
    }

    /// Decrypt one block; the inverse of [`MagmaCipher::encrypt_block`].
    pub fn decrypt_block(&self, dst: &mut [u8; BLOCK_SIZE], src: &[u8; BLOCK_SIZE]) {
        feistel(self.schedule.words.iter().rev(), dst, src);
    }
}

fn feistel<'a>(
    round_keys: impl Iterator<Item = &'a u32>,
    dst: &mut [u8; BLOCK_SIZE],
    src: &[u8; BLOCK_SIZE],
) {
    let mut left = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    let mut right = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);

    for &round_key in round_keys {
        let new_right = left ^ round_function(right, round_key);
        left = right;
        right = new_right;
    }

    dst[..4].copy_from_slice(&right.to_le_bytes());
    dst[4..].copy_from_slice(&left.to_le_bytes());
}

impl std::fmt::Debug for MagmaCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MagmaCipher([REDACTED])")
    }
}
