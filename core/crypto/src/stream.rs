//! Counter-mode keystream encryption for files of any length.
//!
//! The keystream is produced one block at a time: before each new block
//! the counter is incremented as a little-endian `u64` and encrypted with
//! the block cipher. Data is XORed against the keystream, so running the
//! same key and starting nonce over ciphertext recovers the plaintext.
//!
//! The mode provides confidentiality only. There is no authentication tag.
//!
//! A [`KeystreamProcessor`] is single-use per message: its counter keeps
//! advancing across calls, and driving a whole stream through a processor
//! that has already produced keystream is rejected with
//! `Error::InstanceReuse` unless it is explicitly [rewound](KeystreamProcessor::rewind).

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use zeroize::{Zeroize, Zeroizing};

use crate::keys::{Nonce, NONCE_LENGTH};
use crate::magma::{MagmaCipher, BLOCK_SIZE};
use magmacrypt_common::{Error, Result};

/// Default chunk size for streaming encryption (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Block counter driving the keystream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CounterState([u8; BLOCK_SIZE]);

impl CounterState {
    /// Start a counter at the given nonce.
    pub fn from_nonce(nonce: &Nonce) -> Self {
        Self(*nonce.as_bytes())
    }

    /// Advance by one, wrapping at `u64::MAX`.
    pub fn increment(&mut self) {
        let next = u64::from_le_bytes(self.0).wrapping_add(1);
        self.0 = next.to_le_bytes();
    }

    /// Counter bytes as fed to the block cipher.
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }

    /// Counter as a little-endian integer.
    pub fn value(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }
}

/// Keystream generator for one message.
///
/// Borrows the cipher, so several processors can share one engine while
/// each owns its counter.
pub struct KeystreamProcessor<'a> {
    cipher: &'a MagmaCipher,
    initial: CounterState,
    counter: CounterState,
    keystream: [u8; BLOCK_SIZE],
    /// Offset of the next unused keystream byte; BLOCK_SIZE when exhausted.
    position: usize,
    auth_subkey: u64,
    chunk_size: usize,
    processed: u64,
}

impl<'a> KeystreamProcessor<'a> {
    /// Create a processor from raw nonce bytes.
    ///
    /// # Errors
    /// - `InvalidNonceLength` unless `nonce` is exactly NONCE_LENGTH bytes
    pub fn new(cipher: &'a MagmaCipher, nonce: &[u8]) -> Result<Self> {
        let nonce = Nonce::from_slice(nonce)?;
        Ok(Self::with_nonce(cipher, &nonce))
    }

    /// Create a processor from a validated nonce.
    pub fn with_nonce(cipher: &'a MagmaCipher, nonce: &Nonce) -> Self {
        let mut zero_block = [0u8; BLOCK_SIZE];
        cipher.encrypt_block(&mut zero_block, &[0u8; BLOCK_SIZE]);
        let auth_subkey = u64::from_le_bytes(zero_block);
        zero_block.zeroize();

        let initial = CounterState::from_nonce(nonce);
        Self {
            cipher,
            initial,
            counter: initial,
            keystream: [0u8; BLOCK_SIZE],
            position: BLOCK_SIZE,
            auth_subkey,
            chunk_size: DEFAULT_CHUNK_SIZE,
            processed: 0,
        }
    }

    /// Set a custom chunk size for [`process_stream`](Self::process_stream).
    ///
    /// # Errors
    /// - `InvalidInput` unless `size` is a non-zero multiple of BLOCK_SIZE
    pub fn with_chunk_size(mut self, size: usize) -> Result<Self> {
        if size == 0 || size % BLOCK_SIZE != 0 {
            return Err(Error::InvalidInput(format!(
                "Chunk size must be a non-zero multiple of {}, got {}",
                BLOCK_SIZE, size
            )));
        }
        self.chunk_size = size;
        Ok(self)
    }

    /// Encryption of the all-zero block under this key.
    ///
    /// Computed at construction and kept for an authentication layer; it
    /// does not influence the keystream.
    pub fn auth_subkey(&self) -> u64 {
        self.auth_subkey
    }

    /// Current counter value.
    pub fn counter(&self) -> &CounterState {
        &self.counter
    }

    /// Counter value the processor was created with.
    pub fn initial_counter(&self) -> &CounterState {
        &self.initial
    }

    /// Total bytes transformed since creation or the last rewind.
    pub fn bytes_processed(&self) -> u64 {
        self.processed
    }

    /// Whether any keystream has been generated.
    pub fn has_started(&self) -> bool {
        self.counter != self.initial || self.processed > 0
    }

    /// Restore the initial counter so the processor can start a new pass.
    ///
    /// Rewinding and processing another message reuses the keystream of
    /// the first one; only do this to repeat a pass over the same data
    /// (e.g. decrypt what was just encrypted).
    pub fn rewind(&mut self) {
        self.counter = self.initial;
        self.keystream.zeroize();
        self.position = BLOCK_SIZE;
        self.processed = 0;
    }

    /// XOR `buf` in place with the next `buf.len()` keystream bytes.
    ///
    /// Consecutive calls continue one keystream, so splitting a message
    /// into arbitrary pieces yields the same output as a single call. An
    /// empty buffer generates no keystream block.
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            if self.position == BLOCK_SIZE {
                self.counter.increment();
                self.cipher
                    .encrypt_block(&mut self.keystream, self.counter.as_bytes());
                self.position = 0;
            }
            *byte ^= self.keystream[self.position];
            self.position += 1;
        }
        self.processed += buf.len() as u64;
    }

    /// Transform everything from `reader` and write it to `writer`.
    ///
    /// Input is read in chunks of the configured size; each chunk is
    /// transformed and written before the next read, so memory use does not
    /// depend on the input length.
    ///
    /// # Postconditions
    /// - Output length equals input length
    /// - Returns the number of bytes processed
    ///
    /// # Errors
    /// - `InstanceReuse` if this processor already produced keystream
    /// - `Io` for read or write failures; output is then partially written
    pub fn process_stream<R: Read, W: Write>(
        &mut self,
        mut reader: R,
        mut writer: W,
    ) -> Result<u64> {
        if self.has_started() {
            return Err(Error::InstanceReuse(format!(
                "Keystream processor already at counter {:#018x}; rewind or create a new one",
                self.counter.value()
            )));
        }

        let mut buffer = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = read_chunk(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            let chunk = &mut buffer[..bytes_read];
            self.apply_keystream(chunk);
            writer.write_all(chunk)?;
            total_bytes += bytes_read as u64;
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

impl Drop for KeystreamProcessor<'_> {
    fn drop(&mut self) {
        self.keystream.zeroize();
    }
}

/// Fill `buffer` from the reader, stopping early only at end of input.
fn read_chunk<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut total_read = 0;

    while total_read < buffer.len() {
        match reader.read(&mut buffer[total_read..]) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(total_read)
}

fn apply<R: Read, W: Write>(reader: R, writer: W, key: &[u8], nonce: &[u8]) -> Result<u64> {
    let cipher = MagmaCipher::new(key)?;
    let mut processor = KeystreamProcessor::new(&cipher, nonce)?;
    processor.process_stream(reader, writer)
}

/// Encrypt everything from `reader` into `writer`.
///
/// # Errors
/// - `InvalidKeyLength` / `InvalidNonceLength` before any byte is read
/// - `Io` for read or write failures
pub fn encrypt<R: Read, W: Write>(reader: R, writer: W, key: &[u8], nonce: &[u8]) -> Result<u64> {
    apply(reader, writer, key, nonce)
}

/// Decrypt everything from `reader` into `writer`.
///
/// Identical to [`encrypt`]: the same keystream from the same starting
/// nonce undoes the XOR.
pub fn decrypt<R: Read, W: Write>(reader: R, writer: W, key: &[u8], nonce: &[u8]) -> Result<u64> {
    apply(reader, writer, key, nonce)
}

/// Encrypt a complete byte slice.
pub fn encrypt_bytes(key: &[u8], nonce: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len());
    encrypt(data, &mut output, key, nonce)?;
    Ok(output)
}

/// Decrypt a complete byte slice.
pub fn decrypt_bytes(key: &[u8], nonce: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len());
    decrypt(data, &mut output, key, nonce)?;
    Ok(output)
}

fn apply_file(input: &Path, output: &Path, key: &[u8], nonce: &[u8]) -> Result<u64> {
    // Key and nonce are validated before the output file is created
    let cipher = MagmaCipher::new(key)?;
    let mut processor = KeystreamProcessor::new(&cipher, nonce)?;

    let reader = File::open(input)?;
    let writer = BufWriter::new(File::create(output)?);
    processor.process_stream(reader, writer)
}

/// Encrypt the file at `input` into a new file at `output`.
///
/// # Errors
/// - Key or nonce validation errors before any file is opened
/// - `Io` if the input cannot be opened, the output cannot be created, or
///   a read or write fails
pub fn encrypt_file(input: &Path, output: &Path, key: &[u8], nonce: &[u8]) -> Result<u64> {
    apply_file(input, output, key, nonce)
}

/// Decrypt the file at `input` into a new file at `output`.
pub fn decrypt_file(input: &Path, output: &Path, key: &[u8], nonce: &[u8]) -> Result<u64> {
    apply_file(input, output, key, nonce)
}

const _: () = assert!(NONCE_LENGTH == BLOCK_SIZE);
const _: () = assert!(DEFAULT_CHUNK_SIZE % BLOCK_SIZE == 0);
