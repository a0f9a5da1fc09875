//! Hex text files holding keys, nonces and derived keys.
//!
//! Secrets are written as lowercase hex with owner-only permissions on
//! unix. A derived key file holds three lines: the key, the label and the
//! context.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

use magmacrypt_crypto::{CipherKey, DerivedKeyRecord, MasterKey, Nonce};

/// Default location of the cipher key.
pub const DEFAULT_KEY_FILE: &str = "secret_key.txt";

/// Default location of the nonce.
pub const DEFAULT_NONCE_FILE: &str = "secret_nonce.txt";

/// Default location of the master key used for derivation.
pub const DEFAULT_MASTER_KEY_FILE: &str = "master_key.txt";

/// Default location of the most recent derived key.
pub const DEFAULT_DERIVED_FILE: &str = "derived_key.txt";

/// Write secret text, replacing any existing file.
pub fn write_secret(path: &Path, text: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_secret(path: &Path) -> Result<Zeroizing<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Zeroizing::new(text))
}

/// Load a cipher key from hex text.
pub fn read_key(path: &Path) -> Result<CipherKey> {
    let text = read_secret(path)?;
    CipherKey::from_hex(&text).with_context(|| format!("Invalid key in {}", path.display()))
}

/// Store a cipher key as hex text.
pub fn write_key(path: &Path, key: &CipherKey) -> Result<()> {
    write_secret(path, &Zeroizing::new(key.to_hex()))
}

/// Load a nonce from hex text.
pub fn read_nonce(path: &Path) -> Result<Nonce> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Nonce::from_hex(&text).with_context(|| format!("Invalid nonce in {}", path.display()))
}

/// Store a nonce as hex text.
pub fn write_nonce(path: &Path, nonce: &Nonce) -> Result<()> {
    write_secret(path, &nonce.to_hex())
}

/// Load a master key from hex text.
pub fn read_master_key(path: &Path) -> Result<MasterKey> {
    let text = read_secret(path)?;
    MasterKey::from_hex(&text).with_context(|| format!("Invalid master key in {}", path.display()))
}

/// Store a master key as hex text.
pub fn write_master_key(path: &Path, key: &MasterKey) -> Result<()> {
    write_secret(path, &Zeroizing::new(key.to_hex()))
}

/// Store a derived key with its label and context.
pub fn write_derived(path: &Path, record: &DerivedKeyRecord) -> Result<()> {
    for (name, value) in [("label", record.label()), ("context", record.context())] {
        if value.contains(&['\r', '\n'][..]) {
            bail!("Derived key {name} must not contain line breaks");
        }
    }

    let text = Zeroizing::new(format!(
        "{}\n{}\n{}",
        magmacrypt_crypto::encoding::encode_hex(record.as_bytes()),
        record.label(),
        record.context()
    ));
    write_secret(path, &text)
}

/// Load a derived key file written by [`write_derived`].
pub fn read_derived(path: &Path) -> Result<DerivedKeyRecord> {
    let text = read_secret(path)?;
    let mut lines = text.split('\n');

    let (Some(key_hex), Some(label), Some(context)) = (lines.next(), lines.next(), lines.next())
    else {
        bail!("Invalid derived key file format: {}", path.display());
    };

    let key = CipherKey::from_hex(key_hex)
        .with_context(|| format!("Invalid derived key in {}", path.display()))?;

    Ok(DerivedKeyRecord::from_parts(
        *key.as_bytes(),
        label.trim_end_matches('\r'),
        context.trim_end_matches(&['\r', '\n'][..]),
    ))
}
