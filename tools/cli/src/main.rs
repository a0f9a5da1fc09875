//! MagmaCrypt CLI - Command line interface for file encryption.
//!
//! This tool encrypts and decrypts files with the Magma counter-mode
//! keystream, manages hex key and nonce files, and diversifies a master
//! key into purpose-specific keys.

mod keyfile;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use magmacrypt_crypto::{
    decrypt_bytes, decrypt_file, derive_key, encrypt_bytes, encrypt_file, CipherKey, KdfParams,
    KeyDerivationContext, MasterKey, Nonce,
};

use keyfile::{
    DEFAULT_DERIVED_FILE, DEFAULT_KEY_FILE, DEFAULT_MASTER_KEY_FILE, DEFAULT_NONCE_FILE,
};

#[derive(Parser)]
#[command(name = "magmacrypt")]
#[command(about = "MagmaCrypt - Magma counter-mode file encryption")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new random key and nonce.
    Keygen {
        /// Where to store the key.
        #[arg(short, long, default_value = DEFAULT_KEY_FILE)]
        key_file: PathBuf,

        /// Where to store the nonce.
        #[arg(short, long, default_value = DEFAULT_NONCE_FILE)]
        nonce_file: PathBuf,
    },

    /// Encrypt a file.
    Encrypt {
        /// File to encrypt.
        #[arg(short, long)]
        input: PathBuf,

        /// Destination of the ciphertext.
        #[arg(short, long)]
        output: PathBuf,

        /// Key file (hex).
        #[arg(short, long, default_value = DEFAULT_KEY_FILE)]
        key_file: PathBuf,

        /// Nonce file (hex).
        #[arg(short, long, default_value = DEFAULT_NONCE_FILE)]
        nonce_file: PathBuf,

        /// Generate and store a fresh key and nonce before encrypting.
        #[arg(short, long)]
        generate: bool,
    },

    /// Decrypt a file.
    Decrypt {
        /// File to decrypt.
        #[arg(short, long)]
        input: PathBuf,

        /// Destination of the plaintext.
        #[arg(short, long)]
        output: PathBuf,

        /// Key file (hex).
        #[arg(short, long, default_value = DEFAULT_KEY_FILE)]
        key_file: PathBuf,

        /// Nonce file (hex).
        #[arg(short, long, default_value = DEFAULT_NONCE_FILE)]
        nonce_file: PathBuf,
    },

    /// Replace the encryption key with a given one, or a random one.
    SetKey {
        /// New key as 64 hex characters; generated when omitted.
        key: Option<String>,

        /// Key file to write.
        #[arg(short, long, default_value = DEFAULT_KEY_FILE)]
        key_file: PathBuf,
    },

    /// Derive a purpose-specific key from the master key.
    Derive {
        /// Label (truncated to 64 characters).
        #[arg(short, long)]
        label: String,

        /// Context (truncated to 64 characters).
        #[arg(short, long)]
        context: String,

        /// Master key file; created with a random key if missing.
        #[arg(short, long, default_value = DEFAULT_MASTER_KEY_FILE)]
        master_key_file: PathBuf,

        /// Where to store the derived key, label and context.
        #[arg(short, long, default_value = DEFAULT_DERIVED_FILE)]
        out: PathBuf,

        /// JSON file with KDF parameters.
        #[arg(long)]
        kdf_params: Option<PathBuf>,
    },

    /// Show the most recently derived key.
    ShowDerived {
        /// Derived key file.
        #[arg(short, long, default_value = DEFAULT_DERIVED_FILE)]
        file: PathBuf,
    },

    /// Replace the master key with a given one, or a random one.
    RotateMaster {
        /// New master key as 64 hex characters; generated when omitted.
        key: Option<String>,

        /// Master key file to write.
        #[arg(short, long, default_value = DEFAULT_MASTER_KEY_FILE)]
        master_key_file: PathBuf,
    },

    /// Check key derivation and cipher round trips.
    SelfTest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Keygen {
            key_file,
            nonce_file,
        } => cmd_keygen(&key_file, &nonce_file),

        Commands::Encrypt {
            input,
            output,
            key_file,
            nonce_file,
            generate,
        } => cmd_encrypt(&input, &output, &key_file, &nonce_file, generate),

        Commands::Decrypt {
            input,
            output,
            key_file,
            nonce_file,
        } => cmd_decrypt(&input, &output, &key_file, &nonce_file),

        Commands::SetKey { key, key_file } => cmd_set_key(key.as_deref(), &key_file),

        Commands::Derive {
            label,
            context,
            master_key_file,
            out,
            kdf_params,
        } => cmd_derive(
            &label,
            &context,
            &master_key_file,
            &out,
            kdf_params.as_deref(),
        ),

        Commands::ShowDerived { file } => cmd_show_derived(&file),

        Commands::RotateMaster {
            key,
            master_key_file,
        } => cmd_rotate_master(key.as_deref(), &master_key_file),

        Commands::SelfTest => cmd_self_test(),
    }
}

/// Reject paths that cannot be used as an input or output file.
fn check_paths(input: &Path, output: &Path) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    if output.is_dir() {
        anyhow::bail!(
            "Output must be a file path, not a directory: {}",
            output.display()
        );
    }
    Ok(())
}

/// Generate and store a fresh key and nonce.
fn generate_key_material(key_file: &Path, nonce_file: &Path) -> Result<(CipherKey, Nonce)> {
    let key = CipherKey::generate();
    let nonce = Nonce::generate();
    keyfile::write_key(key_file, &key)?;
    keyfile::write_nonce(nonce_file, &nonce)?;
    info!(
        key_file = %key_file.display(),
        nonce_file = %nonce_file.display(),
        "Generated new key material"
    );
    Ok((key, nonce))
}

fn load_key_material(key_file: &Path, nonce_file: &Path) -> Result<(CipherKey, Nonce)> {
    let key = keyfile::read_key(key_file)?;
    let nonce = keyfile::read_nonce(nonce_file)?;
    debug!(
        key_file = %key_file.display(),
        nonce_file = %nonce_file.display(),
        "Loaded key material"
    );
    Ok((key, nonce))
}

fn cmd_keygen(key_file: &Path, nonce_file: &Path) -> Result<()> {
    generate_key_material(key_file, nonce_file)?;

    println!("Key saved to {}", key_file.display());
    println!("Nonce saved to {}", nonce_file.display());
    Ok(())
}

fn cmd_encrypt(
    input: &Path,
    output: &Path,
    key_file: &Path,
    nonce_file: &Path,
    generate: bool,
) -> Result<()> {
    info!(input = %input.display(), output = %output.display(), "Encrypting file");
    check_paths(input, output)?;

    let (key, nonce) = if generate {
        generate_key_material(key_file, nonce_file)?
    } else {
        load_key_material(key_file, nonce_file)?
    };

    let size = encrypt_file(input, output, key.as_bytes(), nonce.as_bytes())
        .context("Failed to encrypt file")?;

    info!(output = %output.display(), size, "File encrypted");
    println!("File encrypted successfully: {} ({} bytes)", output.display(), size);
    if generate {
        println!("New key saved to {}", key_file.display());
        println!("New nonce saved to {}", nonce_file.display());
    }
    Ok(())
}

fn cmd_decrypt(input: &Path, output: &Path, key_file: &Path, nonce_file: &Path) -> Result<()> {
    info!(input = %input.display(), output = %output.display(), "Decrypting file");
    check_paths(input, output)?;

    let (key, nonce) = load_key_material(key_file, nonce_file)?;
    let size = decrypt_file(input, output, key.as_bytes(), nonce.as_bytes())
        .context("Failed to decrypt file")?;

    info!(output = %output.display(), size, "File decrypted");
    println!("File decrypted successfully: {} ({} bytes)", output.display(), size);
    Ok(())
}

fn cmd_set_key(key: Option<&str>, key_file: &Path) -> Result<()> {
    let key = match key {
        Some(text) => CipherKey::from_hex(text).context("Key must be 64 hex characters")?,
        None => {
            info!("Generating new key");
            CipherKey::generate()
        }
    };

    keyfile::write_key(key_file, &key)?;
    println!("Key saved to {}", key_file.display());
    Ok(())
}

/// Load KDF parameters from JSON, or use the defaults.
fn load_kdf_params(path: Option<&Path>) -> Result<KdfParams> {
    let Some(path) = path else {
        return Ok(KdfParams::default());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let params: KdfParams = serde_json::from_str(&text)
        .with_context(|| format!("Invalid KDF parameters in {}", path.display()))?;
    debug!(iterations = params.iterations, "Loaded KDF parameters");
    Ok(params)
}

/// Load the master key, creating one on first use.
fn load_or_create_master(path: &Path) -> Result<MasterKey> {
    if path.exists() {
        return keyfile::read_master_key(path);
    }

    warn!(path = %path.display(), "Master key file not found, generating a new master key");
    let master = MasterKey::generate();
    keyfile::write_master_key(path, &master)?;
    Ok(master)
}

fn cmd_derive(
    label: &str,
    context: &str,
    master_key_file: &Path,
    out: &Path,
    kdf_params: Option<&Path>,
) -> Result<()> {
    let params = load_kdf_params(kdf_params)?;
    let master = load_or_create_master(master_key_file)?;
    let mut derivation = KeyDerivationContext::with_params(master, params);

    let record = derivation
        .derive(label, context)
        .context("Failed to derive key")?;
    keyfile::write_derived(out, record)?;

    info!(label = record.label(), context = record.context(), "Derived key");
    println!("Derived key saved to {}", out.display());
    println!("  Label: {}", record.label());
    println!("  Context: {}", record.context());
    Ok(())
}

fn cmd_show_derived(file: &Path) -> Result<()> {
    let record = keyfile::read_derived(file)?;

    println!("Derived key: {}", magmacrypt_crypto::encoding::encode_hex(record.as_bytes()));
    println!("  Label: {}", record.label());
    println!("  Context: {}", record.context());
    Ok(())
}

fn cmd_rotate_master(key: Option<&str>, master_key_file: &Path) -> Result<()> {
    let master = match key {
        Some(text) => MasterKey::from_hex(text).context("Master key must be 64 hex characters")?,
        None => {
            info!("Generating new master key");
            MasterKey::generate()
        }
    };

    keyfile::write_master_key(master_key_file, &master)?;
    println!("Master key replaced: {}", master_key_file.display());
    println!("Previously derived keys are unchanged; re-derive them if needed.");
    Ok(())
}

fn cmd_self_test() -> Result<()> {
    let master = MasterKey::generate();
    let mut failures = 0;

    let key1 = derive_key(master.as_bytes(), "test_label", "test_context")?;
    let key2 = derive_key(master.as_bytes(), "test_label", "test_context")?;
    let key3 = derive_key(master.as_bytes(), "test_label2", "test_context2")?;

    let checks = [
        ("same parameters give the same key", key1 == key2),
        ("different parameters give different keys", key1.as_bytes() != key3.as_bytes()),
        ("derived key length", key1.as_bytes().len() == magmacrypt_crypto::KEY_LENGTH),
    ];

    let key = key1.to_cipher_key();
    let nonce = Nonce::generate();
    let plaintext = b"MagmaCrypt self-test payload spanning several blocks";
    let ciphertext = encrypt_bytes(key.as_bytes(), nonce.as_bytes(), plaintext)?;
    let decrypted = decrypt_bytes(key.as_bytes(), nonce.as_bytes(), &ciphertext)?;

    for (name, passed) in checks
        .into_iter()
        .chain([("cipher round trip", decrypted == plaintext)])
    {
        if passed {
            info!(check = name, "Passed");
        } else {
            warn!(check = name, "Failed");
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} self-test check(s) failed", failures);
    }
    println!("All self-test checks passed");
    Ok(())
}
