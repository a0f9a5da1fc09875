//! Common error types for MagmaCrypt.

use thiserror::Error;

/// Top-level error type for MagmaCrypt operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Key material has the wrong length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Nonce has the wrong length.
    #[error("Invalid nonce length: expected {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    /// Hexadecimal text could not be decoded.
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single-use instance was driven a second time without being rewound.
    #[error("Instance reuse: {0}")]
    InstanceReuse(String),

    /// Invalid input or configuration provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic backend failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl Error {
    /// Whether the caller can recover by supplying different input.
    ///
    /// Length and encoding failures only need a corrected key or nonce;
    /// I/O and backend failures do not depend on the caller's values.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyLength { .. }
                | Error::InvalidNonceLength { .. }
                | Error::MalformedEncoding(_)
                | Error::InvalidInput(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_error_messages() {
        let err = Error::InvalidKeyLength {
            expected: 32,
            actual: 16,
        };
        assert_eq!(
            err.to_string(),
            "Invalid key length: expected 32 bytes, got 16"
        );

        let err = Error::InvalidNonceLength {
            expected: 8,
            actual: 0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid nonce length: expected 8 bytes, got 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_input_error_classification() {
        assert!(Error::MalformedEncoding("zz".to_string()).is_input_error());
        assert!(Error::InvalidInput("chunk".to_string()).is_input_error());
        assert!(!Error::InstanceReuse("twice".to_string()).is_input_error());
        assert!(!Error::Crypto("pbkdf2".to_string()).is_input_error());
    }
}
