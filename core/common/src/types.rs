//! Common types used throughout MagmaCrypt.

use std::fmt;
use zeroize::Zeroize;

/// Sensitive data wrapper that zeroizes on drop.
///
/// Decoded key text and other transient secrets pass through this type so
/// the heap copy is wiped no matter which path the owner exits on.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the contents into a fixed-size array.
    ///
    /// Returns `None` when the length does not match `N`.
    pub fn to_array<const N: usize>(&self) -> Option<[u8; N]> {
        self.0.as_slice().try_into().ok()
    }
}

impl From<Vec<u8>> for SensitiveBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_bytes_debug_redacts() {
        let bytes = SensitiveBytes::new(vec![0xAA; 4]);
        assert_eq!(format!("{:?}", bytes), "SensitiveBytes([REDACTED; 4 bytes])");
    }

    #[test]
    fn test_sensitive_bytes_to_array() {
        let bytes = SensitiveBytes::from(vec![1, 2, 3, 4]);
        assert_eq!(bytes.to_array::<4>(), Some([1, 2, 3, 4]));
        assert_eq!(bytes.to_array::<8>(), None);
    }

    #[test]
    fn test_sensitive_bytes_zeroize() {
        let mut bytes = SensitiveBytes::new(vec![7u8; 16]);
        bytes.zeroize();
        assert!(bytes.is_empty());
    }
}
