//! Common utilities and types shared across MagmaCrypt modules.
//!
//! This module provides the error taxonomy and the zeroizing byte wrapper
//! used by the cryptographic core and its adapters.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::SensitiveBytes;
