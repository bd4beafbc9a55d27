//! Uniform error types for the envelope crate.
//!
//! Both errors are deliberately opaque: a wrong private key, a tampered
//! ciphertext and a truncated buffer all surface as the same `OpenError`,
//! so callers cannot be turned into a decryption oracle.

use core::fmt;

/// Failure while wrapping (encapsulate + seal). Carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealError;

impl fmt::Display for SealError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seal failed")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SealError {}

/// Failure while unwrapping (decapsulate + open). Carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenError;

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "open failed")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OpenError {}

/// Normalize seal-side errors reached on the open path.
impl From<SealError> for OpenError {
    fn from(_: SealError) -> Self {
        OpenError
    }
}
