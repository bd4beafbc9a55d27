//! Error taxonomy for the vault core.
//!
//! Decrypt-side failures stay deliberately coarse: `WrongPassphrase` never
//! distinguishes a mistyped passphrase from a corrupted envelope, and
//! `DecryptFailed` covers both a mismatched key pair and a tampered
//! ciphertext. Anything finer-grained would hand an attacker an oracle.

use crate::types::{ObjectId, RecordId, UserId};
use std::fmt;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Passphrase unlock failed. Wrong passphrase and corrupt envelope are
    /// intentionally indistinguishable.
    WrongPassphrase,
    /// No authenticator is present or it refused to start.
    AuthenticatorUnavailable,
    /// The user dismissed the authenticator prompt.
    UserCancelled,
    /// The authenticator produced an assertion that does not unwrap the
    /// stored key (wrong device, or re-enrolled credential).
    AssertionMismatch,
    /// AEAD or KEM failure: mismatched key pair, tampering, truncation.
    DecryptFailed,
    /// Encrypt-side failure (RNG or cipher initialization).
    SealFailed,
    /// The acting user holds no wrapped-key entry for the object.
    NotAuthorized { object: ObjectId, user: UserId },
    /// Removing this custody record would leave the user with no unlock
    /// path and no cached secret.
    WouldOrphanAccount,
    /// The object owner cannot be revoked.
    OwnerNotRemovable { object: ObjectId },
    /// The rotation verification round-trip failed; custody was not swapped.
    RotationVerificationFailed,
    ObjectNotFound(ObjectId),
    RecordNotFound(RecordId),
    /// No published public key for a share recipient.
    PublicKeyNotFound(UserId),
    /// A persisted record failed shape validation on load.
    MalformedRecord(String),
    /// Post-mutation invariant check failed; the write was not persisted.
    InvariantViolation(String),
    Storage(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongPassphrase => write!(f, "wrong passphrase"),
            Self::AuthenticatorUnavailable => write!(f, "authenticator unavailable"),
            Self::UserCancelled => write!(f, "user cancelled"),
            Self::AssertionMismatch => write!(f, "assertion mismatch"),
            Self::DecryptFailed => write!(f, "decryption failed"),
            Self::SealFailed => write!(f, "encryption failed"),
            Self::NotAuthorized { object, user } => {
                write!(f, "user {} is not authorized for object {}", user, object)
            }
            Self::WouldOrphanAccount => {
                write!(f, "removal would leave the account with no unlock path")
            }
            Self::OwnerNotRemovable { object } => {
                write!(f, "owner of object {} cannot be revoked", object)
            }
            Self::RotationVerificationFailed => {
                write!(f, "rotation verification failed; custody unchanged")
            }
            Self::ObjectNotFound(id) => write!(f, "object not found: {}", id),
            Self::RecordNotFound(id) => write!(f, "custody record not found: {}", id),
            Self::PublicKeyNotFound(user) => {
                write!(f, "no published public key for user {}", user)
            }
            Self::MalformedRecord(what) => write!(f, "malformed record: {}", what),
            Self::InvariantViolation(what) => write!(f, "invariant violation: {}", what),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<strongbox_envelope::OpenError> for VaultError {
    fn from(_: strongbox_envelope::OpenError) -> Self {
        VaultError::DecryptFailed
    }
}

impl From<strongbox_envelope::SealError> for VaultError {
    fn from(_: strongbox_envelope::SealError) -> Self {
        VaultError::SealFailed
    }
}
