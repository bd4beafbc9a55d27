//! Core types: ids, encrypted envelopes, wrapped keys, vault objects,
//! per-recipient overlays, custody records.
//!
//! Everything here is a closed struct validated on deserialization; binary
//! fields are hex strings at the serde boundary.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::VaultError;
use strongbox_envelope::wire::{KEM_CIPHERTEXT_BYTES, MIN_WRAPPED_BYTES, NONCE_BYTES};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! hex_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random id.
            pub fn generate() -> Self {
                let mut bytes = [0u8; 16];
                OsRng.fill_bytes(&mut bytes);
                Self(hex::encode(bytes))
            }

            /// Create from a specific string (for testing/deterministic use).
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

hex_id!(
    /// Identity of a vault user.
    UserId
);
hex_id!(
    /// Identity of an encrypted object (file or folder).
    ObjectId
);
hex_id!(
    /// Identity of a custody record.
    RecordId
);

// ---------------------------------------------------------------------------
// Encrypted envelope (metadata fields)
// ---------------------------------------------------------------------------

/// Which codec produced an envelope. Closed set; new formats get a new
/// variant, never ad hoc shape sniffing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataFormat {
    /// Current format: AES-256-GCM under the object content key.
    #[serde(rename = "aes-gcm-v1")]
    AesGcmV1,
    /// Historical pre-encryption format. Read-only: the decoder accepts it,
    /// the encoder never emits it.
    #[serde(rename = "plaintext-v0")]
    LegacyPlaintext,
}

/// A single AEAD-sealed value: `{ciphertext, nonce}` plus the format
/// discriminant the decoder dispatches on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub format: MetadataFormat,
    pub nonce_hex: String,
    pub ciphertext_hex: String,
}

// ---------------------------------------------------------------------------
// Wrapped content key
// ---------------------------------------------------------------------------

/// One object's content key sealed under one recipient's public key.
///
/// The underlying bytes follow the fixed-width layout
/// `encapsulated_key[1600] || nonce[12] || ciphertext`; the accessors below
/// slice at those protocol offsets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey {
    wrapped_hex: String,
}

impl WrappedKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            wrapped_hex: hex::encode(bytes),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        let bytes = hex::decode(&self.wrapped_hex)
            .map_err(|_| VaultError::MalformedRecord("wrapped key hex".into()))?;
        if bytes.len() < MIN_WRAPPED_BYTES {
            return Err(VaultError::MalformedRecord("wrapped key too short".into()));
        }
        Ok(bytes)
    }

    /// Constant-length KEM ciphertext component.
    pub fn encapsulated_key(&self) -> Result<Vec<u8>, VaultError> {
        Ok(self.to_bytes()?[..KEM_CIPHERTEXT_BYTES].to_vec())
    }

    pub fn nonce(&self) -> Result<Vec<u8>, VaultError> {
        Ok(self.to_bytes()?[KEM_CIPHERTEXT_BYTES..KEM_CIPHERTEXT_BYTES + NONCE_BYTES].to_vec())
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>, VaultError> {
        Ok(self.to_bytes()?[KEM_CIPHERTEXT_BYTES + NONCE_BYTES..].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Per-recipient overlay
// ---------------------------------------------------------------------------

/// Per-recipient annotations layered on a shared object. Each user writes
/// only their own map entry; an entry may exist only while that user is in
/// `shared_with`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Overlay {
    pub favorites: HashMap<UserId, bool>,
    pub folder_placement: HashMap<UserId, Option<ObjectId>>,
    pub tags: HashMap<UserId, EncryptedEnvelope>,
    pub display_name: HashMap<UserId, EncryptedEnvelope>,
}

impl Overlay {
    /// Seed default entries for a newly authorized user.
    pub(crate) fn seed(&mut self, user: &UserId, display_name: EncryptedEnvelope) {
        self.favorites.insert(user.clone(), false);
        self.folder_placement.insert(user.clone(), None);
        self.display_name.insert(user.clone(), display_name);
        // tags start absent: no entry means "no tags yet"
    }

    /// Drop every entry belonging to a revoked user.
    pub(crate) fn remove(&mut self, user: &UserId) {
        self.favorites.remove(user);
        self.folder_placement.remove(user);
        self.tags.remove(user);
        self.display_name.remove(user);
    }

    /// Users mentioned anywhere in the overlay maps.
    pub(crate) fn mentioned_users(&self) -> BTreeSet<UserId> {
        self.favorites
            .keys()
            .chain(self.folder_placement.keys())
            .chain(self.tags.keys())
            .chain(self.display_name.keys())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Encrypted object
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    File,
    Folder,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::File => write!(f, "file"),
            ObjectKind::Folder => write!(f, "folder"),
        }
    }
}

/// A shared ciphertext object (file or folder).
///
/// Invariants, enforced after every mutation:
/// - `owner` is always in `shared_with`
/// - `encrypted_keys.keys() == shared_with`
/// - every wrapped-key entry seals the *same* content key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedObject {
    pub id: ObjectId,
    pub owner: UserId,
    pub kind: ObjectKind,
    pub name: EncryptedEnvelope,
    /// Files only.
    pub size: Option<EncryptedEnvelope>,
    /// Opaque locator into the blob store for the bulk payload.
    pub storage_locator: String,
    pub encrypted_keys: HashMap<UserId, WrappedKey>,
    pub shared_with: BTreeSet<UserId>,
    pub parent: Option<ObjectId>,
    pub overlay: Overlay,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl EncryptedObject {
    /// Shape validation, run on every load from the persistence layer.
    pub fn validate(&self) -> Result<(), VaultError> {
        if !self.shared_with.contains(&self.owner) {
            return Err(VaultError::MalformedRecord(format!(
                "object {}: owner missing from shared_with",
                self.id
            )));
        }
        let key_holders: BTreeSet<UserId> = self.encrypted_keys.keys().cloned().collect();
        if key_holders != self.shared_with {
            return Err(VaultError::MalformedRecord(format!(
                "object {}: encrypted_keys/shared_with mismatch",
                self.id
            )));
        }
        if self.kind == ObjectKind::Folder && self.size.is_some() {
            return Err(VaultError::MalformedRecord(format!(
                "object {}: folder carries a size envelope",
                self.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Custody records
// ---------------------------------------------------------------------------

/// How one copy of the private key is wrapped at rest. The private key is
/// identical underneath every record for a user; only the wrapping differs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyMethod {
    /// Argon2id-stretched passphrase envelope.
    Passphrase {
        salt_hex: String,
        nonce_hex: String,
        ciphertext_hex: String,
    },
    /// Wrapped under a key derived from a hardware-authenticator assertion.
    HardwareKey {
        credential_id: String,
        nonce_hex: String,
        ciphertext_hex: String,
    },
    /// Wrapped under a device-bound key. Never leaves the device: the
    /// persistence layer must not sync records carrying this method.
    Biometric {
        device_id: String,
        nonce_hex: String,
        ciphertext_hex: String,
    },
}

/// One enrollment of one unlock mechanism. Created on enrollment, replaced
/// wholesale on change (never mutated in place), deleted on removal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub id: RecordId,
    pub user: UserId,
    pub created_at: DateTime<Utc>,
    pub method: CustodyMethod,
}

impl CustodyRecord {
    /// Device-local records must never reach remote persistence.
    pub fn is_device_local(&self) -> bool {
        matches!(self.method, CustodyMethod::Biometric { .. })
    }

    pub fn method_name(&self) -> &'static str {
        match self.method {
            CustodyMethod::Passphrase { .. } => "passphrase",
            CustodyMethod::HardwareKey { .. } => "hardware",
            CustodyMethod::Biometric { .. } => "biometric",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_key_component_offsets() {
        let mut bytes = vec![0u8; MIN_WRAPPED_BYTES + 32];
        bytes[0] = 0xAA; // first encap byte
        bytes[KEM_CIPHERTEXT_BYTES] = 0xBB; // first nonce byte
        bytes[KEM_CIPHERTEXT_BYTES + NONCE_BYTES] = 0xCC; // first ct byte

        let wk = WrappedKey::from_bytes(&bytes);
        assert_eq!(wk.encapsulated_key().unwrap()[0], 0xAA);
        assert_eq!(wk.nonce().unwrap()[0], 0xBB);
        assert_eq!(wk.ciphertext().unwrap()[0], 0xCC);
        assert_eq!(wk.encapsulated_key().unwrap().len(), KEM_CIPHERTEXT_BYTES);
        assert_eq!(wk.nonce().unwrap().len(), NONCE_BYTES);
    }

    #[test]
    fn wrapped_key_rejects_short_blob() {
        let wk = WrappedKey::from_bytes(&[0u8; 16]);
        assert!(matches!(wk.to_bytes(), Err(VaultError::MalformedRecord(_))));
    }

    #[test]
    fn ids_are_unique_and_roundtrip_serde() {
        let a = UserId::generate();
        let b = UserId::generate();
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn biometric_records_are_device_local() {
        let rec = CustodyRecord {
            id: RecordId::generate(),
            user: UserId::generate(),
            created_at: Utc::now(),
            method: CustodyMethod::Biometric {
                device_id: "dev-1".into(),
                nonce_hex: String::new(),
                ciphertext_hex: String::new(),
            },
        };
        assert!(rec.is_device_local());
        assert_eq!(rec.method_name(), "biometric");
    }
}
