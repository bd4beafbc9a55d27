//! # Strongbox Vault
//!
//! Client-resident, end-to-end encrypted multi-tenant vault core. Every
//! piece of user content — file and folder names, sizes, tags, display
//! names, favorite flags — is encrypted before it leaves the device; the
//! persistence layer only ever sees ciphertext and wrapped keys.
//!
//! Built on [`strongbox_envelope`] (hybrid X25519 + ML-KEM-1024 key
//! wrapping, AES-256-GCM). This crate adds the lifecycle machinery:
//!
//! - per-object content keys, wrapped once per authorized recipient
//! - grant/revoke sharing without disturbing existing recipients
//! - private-key custody (passphrase, hardware authenticator, biometric)
//! - a time-boxed secure memory cache for the unlocked key
//! - bulk key rotation with partial-failure tracking
//! - per-recipient overlays on shared objects
//!
//! ## Quick start
//!
//! ```ignore
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use strongbox_vault::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let sharing = SharingEngine::new(store.clone());
//!
//!     // Publish a user identity
//!     let engine: Envelope = Envelope::new();
//!     let (pk, sk) = engine.keygen();
//!     let alice = UserId::generate();
//!     store.put_published_key(&alice, &hex::encode(pk.to_bytes())).unwrap();
//!
//!     // Create an encrypted object only Alice can open
//!     let object = sharing
//!         .create_object(&alice, ObjectKind::File, "notes.txt", Some(5), &BTreeSet::new(), None)
//!         .await
//!         .unwrap();
//!
//!     let key = sharing.unwrap_content_key(&object, &alice, &sk).unwrap();
//!     assert_eq!(metadata::decrypt_field(&object.name, &key).unwrap(), "notes.txt");
//! }
//! ```
//!
//! There is no ambient global state: every engine is constructed over an
//! explicit store handle and passed where it is needed.

pub mod cache;
pub mod custody;
pub mod error;
pub mod metadata;
pub mod overlay;
pub mod rotation;
pub mod sharing;
pub mod store;
pub mod types;

// Re-export the main surface for convenience
pub use cache::SecretCache;
pub use custody::{Assertion, Authenticator, CustodyCredential, CustodyManager, StagedRewrap};
pub use error::{VaultError, VaultResult};
pub use metadata::ContentKey;
pub use overlay::OverlayStore;
pub use rotation::{MigrationReport, RotationEngine};
pub use sharing::SharingEngine;
pub use store::{BlobStore, MemoryStore, VaultStore};
pub use types::{
    CustodyMethod, CustodyRecord, EncryptedEnvelope, EncryptedObject, MetadataFormat, ObjectId,
    ObjectKind, Overlay, RecordId, UserId, WrappedKey,
};

// Re-export envelope types callers need to hold keys
pub use strongbox_envelope::{Envelope, PublicKey, SecretKey};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
