//! Persistence collaborator traits: where objects, custody records and
//! published public keys live.
//!
//! The vault core only needs a pull-based contract; real-time subscriptions
//! are an application-layer concern. Implement these for your
//! infrastructure — the in-memory backend below exists for tests and
//! ephemeral use.

use crate::error::VaultError;
use crate::types::{CustodyRecord, EncryptedObject, ObjectId, RecordId, UserId};

use std::collections::HashMap;
use std::sync::RwLock;

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// Backend for persisting encrypted objects, custody records and published
/// public keys.
pub trait VaultStore: Send + Sync {
    fn get_object(&self, id: &ObjectId) -> Result<Option<EncryptedObject>, VaultError>;
    fn put_object(&self, object: &EncryptedObject) -> Result<(), VaultError>;
    fn delete_object(&self, id: &ObjectId) -> Result<(), VaultError>;
    /// Every object the user holds a wrapped-key entry for (owned + shared).
    fn objects_for_user(&self, user: &UserId) -> Result<Vec<EncryptedObject>, VaultError>;

    /// Published hybrid public key, hex-encoded.
    fn get_published_key(&self, user: &UserId) -> Result<Option<String>, VaultError>;
    fn put_published_key(&self, user: &UserId, public_key_hex: &str) -> Result<(), VaultError>;

    fn get_custody_record(&self, id: &RecordId) -> Result<Option<CustodyRecord>, VaultError>;
    fn put_custody_record(&self, record: &CustodyRecord) -> Result<(), VaultError>;
    fn delete_custody_record(&self, id: &RecordId) -> Result<(), VaultError>;
    /// Custody records for a user. Callers syncing to remote persistence
    /// must pass `include_device_local = false` so biometric records stay
    /// on the device.
    fn custody_records(
        &self,
        user: &UserId,
        include_device_local: bool,
    ) -> Result<Vec<CustodyRecord>, VaultError>;
}

/// Opaque binary payload store.
pub trait BlobStore: Send + Sync {
    fn put_blob(&self, path: &str, bytes: &[u8]) -> Result<(), VaultError>;
    fn get_blob(&self, path: &str) -> Result<Option<Vec<u8>>, VaultError>;
    fn delete_blob(&self, path: &str) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory store (tests and ephemeral use). Implements both traits.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, EncryptedObject>>,
    custody: RwLock<HashMap<String, CustodyRecord>>,
    published: RwLock<HashMap<String, String>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryStore {
    fn get_object(&self, id: &ObjectId) -> Result<Option<EncryptedObject>, VaultError> {
        let objects = self.objects.read().unwrap();
        match objects.get(id.as_str()) {
            Some(obj) => {
                obj.validate()?;
                Ok(Some(obj.clone()))
            }
            None => Ok(None),
        }
    }

    fn put_object(&self, object: &EncryptedObject) -> Result<(), VaultError> {
        let mut objects = self.objects.write().unwrap();
        objects.insert(object.id.as_str().to_string(), object.clone());
        Ok(())
    }

    fn delete_object(&self, id: &ObjectId) -> Result<(), VaultError> {
        let mut objects = self.objects.write().unwrap();
        objects.remove(id.as_str());
        Ok(())
    }

    fn objects_for_user(&self, user: &UserId) -> Result<Vec<EncryptedObject>, VaultError> {
        let objects = self.objects.read().unwrap();
        Ok(objects
            .values()
            .filter(|o| o.encrypted_keys.contains_key(user))
            .cloned()
            .collect())
    }

    fn get_published_key(&self, user: &UserId) -> Result<Option<String>, VaultError> {
        let published = self.published.read().unwrap();
        Ok(published.get(user.as_str()).cloned())
    }

    fn put_published_key(&self, user: &UserId, public_key_hex: &str) -> Result<(), VaultError> {
        let mut published = self.published.write().unwrap();
        published.insert(user.as_str().to_string(), public_key_hex.to_string());
        Ok(())
    }

    fn get_custody_record(&self, id: &RecordId) -> Result<Option<CustodyRecord>, VaultError> {
        let custody = self.custody.read().unwrap();
        Ok(custody.get(id.as_str()).cloned())
    }

    fn put_custody_record(&self, record: &CustodyRecord) -> Result<(), VaultError> {
        let mut custody = self.custody.write().unwrap();
        custody.insert(record.id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn delete_custody_record(&self, id: &RecordId) -> Result<(), VaultError> {
        let mut custody = self.custody.write().unwrap();
        custody.remove(id.as_str());
        Ok(())
    }

    fn custody_records(
        &self,
        user: &UserId,
        include_device_local: bool,
    ) -> Result<Vec<CustodyRecord>, VaultError> {
        let custody = self.custody.read().unwrap();
        Ok(custody
            .values()
            .filter(|r| &r.user == user)
            .filter(|r| include_device_local || !r.is_device_local())
            .cloned()
            .collect())
    }
}

impl BlobStore for MemoryStore {
    fn put_blob(&self, path: &str, bytes: &[u8]) -> Result<(), VaultError> {
        let mut blobs = self.blobs.write().unwrap();
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get_blob(&self, path: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let blobs = self.blobs.read().unwrap();
        Ok(blobs.get(path).cloned())
    }

    fn delete_blob(&self, path: &str) -> Result<(), VaultError> {
        let mut blobs = self.blobs.write().unwrap();
        blobs.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustodyMethod, RecordId};
    use chrono::Utc;

    fn record(user: &UserId, method: CustodyMethod) -> CustodyRecord {
        CustodyRecord {
            id: RecordId::generate(),
            user: user.clone(),
            created_at: Utc::now(),
            method,
        }
    }

    #[test]
    fn device_local_records_filtered_from_sync_listing() {
        let store = MemoryStore::new();
        let user = UserId::generate();

        store
            .put_custody_record(&record(
                &user,
                CustodyMethod::Passphrase {
                    salt_hex: String::new(),
                    nonce_hex: String::new(),
                    ciphertext_hex: String::new(),
                },
            ))
            .unwrap();
        store
            .put_custody_record(&record(
                &user,
                CustodyMethod::Biometric {
                    device_id: "dev".into(),
                    nonce_hex: String::new(),
                    ciphertext_hex: String::new(),
                },
            ))
            .unwrap();

        assert_eq!(store.custody_records(&user, true).unwrap().len(), 2);
        let syncable = store.custody_records(&user, false).unwrap();
        assert_eq!(syncable.len(), 1);
        assert_eq!(syncable[0].method_name(), "passphrase");
    }

    #[test]
    fn blob_roundtrip() {
        let store = MemoryStore::new();
        store.put_blob("a/b", b"payload").unwrap();
        assert_eq!(store.get_blob("a/b").unwrap().unwrap(), b"payload");
        store.delete_blob("a/b").unwrap();
        assert_eq!(store.get_blob("a/b").unwrap(), None);
    }
}
