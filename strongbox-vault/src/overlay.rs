//! Per-recipient overlay: independent folder placement, favorite flag,
//! tags and display name layered on a shared object.
//!
//! Every write touches only the acting user's own map entry; the shared
//! payload and `encrypted_keys` are never altered, so two recipients can
//! disagree about placement or tags without conflicting. Tags and display
//! names are sealed under the object's *existing* content key — the caller
//! unwraps it first; overlay writes introduce no new key material.

use std::sync::Arc;

use crate::error::{VaultError, VaultResult};
use crate::metadata::{self, ContentKey};
use crate::store::VaultStore;
use crate::types::{EncryptedObject, ObjectId, UserId};

pub struct OverlayStore {
    store: Arc<dyn VaultStore>,
}

impl OverlayStore {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self { store }
    }

    pub async fn set_favorite(
        &self,
        object_id: &ObjectId,
        user: &UserId,
        value: bool,
    ) -> VaultResult<()> {
        let mut object = self.fetch_authorized(object_id, user)?;
        object.overlay.favorites.insert(user.clone(), value);
        self.store.put_object(&object)
    }

    pub async fn set_folder(
        &self,
        object_id: &ObjectId,
        user: &UserId,
        folder: Option<ObjectId>,
    ) -> VaultResult<()> {
        let mut object = self.fetch_authorized(object_id, user)?;
        object.overlay.folder_placement.insert(user.clone(), folder);
        self.store.put_object(&object)
    }

    pub async fn set_tags(
        &self,
        object_id: &ObjectId,
        user: &UserId,
        tags: &[String],
        content_key: &ContentKey,
    ) -> VaultResult<()> {
        let serialized = serde_json::to_string(tags)
            .map_err(|e| VaultError::Storage(format!("serialize tags: {}", e)))?;
        let envelope = metadata::encrypt_field(&serialized, content_key)?;

        let mut object = self.fetch_authorized(object_id, user)?;
        object.overlay.tags.insert(user.clone(), envelope);
        self.store.put_object(&object)
    }

    pub async fn get_tags(
        &self,
        object_id: &ObjectId,
        user: &UserId,
        content_key: &ContentKey,
    ) -> VaultResult<Vec<String>> {
        let object = self.fetch_authorized(object_id, user)?;
        match object.overlay.tags.get(user) {
            None => Ok(Vec::new()),
            Some(envelope) => {
                let serialized = metadata::decrypt_field(envelope, content_key)?;
                serde_json::from_str(&serialized).map_err(|_| VaultError::DecryptFailed)
            }
        }
    }

    pub async fn set_display_name(
        &self,
        object_id: &ObjectId,
        user: &UserId,
        name: &str,
        content_key: &ContentKey,
    ) -> VaultResult<()> {
        let envelope = metadata::encrypt_field(name, content_key)?;
        let mut object = self.fetch_authorized(object_id, user)?;
        object.overlay.display_name.insert(user.clone(), envelope);
        self.store.put_object(&object)
    }

    pub fn favorite(object: &EncryptedObject, user: &UserId) -> bool {
        object.overlay.favorites.get(user).copied().unwrap_or(false)
    }

    /// Folder membership as this user sees it: their overlay placement if
    /// set, otherwise the object's shared parent. A missing entry and an
    /// explicit `None` placement (the share-time seed) both fall back to
    /// the parent — the fallback covers objects created before the overlay
    /// existed and must be preserved.
    pub fn visible_folder(object: &EncryptedObject, user: &UserId) -> Option<ObjectId> {
        match object.overlay.folder_placement.get(user) {
            Some(Some(folder)) => Some(folder.clone()),
            _ => object.parent.clone(),
        }
    }

    fn fetch_authorized(
        &self,
        object_id: &ObjectId,
        user: &UserId,
    ) -> VaultResult<EncryptedObject> {
        let object = self
            .store
            .get_object(object_id)?
            .ok_or_else(|| VaultError::ObjectNotFound(object_id.clone()))?;
        if !object.shared_with.contains(user) {
            return Err(VaultError::NotAuthorized {
                object: object_id.clone(),
                user: user.clone(),
            });
        }
        Ok(object)
    }
}
