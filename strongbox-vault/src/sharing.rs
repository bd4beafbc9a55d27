//! Content-key wrapping and the sharing protocol.
//!
//! One object, one content key, wrapped once per authorized recipient.
//! Granting access wraps a copy of the existing key; revoking deletes the
//! entry. The content key itself is never rotated by a share or default
//! revoke — [`hard_revoke`](SharingEngine::hard_revoke) is the explicit
//! opt-in that does rotate.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::metadata::{self, ContentKey};
use crate::store::VaultStore;
use crate::types::{
    EncryptedObject, ObjectId, ObjectKind, Overlay, UserId, WrappedKey,
};
use strongbox_envelope::{Envelope, PublicKey, SecretKey};

/// KDF context binding a wrapped key to its object.
pub(crate) fn wrap_context(object: &ObjectId) -> Vec<u8> {
    let mut ctx = Vec::with_capacity(17 + object.as_str().len());
    ctx.extend_from_slice(b"strongbox|object|");
    ctx.extend_from_slice(object.as_str().as_bytes());
    ctx
}

pub struct SharingEngine {
    store: Arc<dyn VaultStore>,
    envelope: Envelope,
}

impl SharingEngine {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self {
            store,
            envelope: Envelope::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a new encrypted object with a fresh content key, wrapped for
    /// every initial recipient. The owner is always included.
    pub async fn create_object(
        &self,
        owner: &UserId,
        kind: ObjectKind,
        name: &str,
        size: Option<u64>,
        recipients: &BTreeSet<UserId>,
        parent: Option<ObjectId>,
    ) -> VaultResult<EncryptedObject> {
        let id = ObjectId::generate();
        let content_key = ContentKey::generate();

        let mut shared_with: BTreeSet<UserId> = recipients.clone();
        shared_with.insert(owner.clone());

        let ctx = wrap_context(&id);
        let mut encrypted_keys = std::collections::HashMap::new();
        for recipient in &shared_with {
            let pk = self.recipient_public_key(recipient)?;
            let wrapped = self
                .envelope
                .seal_to(&pk, content_key.as_bytes(), &ctx)?;
            encrypted_keys.insert(recipient.clone(), WrappedKey::from_bytes(&wrapped));
        }

        let name_env = metadata::encrypt_field(name, &content_key)?;
        let size_env = match (kind, size) {
            (ObjectKind::File, Some(s)) => Some(metadata::encrypt_size(s, &content_key)?),
            _ => None,
        };

        let mut overlay = Overlay::default();
        for recipient in &shared_with {
            overlay.seed(recipient, metadata::encrypt_field(name, &content_key)?);
        }

        let mut locator = [0u8; 16];
        OsRng.fill_bytes(&mut locator);

        let now = Utc::now();
        let object = EncryptedObject {
            id,
            owner: owner.clone(),
            kind,
            name: name_env,
            size: size_env,
            storage_locator: hex::encode(locator),
            encrypted_keys,
            shared_with,
            parent,
            overlay,
            created_at: now,
            last_modified: now,
        };

        check_invariants(&object)?;
        self.store.put_object(&object)?;
        tracing::info!(
            object = %object.id,
            owner = %owner,
            kind = %kind,
            recipients = object.shared_with.len(),
            "object created"
        );
        Ok(object)
    }

    // -----------------------------------------------------------------------
    // Unwrapping
    // -----------------------------------------------------------------------

    /// Recover the content key as `user`. Fails `NotAuthorized` if the user
    /// holds no wrapped-key entry; a mismatched private key surfaces as an
    /// opaque decrypt failure.
    pub fn unwrap_content_key(
        &self,
        object: &EncryptedObject,
        user: &UserId,
        secret_key: &SecretKey,
    ) -> VaultResult<ContentKey> {
        let entry = object
            .encrypted_keys
            .get(user)
            .ok_or_else(|| VaultError::NotAuthorized {
                object: object.id.clone(),
                user: user.clone(),
            })?;
        let wrapped = entry.to_bytes()?;
        let ctx = wrap_context(&object.id);
        let raw = Zeroizing::new(self.envelope.open_from(secret_key, &wrapped, &ctx)?);
        ContentKey::from_bytes(&raw)
    }

    // -----------------------------------------------------------------------
    // Granting
    // -----------------------------------------------------------------------

    /// Share with additional users. The acting user's own entry supplies
    /// the content key; each newcomer gets a wrapped copy of that same key,
    /// so existing recipients are unaffected. Overlay defaults are seeded
    /// for every newcomer.
    ///
    /// State is re-fetched from the store so a caller holding a stale
    /// object cannot clobber concurrent membership changes.
    pub async fn share_with_users(
        &self,
        object_id: &ObjectId,
        acting_user: &UserId,
        acting_key: &SecretKey,
        new_recipients: &[UserId],
    ) -> VaultResult<EncryptedObject> {
        let mut object = self.fetch(object_id)?;
        let content_key = self.unwrap_content_key(&object, acting_user, acting_key)?;
        let current_name = metadata::decrypt_field(&object.name, &content_key)?;

        let ctx = wrap_context(&object.id);
        let mut added = 0usize;
        for recipient in new_recipients {
            if object.shared_with.contains(recipient) {
                continue;
            }
            let pk = self.recipient_public_key(recipient)?;
            let wrapped = self
                .envelope
                .seal_to(&pk, content_key.as_bytes(), &ctx)?;
            object
                .encrypted_keys
                .insert(recipient.clone(), WrappedKey::from_bytes(&wrapped));
            object.shared_with.insert(recipient.clone());
            object
                .overlay
                .seed(recipient, metadata::encrypt_field(&current_name, &content_key)?);
            added += 1;
        }

        object.last_modified = Utc::now();
        check_invariants(&object)?;
        self.store.put_object(&object)?;
        tracing::info!(object = %object.id, added, "object shared");
        Ok(object)
    }

    // -----------------------------------------------------------------------
    // Revocation
    // -----------------------------------------------------------------------

    /// Remove users: their wrapped-key and overlay entries are deleted. The
    /// owner is never removable. The content key is NOT rotated — a revoked
    /// user who cached it out-of-band can still read old ciphertext; use
    /// [`hard_revoke`](Self::hard_revoke) to close that window.
    pub async fn revoke_users(
        &self,
        object_id: &ObjectId,
        to_remove: &[UserId],
    ) -> VaultResult<EncryptedObject> {
        let mut object = self.fetch(object_id)?;

        for user in to_remove {
            if user == &object.owner {
                return Err(VaultError::OwnerNotRemovable {
                    object: object.id.clone(),
                });
            }
        }
        for user in to_remove {
            object.encrypted_keys.remove(user);
            object.shared_with.remove(user);
            object.overlay.remove(user);
        }

        object.last_modified = Utc::now();
        check_invariants(&object)?;
        self.store.put_object(&object)?;
        tracing::info!(object = %object.id, removed = to_remove.len(), "users revoked");
        Ok(object)
    }

    /// Revoke *and* rotate the content key: remaining recipients get the
    /// fresh key wrapped, and every metadata envelope is re-encrypted under
    /// it. Re-encrypting the bulk payload in the blob store is the caller's
    /// follow-up.
    pub async fn hard_revoke(
        &self,
        object_id: &ObjectId,
        acting_user: &UserId,
        acting_key: &SecretKey,
        to_remove: &[UserId],
    ) -> VaultResult<EncryptedObject> {
        let object = self.fetch(object_id)?;
        let old_key = self.unwrap_content_key(&object, acting_user, acting_key)?;

        let mut object = self.revoke_users(object_id, to_remove).await?;
        let new_key = ContentKey::generate();
        let ctx = wrap_context(&object.id);

        // Re-wrap the fresh key for everyone who remains.
        object.encrypted_keys.clear();
        for recipient in object.shared_with.clone() {
            let pk = self.recipient_public_key(&recipient)?;
            let wrapped = self.envelope.seal_to(&pk, new_key.as_bytes(), &ctx)?;
            object
                .encrypted_keys
                .insert(recipient, WrappedKey::from_bytes(&wrapped));
        }

        // Re-encrypt shared metadata under the new key.
        let name = metadata::decrypt_field(&object.name, &old_key)?;
        object.name = metadata::encrypt_field(&name, &new_key)?;
        if let Some(size_env) = &object.size {
            let size = metadata::decrypt_size(size_env, &old_key)?;
            object.size = Some(metadata::encrypt_size(size, &new_key)?);
        }
        for env in object.overlay.tags.values_mut() {
            let plaintext = metadata::decrypt_field(env, &old_key)?;
            *env = metadata::encrypt_field(&plaintext, &new_key)?;
        }
        for env in object.overlay.display_name.values_mut() {
            let plaintext = metadata::decrypt_field(env, &old_key)?;
            *env = metadata::encrypt_field(&plaintext, &new_key)?;
        }

        object.last_modified = Utc::now();
        check_invariants(&object)?;
        self.store.put_object(&object)?;
        tracing::info!(object = %object.id, "hard revoke: content key rotated");
        Ok(object)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn fetch(&self, id: &ObjectId) -> VaultResult<EncryptedObject> {
        self.store
            .get_object(id)?
            .ok_or_else(|| VaultError::ObjectNotFound(id.clone()))
    }

    fn recipient_public_key(&self, user: &UserId) -> VaultResult<PublicKey> {
        let hex_key = self
            .store
            .get_published_key(user)?
            .ok_or_else(|| VaultError::PublicKeyNotFound(user.clone()))?;
        let bytes = hex::decode(&hex_key)
            .map_err(|_| VaultError::MalformedRecord(format!("published key for {}", user)))?;
        PublicKey::from_bytes(&bytes)
            .map_err(|_| VaultError::MalformedRecord(format!("published key for {}", user)))
    }
}

/// Post-mutation invariant check: owner present, wrapped-key entries match
/// `shared_with` exactly, overlay mentions only authorized users.
pub(crate) fn check_invariants(object: &EncryptedObject) -> VaultResult<()> {
    if !object.shared_with.contains(&object.owner) {
        return Err(VaultError::InvariantViolation(format!(
            "object {}: owner not in shared_with",
            object.id
        )));
    }
    let key_holders: BTreeSet<UserId> = object.encrypted_keys.keys().cloned().collect();
    if key_holders != object.shared_with {
        return Err(VaultError::InvariantViolation(format!(
            "object {}: encrypted_keys.keys() != shared_with",
            object.id
        )));
    }
    let mentioned = object.overlay.mentioned_users();
    if !mentioned.is_subset(&object.shared_with) {
        return Err(VaultError::InvariantViolation(format!(
            "object {}: overlay entry for non-member",
            object.id
        )));
    }
    Ok(())
}
