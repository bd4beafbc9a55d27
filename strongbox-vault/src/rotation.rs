//! Key rotation: regenerate a user's key pair and re-wrap every content
//! key they can reach under the new public key.
//!
//! Ordering is the whole point of this module:
//!
//! 1. enumerate the user's objects
//! 2. generate the new pair
//! 3. stage replacement custody records wrapping the new private key,
//!    alongside the originals
//! 4. re-wrap per object, recording per-object failures without aborting
//! 5. verify the new pair with a seal/open round-trip
//! 6. only then retire the old custody records and replace the published
//!    public key
//!
//! An interruption anywhere is recoverable: the old custody records stay
//! valid until step 6, and once step 3 has landed the staged records
//! unlock the new private key from persisted state, so objects already
//! re-wrapped mid-batch remain readable after a crash. A failed
//! verification deletes the staged records and leaves custody and the
//! published key exactly as they were. Other recipients' entries still
//! reference their own encapsulations and are untouched — each recipient
//! rotates independently.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::custody::{CustodyCredential, CustodyManager};
use crate::error::{VaultError, VaultResult};
use crate::sharing::{wrap_context, SharingEngine};
use crate::store::VaultStore;
use crate::types::{ObjectId, UserId, WrappedKey};
use strongbox_envelope::{
    constant_time_eq, Envelope, HybridX25519MlKem1024, KemProvider, PublicKey, SecretKey,
};

const VERIFY_CONTEXT: &[u8] = b"strongbox|rotation-verify";

/// Outcome of a bulk migration. A non-empty `failed` list is not an error:
/// the listed objects stayed wrapped under the old encapsulation and the
/// caller decides whether to retry them.
#[derive(Debug)]
pub struct MigrationReport {
    pub success: usize,
    pub failed: Vec<ObjectId>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RotationEngine<K: KemProvider = HybridX25519MlKem1024> {
    store: Arc<dyn VaultStore>,
    envelope: Envelope<K>,
}

impl<K: KemProvider> RotationEngine<K> {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self {
            store,
            envelope: Envelope::new(),
        }
    }

    /// Rotate `user`'s key pair across their entire estate.
    ///
    /// `credentials` must cover every custody record that should survive
    /// the rotation; records without a credential are left wrapping the old
    /// key and become useless once the swap lands.
    ///
    /// Returns the migration report and the new secret key. The caller is
    /// expected to re-cache the new key and drop the old one.
    pub async fn rotate_keypair(
        &self,
        user: &UserId,
        old_key: &SecretKey,
        custody: &CustodyManager,
        credentials: &[CustodyCredential<'_>],
    ) -> VaultResult<(MigrationReport, SecretKey)> {
        // 1. enumerate
        let objects = self.store.objects_for_user(user)?;
        tracing::info!(user = %user, objects = objects.len(), "key rotation started");

        // 2. new pair
        let (new_pk, new_sk) = self.envelope.keygen();

        // 3. stage custody first: objects re-wrapped below must never
        //    depend on a key that exists only in this process's memory
        let new_sk_bytes = Zeroizing::new(new_sk.to_bytes());
        let staged = custody.stage_rewrap(user, credentials, &new_sk_bytes).await?;

        // 4. per-object re-wrap; failures recorded, batch continues
        let sharing = SharingEngine::new(Arc::clone(&self.store));
        let mut report = MigrationReport {
            success: 0,
            failed: Vec::new(),
        };

        for stale in &objects {
            // always recompute from freshly fetched state
            let object = match self.store.get_object(&stale.id) {
                Ok(Some(o)) => o,
                Ok(None) => continue, // deleted mid-migration
                Err(e) => {
                    tracing::warn!(object = %stale.id, error = %e, "fetch failed, skipping");
                    report.failed.push(stale.id.clone());
                    continue;
                }
            };

            let content_key = match sharing.unwrap_content_key(&object, user, old_key) {
                Ok(k) => k,
                Err(e) => {
                    tracing::warn!(object = %object.id, error = %e, "unwrap failed, skipping");
                    report.failed.push(object.id.clone());
                    continue;
                }
            };

            let ctx = wrap_context(&object.id);
            let rewrapped = match self.envelope.seal_to(&new_pk, content_key.as_bytes(), &ctx) {
                Ok(w) => w,
                Err(_) => {
                    tracing::warn!(object = %object.id, "re-wrap failed, skipping");
                    report.failed.push(object.id.clone());
                    continue;
                }
            };

            let mut object = object;
            object
                .encrypted_keys
                .insert(user.clone(), WrappedKey::from_bytes(&rewrapped));
            if let Err(e) = self.store.put_object(&object) {
                tracing::warn!(object = %object.id, error = %e, "persist failed, skipping");
                report.failed.push(object.id.clone());
                continue;
            }
            report.success += 1;
        }

        // 5. verification round-trip before anything irreversible
        if self.verify_roundtrip(&new_pk, &new_sk).is_err() {
            custody.abort_rewrap(staged)?;
            return Err(VaultError::RotationVerificationFailed);
        }

        // 6. retire old custody + published key, only now
        custody.commit_rewrap(staged)?;
        self.store
            .put_published_key(user, &hex::encode(new_pk.to_bytes()))?;

        tracing::info!(
            user = %user,
            success = report.success,
            failed = report.failed.len(),
            "key rotation finished"
        );
        Ok((report, new_sk))
    }

    fn verify_roundtrip(&self, pk: &PublicKey, sk: &SecretKey) -> Result<(), ()> {
        let mut challenge = [0u8; 32];
        rand_core::RngCore::fill_bytes(&mut rand_core::OsRng, &mut challenge);
        let sealed = self
            .envelope
            .seal_to(pk, &challenge, VERIFY_CONTEXT)
            .map_err(|_| ())?;
        let opened = self
            .envelope
            .open_from(sk, &sealed, VERIFY_CONTEXT)
            .map_err(|_| ())?;
        if constant_time_eq(&opened, &challenge) {
            Ok(())
        } else {
            Err(())
        }
    }
}
