//! Private key custody: the unlock paths that stand between a user and
//! their private key at rest.
//!
//! Three independent mechanisms — passphrase envelope, hardware
//! authenticator, biometric/device-bound — each wrap the *same* private key
//! bytes; only the wrapping key differs. Every successful unlock converges
//! on the shared [`SecretCache`].
//!
//! Passphrase stretching is Argon2id with the crate defaults, identical
//! across enrollment, unlock and change. Assertion- and device-derived
//! wrapping keys come from HKDF-SHA256 with per-mechanism domain labels.

use std::sync::Arc;
use std::time::Duration;

use argon2::Argon2;
use chrono::Utc;
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::cache::SecretCache;
use crate::error::{VaultError, VaultResult};
use crate::store::VaultStore;
use crate::types::{CustodyMethod, CustodyRecord, RecordId, UserId};
use strongbox_envelope::{aead, SecretKey};

const PASSPHRASE_SALT_BYTES: usize = 16;
const HW_KDF_LABEL: &[u8] = b"strongbox|custody|hw|v1|";
const BIO_KDF_LABEL: &[u8] = b"strongbox|custody|bio|v1|";

// ---------------------------------------------------------------------------
// Platform authenticator collaborator
// ---------------------------------------------------------------------------

/// An assertion from a physical or platform authenticator. The signature
/// must be stable for a given credential so the derived wrapping key is
/// recoverable (e.g. an hmac-secret style extension output).
pub struct Assertion {
    pub credential_id: String,
    pub signature: Zeroizing<Vec<u8>>,
}

/// External authenticator interface (WebAuthn-shaped, kept narrow).
pub trait Authenticator: Send + Sync {
    /// Enroll: create a new credential and return its first assertion.
    fn create_assertion(&self) -> VaultResult<Assertion>;
    /// Unlock: re-request an assertion for an existing credential.
    fn verify_assertion(&self, credential_id: &str) -> VaultResult<Assertion>;
}

// ---------------------------------------------------------------------------
// Credentials for bulk re-wrap (rotation)
// ---------------------------------------------------------------------------

/// Proof-of-possession for one enrolled mechanism, needed when the private
/// key changes and every custody record must be replaced.
pub enum CustodyCredential<'a> {
    Passphrase {
        record: RecordId,
        passphrase: &'a str,
    },
    Hardware {
        record: RecordId,
        authenticator: &'a dyn Authenticator,
    },
    Biometric {
        record: RecordId,
        device_secret: &'a [u8],
    },
}

/// Replacement custody records persisted during a key rotation. The
/// superseded originals stay valid until
/// [`commit_rewrap`](CustodyManager::commit_rewrap) retires them.
pub struct StagedRewrap {
    replacements: Vec<CustodyRecord>,
    superseded: Vec<RecordId>,
}

impl StagedRewrap {
    pub fn replacements(&self) -> &[CustodyRecord] {
        &self.replacements
    }
}

// ---------------------------------------------------------------------------
// Custody manager
// ---------------------------------------------------------------------------

pub struct CustodyManager {
    store: Arc<dyn VaultStore>,
    cache: Arc<SecretCache>,
}

impl CustodyManager {
    pub fn new(store: Arc<dyn VaultStore>, cache: Arc<SecretCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<SecretCache> {
        &self.cache
    }

    /// Parse the cached private key, if one is unlocked.
    pub fn cached_secret_key(&self) -> Option<SecretKey> {
        let bytes = self.cache.retrieve(true)?;
        SecretKey::from_bytes(&bytes).ok()
    }

    // -----------------------------------------------------------------------
    // Passphrase path
    // -----------------------------------------------------------------------

    /// Enroll a passphrase envelope for an already-unlocked private key.
    pub async fn enroll_passphrase(
        &self,
        user: &UserId,
        passphrase: &str,
        private_key: &[u8],
    ) -> VaultResult<CustodyRecord> {
        let mut salt = [0u8; PASSPHRASE_SALT_BYTES];
        OsRng.fill_bytes(&mut salt);
        let wrap_key = derive_passphrase_key(passphrase, &salt)?;
        let (nonce_hex, ciphertext_hex) = seal_private_key(&wrap_key, private_key)?;

        let record = CustodyRecord {
            id: RecordId::generate(),
            user: user.clone(),
            created_at: Utc::now(),
            method: CustodyMethod::Passphrase {
                salt_hex: hex::encode(salt),
                nonce_hex,
                ciphertext_hex,
            },
        };
        self.store.put_custody_record(&record)?;
        tracing::info!(user = %user, record = %record.id, "passphrase custody enrolled");
        Ok(record)
    }

    /// Unlock with a passphrase, populating the secret cache on success.
    ///
    /// Wrong passphrase and corrupted envelope produce the same error.
    pub async fn unlock_with_passphrase(
        &self,
        user: &UserId,
        passphrase: &str,
        timeout: Duration,
    ) -> VaultResult<()> {
        let mut records = self.passphrase_records(user)?;
        if records.is_empty() {
            return Err(VaultError::WrongPassphrase);
        }
        // newest envelope first (passphrase changes replace wholesale)
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        for record in &records {
            if let CustodyMethod::Passphrase {
                salt_hex,
                nonce_hex,
                ciphertext_hex,
            } = &record.method
            {
                let salt = match hex::decode(salt_hex) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                let wrap_key = derive_passphrase_key(passphrase, &salt)?;
                if let Ok(private_key) = open_private_key(&wrap_key, nonce_hex, ciphertext_hex) {
                    self.cache.store(private_key, timeout);
                    tracing::info!(user = %user, "unlocked via passphrase");
                    return Ok(());
                }
            }
        }
        Err(VaultError::WrongPassphrase)
    }

    /// Replace the passphrase envelope wholesale. The old record is deleted
    /// only after the new one is persisted.
    pub async fn change_passphrase(
        &self,
        user: &UserId,
        old_passphrase: &str,
        new_passphrase: &str,
    ) -> VaultResult<CustodyRecord> {
        let records = self.passphrase_records(user)?;
        for record in &records {
            if let CustodyMethod::Passphrase {
                salt_hex,
                nonce_hex,
                ciphertext_hex,
            } = &record.method
            {
                let salt =
                    hex::decode(salt_hex).map_err(|_| VaultError::WrongPassphrase)?;
                let wrap_key = derive_passphrase_key(old_passphrase, &salt)?;
                if let Ok(private_key) = open_private_key(&wrap_key, nonce_hex, ciphertext_hex) {
                    let replacement = self
                        .enroll_passphrase(user, new_passphrase, &private_key)
                        .await?;
                    self.store.delete_custody_record(&record.id)?;
                    tracing::info!(user = %user, "passphrase changed");
                    return Ok(replacement);
                }
            }
        }
        Err(VaultError::WrongPassphrase)
    }

    // -----------------------------------------------------------------------
    // Hardware authenticator path
    // -----------------------------------------------------------------------

    /// Enroll a hardware authenticator for an already-unlocked private key.
    pub async fn register_hardware_key(
        &self,
        user: &UserId,
        authenticator: &dyn Authenticator,
        private_key: &[u8],
    ) -> VaultResult<CustodyRecord> {
        let assertion = authenticator.create_assertion()?;
        let wrap_key = derive_assertion_key(HW_KDF_LABEL, &assertion)?;
        let (nonce_hex, ciphertext_hex) = seal_private_key(&wrap_key, private_key)?;

        let record = CustodyRecord {
            id: RecordId::generate(),
            user: user.clone(),
            created_at: Utc::now(),
            method: CustodyMethod::HardwareKey {
                credential_id: assertion.credential_id,
                nonce_hex,
                ciphertext_hex,
            },
        };
        self.store.put_custody_record(&record)?;
        tracing::info!(user = %user, record = %record.id, "hardware custody enrolled");
        Ok(record)
    }

    /// Unlock via a hardware assertion, populating the secret cache.
    pub async fn unlock_with_hardware(
        &self,
        user: &UserId,
        authenticator: &dyn Authenticator,
        timeout: Duration,
    ) -> VaultResult<()> {
        let records = self.store.custody_records(user, true)?;
        let mut saw_hardware = false;

        for record in &records {
            if let CustodyMethod::HardwareKey {
                credential_id,
                nonce_hex,
                ciphertext_hex,
            } = &record.method
            {
                saw_hardware = true;
                let assertion = authenticator.verify_assertion(credential_id)?;
                let wrap_key = derive_assertion_key(HW_KDF_LABEL, &assertion)?;
                match open_private_key(&wrap_key, nonce_hex, ciphertext_hex) {
                    Ok(private_key) => {
                        self.cache.store(private_key, timeout);
                        tracing::info!(user = %user, "unlocked via hardware key");
                        return Ok(());
                    }
                    Err(_) => continue,
                }
            }
        }

        if saw_hardware {
            Err(VaultError::AssertionMismatch)
        } else {
            Err(VaultError::AuthenticatorUnavailable)
        }
    }

    // -----------------------------------------------------------------------
    // Biometric path
    // -----------------------------------------------------------------------

    /// Enroll a device-bound biometric wrapping. The resulting record must
    /// stay on this device; the store filters it from sync listings.
    pub async fn register_biometric(
        &self,
        user: &UserId,
        device_id: &str,
        device_secret: &[u8],
        private_key: &[u8],
    ) -> VaultResult<CustodyRecord> {
        let wrap_key = derive_device_key(device_id, device_secret)?;
        let (nonce_hex, ciphertext_hex) = seal_private_key(&wrap_key, private_key)?;

        let record = CustodyRecord {
            id: RecordId::generate(),
            user: user.clone(),
            created_at: Utc::now(),
            method: CustodyMethod::Biometric {
                device_id: device_id.to_string(),
                nonce_hex,
                ciphertext_hex,
            },
        };
        self.store.put_custody_record(&record)?;
        tracing::info!(user = %user, record = %record.id, "biometric custody enrolled");
        Ok(record)
    }

    /// Unlock via the device-bound key, populating the secret cache.
    pub async fn unlock_with_biometric(
        &self,
        user: &UserId,
        device_id: &str,
        device_secret: &[u8],
        timeout: Duration,
    ) -> VaultResult<()> {
        let records = self.store.custody_records(user, true)?;
        for record in &records {
            if let CustodyMethod::Biometric {
                device_id: recorded_device,
                nonce_hex,
                ciphertext_hex,
            } = &record.method
            {
                if recorded_device != device_id {
                    continue;
                }
                let wrap_key = derive_device_key(device_id, device_secret)?;
                if let Ok(private_key) = open_private_key(&wrap_key, nonce_hex, ciphertext_hex) {
                    self.cache.store(private_key, timeout);
                    tracing::info!(user = %user, "unlocked via biometric");
                    return Ok(());
                }
                return Err(VaultError::AssertionMismatch);
            }
        }
        Err(VaultError::AuthenticatorUnavailable)
    }

    // -----------------------------------------------------------------------
    // Record removal (orphan guard)
    // -----------------------------------------------------------------------

    /// Remove a custody record. Refuses with `WouldOrphanAccount` when the
    /// removal would leave zero records while no secret is cached — the user
    /// could never unlock again — unless `acknowledge_orphan` is set.
    pub async fn remove_custody_record(
        &self,
        user: &UserId,
        record_id: &RecordId,
        acknowledge_orphan: bool,
    ) -> VaultResult<()> {
        let record = self
            .store
            .get_custody_record(record_id)?
            .ok_or_else(|| VaultError::RecordNotFound(record_id.clone()))?;
        if &record.user != user {
            return Err(VaultError::RecordNotFound(record_id.clone()));
        }

        let total = self.store.custody_records(user, true)?.len();
        let would_orphan = total <= 1 && !self.cache.is_cached();
        if would_orphan && !acknowledge_orphan {
            return Err(VaultError::WouldOrphanAccount);
        }

        self.store.delete_custody_record(record_id)?;
        tracing::info!(
            user = %user,
            record = %record_id,
            method = record.method_name(),
            "custody record removed"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bulk re-wrap (rotation support)
    // -----------------------------------------------------------------------

    /// Persist one replacement record per supplied credential, each
    /// wrapping `new_private_key`, without touching the originals. Old and
    /// new records coexist until the caller commits or aborts, so an
    /// interruption leaves both the old and the new private key unlockable
    /// from persisted state.
    pub async fn stage_rewrap(
        &self,
        user: &UserId,
        credentials: &[CustodyCredential<'_>],
        new_private_key: &[u8],
    ) -> VaultResult<StagedRewrap> {
        let mut staged = StagedRewrap {
            replacements: Vec::with_capacity(credentials.len()),
            superseded: Vec::with_capacity(credentials.len()),
        };

        for credential in credentials {
            let replacement = match credential {
                CustodyCredential::Passphrase { record, passphrase } => {
                    let old = self.require_record(user, record)?;
                    staged.superseded.push(old.id);
                    self.enroll_passphrase(user, passphrase, new_private_key)
                        .await?
                }
                CustodyCredential::Hardware {
                    record,
                    authenticator,
                } => {
                    let old = self.require_record(user, record)?;
                    let credential_id = match &old.method {
                        CustodyMethod::HardwareKey { credential_id, .. } => credential_id.clone(),
                        _ => return Err(VaultError::RecordNotFound(record.clone())),
                    };
                    staged.superseded.push(old.id);
                    let assertion = authenticator.verify_assertion(&credential_id)?;
                    let wrap_key = derive_assertion_key(HW_KDF_LABEL, &assertion)?;
                    let (nonce_hex, ciphertext_hex) =
                        seal_private_key(&wrap_key, new_private_key)?;
                    let new = CustodyRecord {
                        id: RecordId::generate(),
                        user: user.clone(),
                        created_at: Utc::now(),
                        method: CustodyMethod::HardwareKey {
                            credential_id,
                            nonce_hex,
                            ciphertext_hex,
                        },
                    };
                    self.store.put_custody_record(&new)?;
                    new
                }
                CustodyCredential::Biometric {
                    record,
                    device_secret,
                } => {
                    let old = self.require_record(user, record)?;
                    let device_id = match &old.method {
                        CustodyMethod::Biometric { device_id, .. } => device_id.clone(),
                        _ => return Err(VaultError::RecordNotFound(record.clone())),
                    };
                    staged.superseded.push(old.id);
                    self.register_biometric(user, &device_id, device_secret, new_private_key)
                        .await?
                }
            };
            staged.replacements.push(replacement);
        }

        tracing::info!(user = %user, count = staged.replacements.len(), "replacement custody staged");
        Ok(staged)
    }

    /// Retire the superseded records, leaving only the replacements. Called
    /// by the rotation engine after its verification round-trip has passed.
    pub fn commit_rewrap(&self, staged: StagedRewrap) -> VaultResult<Vec<CustodyRecord>> {
        for id in &staged.superseded {
            self.store.delete_custody_record(id)?;
        }
        tracing::info!(count = staged.replacements.len(), "custody rewrap committed");
        Ok(staged.replacements)
    }

    /// Discard the staged replacements, restoring the originals as the only
    /// custody. Used when rotation verification fails.
    pub fn abort_rewrap(&self, staged: StagedRewrap) -> VaultResult<()> {
        for record in &staged.replacements {
            self.store.delete_custody_record(&record.id)?;
        }
        tracing::info!("custody rewrap aborted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn passphrase_records(&self, user: &UserId) -> VaultResult<Vec<CustodyRecord>> {
        Ok(self
            .store
            .custody_records(user, true)?
            .into_iter()
            .filter(|r| matches!(r.method, CustodyMethod::Passphrase { .. }))
            .collect())
    }

    fn require_record(&self, user: &UserId, id: &RecordId) -> VaultResult<CustodyRecord> {
        let record = self
            .store
            .get_custody_record(id)?
            .ok_or_else(|| VaultError::RecordNotFound(id.clone()))?;
        if &record.user != user {
            return Err(VaultError::RecordNotFound(id.clone()));
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Key derivation + envelope helpers
// ---------------------------------------------------------------------------

fn derive_passphrase_key(passphrase: &str, salt: &[u8]) -> VaultResult<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|_| VaultError::WrongPassphrase)?;
    Ok(key)
}

fn derive_assertion_key(label: &[u8], assertion: &Assertion) -> VaultResult<Zeroizing<[u8; 32]>> {
    let mut info = Vec::with_capacity(label.len() + assertion.credential_id.len());
    info.extend_from_slice(label);
    info.extend_from_slice(assertion.credential_id.as_bytes());

    let hk = Hkdf::<Sha256>::new(None, &assertion.signature);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(&info, &mut *key)
        .map_err(|_| VaultError::SealFailed)?;
    Ok(key)
}

fn derive_device_key(device_id: &str, device_secret: &[u8]) -> VaultResult<Zeroizing<[u8; 32]>> {
    let mut info = Vec::with_capacity(BIO_KDF_LABEL.len() + device_id.len());
    info.extend_from_slice(BIO_KDF_LABEL);
    info.extend_from_slice(device_id.as_bytes());

    let hk = Hkdf::<Sha256>::new(None, device_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(&info, &mut *key)
        .map_err(|_| VaultError::SealFailed)?;
    Ok(key)
}

fn seal_private_key(
    wrap_key: &Zeroizing<[u8; 32]>,
    private_key: &[u8],
) -> VaultResult<(String, String)> {
    let nonce = aead::nonce()?;
    let ciphertext = aead::seal(wrap_key, &nonce, private_key, &[])?;
    Ok((hex::encode(nonce), hex::encode(ciphertext)))
}

fn open_private_key(
    wrap_key: &Zeroizing<[u8; 32]>,
    nonce_hex: &str,
    ciphertext_hex: &str,
) -> VaultResult<Zeroizing<Vec<u8>>> {
    let nonce_bytes = hex::decode(nonce_hex).map_err(|_| VaultError::DecryptFailed)?;
    let nonce: [u8; 12] = nonce_bytes
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::DecryptFailed)?;
    let ciphertext = hex::decode(ciphertext_hex).map_err(|_| VaultError::DecryptFailed)?;
    Ok(Zeroizing::new(aead::open(wrap_key, &nonce, &ciphertext, &[])?))
}
