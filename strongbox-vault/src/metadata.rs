//! Metadata codec: encrypts small structured values (names, sizes, tag
//! lists, display names) under an object's content key.
//!
//! Never used for bulk file content — payload chunks go through the same
//! AEAD primitives but via the blob store.

use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::types::{EncryptedEnvelope, MetadataFormat};
use strongbox_envelope::aead;
use strongbox_envelope::wire::CONTENT_KEY_BYTES;

// ---------------------------------------------------------------------------
// Content key
// ---------------------------------------------------------------------------

/// The single symmetric key protecting one object's payload and metadata.
/// Zeroed on drop; never serialized in the clear.
pub struct ContentKey(Zeroizing<[u8; CONTENT_KEY_BYTES]>);

impl ContentKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; CONTENT_KEY_BYTES]);
        OsRng.fill_bytes(&mut *key);
        Self(key)
    }

    /// Reconstruct from unwrapped bytes. The source buffer stays the
    /// caller's responsibility to wipe.
    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() != CONTENT_KEY_BYTES {
            return Err(VaultError::DecryptFailed);
        }
        let mut key = Zeroizing::new([0u8; CONTENT_KEY_BYTES]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_BYTES] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Field codec
// ---------------------------------------------------------------------------

/// Seal a UTF-8 field with a fresh nonce. Always emits the current format.
pub fn encrypt_field(plaintext: &str, key: &ContentKey) -> VaultResult<EncryptedEnvelope> {
    let nonce = aead::nonce()?;
    let ciphertext = aead::seal(key.as_bytes(), &nonce, plaintext.as_bytes(), &[])?;
    Ok(EncryptedEnvelope {
        format: MetadataFormat::AesGcmV1,
        nonce_hex: hex::encode(nonce),
        ciphertext_hex: hex::encode(ciphertext),
    })
}

/// Open a field envelope, dispatching on its format discriminant.
pub fn decrypt_field(envelope: &EncryptedEnvelope, key: &ContentKey) -> VaultResult<String> {
    match envelope.format {
        MetadataFormat::AesGcmV1 => {
            let nonce_bytes = hex::decode(&envelope.nonce_hex)
                .map_err(|_| VaultError::DecryptFailed)?;
            let nonce: [u8; 12] = nonce_bytes
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::DecryptFailed)?;
            let ciphertext = hex::decode(&envelope.ciphertext_hex)
                .map_err(|_| VaultError::DecryptFailed)?;
            let plaintext = Zeroizing::new(aead::open(key.as_bytes(), &nonce, &ciphertext, &[])?);
            String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::DecryptFailed)
        }
        // Legacy records stored the value unencrypted (hex of the UTF-8
        // bytes). Decode without touching the key; writes re-encrypt.
        MetadataFormat::LegacyPlaintext => {
            let bytes = hex::decode(&envelope.ciphertext_hex)
                .map_err(|_| VaultError::DecryptFailed)?;
            String::from_utf8(bytes).map_err(|_| VaultError::DecryptFailed)
        }
    }
}

/// Convenience for numeric fields (file sizes).
pub fn encrypt_size(size: u64, key: &ContentKey) -> VaultResult<EncryptedEnvelope> {
    encrypt_field(&size.to_string(), key)
}

pub fn decrypt_size(envelope: &EncryptedEnvelope, key: &ContentKey) -> VaultResult<u64> {
    decrypt_field(envelope, key)?
        .parse()
        .map_err(|_| VaultError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_roundtrip() {
        let key = ContentKey::generate();
        let env = encrypt_field("annual-report.pdf", &key).unwrap();
        assert_eq!(env.format, MetadataFormat::AesGcmV1);
        assert_eq!(decrypt_field(&env, &key).unwrap(), "annual-report.pdf");
    }

    #[test]
    fn wrong_key_fails_opaquely() {
        let env = encrypt_field("secret name", &ContentKey::generate()).unwrap();
        let other = ContentKey::generate();
        assert_eq!(decrypt_field(&env, &other), Err(VaultError::DecryptFailed));
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let key = ContentKey::generate();
        let a = encrypt_field("same", &key).unwrap();
        let b = encrypt_field("same", &key).unwrap();
        assert_ne!(a.nonce_hex, b.nonce_hex);
        assert_ne!(a.ciphertext_hex, b.ciphertext_hex);
    }

    #[test]
    fn legacy_plaintext_decodes_without_key() {
        let env = EncryptedEnvelope {
            format: MetadataFormat::LegacyPlaintext,
            nonce_hex: String::new(),
            ciphertext_hex: hex::encode("old unencrypted name"),
        };
        // any key works: the legacy decoder ignores it
        let key = ContentKey::generate();
        assert_eq!(decrypt_field(&env, &key).unwrap(), "old unencrypted name");
    }

    #[test]
    fn size_roundtrip() {
        let key = ContentKey::generate();
        let env = encrypt_size(5, &key).unwrap();
        assert_eq!(decrypt_size(&env, &key).unwrap(), 5);
    }

    #[test]
    fn tampered_envelope_fails() {
        let key = ContentKey::generate();
        let mut env = encrypt_field("name", &key).unwrap();
        let mut raw = hex::decode(&env.ciphertext_hex).unwrap();
        raw[0] ^= 0x01;
        env.ciphertext_hex = hex::encode(raw);
        assert_eq!(decrypt_field(&env, &key), Err(VaultError::DecryptFailed));
    }
}
