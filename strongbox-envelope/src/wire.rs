//! Fixed-width wrapped-key layout.
//!
//! A wrapped key is exactly:
//!
//! ```text
//!   kem_ct[1600] || nonce[12] || aead_ct[16+]
//! ```
//!
//! where `kem_ct = x25519_ephemeral_pk[32] || mlkem1024_ct[1568]`.
//!
//! There is no header: every component length is a protocol constant, so
//! parsing works from fixed offsets and the encoding is independent of how
//! many recipients an object has. Changing any size constant is a breaking
//! protocol change.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::{OpenError, SealError};

/// Domain-separation label fed into the KDF.
pub const PROTOCOL_ID: &[u8] = b"strongbox-wrap-v1";

// ---------------------------------------------------------------------------
// Component sizes
// ---------------------------------------------------------------------------

/// X25519 public key / ephemeral key size.
pub const X25519_KEY_BYTES: usize = 32;

/// ML-KEM-1024 component sizes.
pub const MLKEM_CIPHERTEXT_BYTES: usize = 1568;
pub const MLKEM_PUBLIC_KEY_BYTES: usize = 1568;
pub const MLKEM_SECRET_KEY_BYTES: usize = 3168;

// ---------------------------------------------------------------------------
// Hybrid aggregate sizes
// ---------------------------------------------------------------------------

/// Hybrid KEM ciphertext: x25519_ephemeral_pk[32] || mlkem_ct[1568].
pub const KEM_CIPHERTEXT_BYTES: usize = X25519_KEY_BYTES + MLKEM_CIPHERTEXT_BYTES; // 1600

/// Hybrid public key: x25519_pk[32] || mlkem_ek[1568].
pub const KEM_PUBLIC_KEY_BYTES: usize = X25519_KEY_BYTES + MLKEM_PUBLIC_KEY_BYTES; // 1600

/// Hybrid secret key: x25519_sk[32] || mlkem_dk[3168].
pub const KEM_SECRET_KEY_BYTES: usize = X25519_KEY_BYTES + MLKEM_SECRET_KEY_BYTES; // 3200

/// Per-KEM shared secret size (each component produces 32 bytes).
pub const SHARED_SECRET_BYTES: usize = 32;

pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;
pub const AES_KEY_BYTES: usize = 32;

/// Raw content-key size carried inside a wrapped key.
pub const CONTENT_KEY_BYTES: usize = 32;

/// Minimum wrapped size: kem_ct + nonce + tag.
pub const MIN_WRAPPED_BYTES: usize = KEM_CIPHERTEXT_BYTES + NONCE_BYTES + AEAD_TAG_BYTES; // 1628

/// Exact size of a wrapped 32-byte content key.
pub const WRAPPED_CONTENT_KEY_BYTES: usize = MIN_WRAPPED_BYTES + CONTENT_KEY_BYTES; // 1660

/// Borrowed view of a parsed wrapped key.
#[derive(Debug, Clone, Copy)]
pub struct WrappedParts<'a> {
    pub kem_ciphertext: &'a [u8; KEM_CIPHERTEXT_BYTES],
    pub nonce: &'a [u8; NONCE_BYTES],
    pub aead_ciphertext: &'a [u8],
}

pub fn decode_wrapped(data: &[u8]) -> Result<WrappedParts<'_>, OpenError> {
    if data.len() < MIN_WRAPPED_BYTES {
        return Err(OpenError);
    }

    let kem_end = KEM_CIPHERTEXT_BYTES;
    let nonce_end = kem_end + NONCE_BYTES;

    let kem_ciphertext: &[u8; KEM_CIPHERTEXT_BYTES] =
        data[..kem_end].try_into().map_err(|_| OpenError)?;

    let nonce: &[u8; NONCE_BYTES] = data[kem_end..nonce_end]
        .try_into()
        .map_err(|_| OpenError)?;

    let aead_ciphertext = &data[nonce_end..];
    if aead_ciphertext.len() < AEAD_TAG_BYTES {
        return Err(OpenError);
    }

    Ok(WrappedParts {
        kem_ciphertext,
        nonce,
        aead_ciphertext,
    })
}

pub fn encode_wrapped(
    kem_ct: &[u8],
    nonce: &[u8; NONCE_BYTES],
    aead_ct: &[u8],
) -> Result<Vec<u8>, SealError> {
    if kem_ct.len() != KEM_CIPHERTEXT_BYTES {
        return Err(SealError);
    }
    if aead_ct.len() < AEAD_TAG_BYTES {
        return Err(SealError);
    }

    let mut out = Vec::with_capacity(KEM_CIPHERTEXT_BYTES + NONCE_BYTES + aead_ct.len());
    out.extend_from_slice(kem_ct);
    out.extend_from_slice(nonce);
    out.extend_from_slice(aead_ct);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_truncated() {
        let data = [0u8; MIN_WRAPPED_BYTES - 1];
        assert_eq!(decode_wrapped(&data).map(|_| ()), Err(OpenError));
    }

    #[test]
    fn encode_rejects_bad_kem_ct_len() {
        let nonce = [0u8; NONCE_BYTES];
        let aead_ct = [0u8; AEAD_TAG_BYTES];
        assert!(encode_wrapped(&[0u8; 7], &nonce, &aead_ct).is_err());
    }

    #[test]
    fn roundtrip_offsets() {
        let kem_ct = [0xA5u8; KEM_CIPHERTEXT_BYTES];
        let nonce = [0x17u8; NONCE_BYTES];
        let aead_ct = [0xC3u8; CONTENT_KEY_BYTES + AEAD_TAG_BYTES];

        let encoded = encode_wrapped(&kem_ct, &nonce, &aead_ct).unwrap();
        assert_eq!(encoded.len(), WRAPPED_CONTENT_KEY_BYTES);

        let parts = decode_wrapped(&encoded).unwrap();
        assert_eq!(parts.kem_ciphertext, &kem_ct);
        assert_eq!(parts.nonce, &nonce);
        assert_eq!(parts.aead_ciphertext, &aead_ct[..]);
    }
}
