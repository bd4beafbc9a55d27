//! # Strongbox Envelope
//!
//! Hybrid post-quantum key wrapping for long-lived data.
//!
//! One recipient, one wrapped value: encapsulate to the recipient's hybrid
//! public key, derive an AES-256-GCM key from the combined shared secret,
//! seal the payload, and emit the fixed-width layout
//! `kem_ct || nonce || aead_ct`.
//!
//! ```rust
//! use strongbox_envelope::Envelope;
//!
//! let engine: Envelope = Envelope::new();
//! let (pk, sk) = engine.keygen();
//!
//! let wrapped = engine.seal_to(&pk, b"content key", b"object:42").unwrap();
//! let opened = engine.open_from(&sk, &wrapped, b"object:42").unwrap();
//! assert_eq!(opened, b"content key");
//! ```
//!
//! ## Security properties
//!
//! - **Hybrid KEM**: X25519 + ML-KEM-1024 — secure if either holds
//! - **Uniform errors**: wrong key, tampering and truncation are
//!   indistinguishable to the caller
//! - **Context binding**: the KDF ties the wrap key to a caller context and
//!   to the exact KEM ciphertext
//!
//! ## What's NOT provided
//!
//! - Key custody or caching (see the vault crate)
//! - Streaming encryption
//! - Constant-time guarantees beyond what the underlying crates give

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

use alloc::vec::Vec;

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub mod aead;
mod error;
mod kdf;
mod kem;
pub mod wire;

pub use error::{OpenError, SealError};
pub use kem::{HybridX25519MlKem1024, KemProvider, PublicKey, SecretKey};

/// Envelope engine, generic over the KEM suite.
pub struct Envelope<K: KemProvider = HybridX25519MlKem1024> {
    _marker: core::marker::PhantomData<K>,
}

impl<K: KemProvider> Default for Envelope<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KemProvider> Envelope<K> {
    pub fn new() -> Self {
        Self {
            _marker: core::marker::PhantomData,
        }
    }

    /// Generate a fresh hybrid keypair.
    pub fn keygen(&self) -> (PublicKey, SecretKey) {
        K::keygen()
    }

    /// Wrap `plaintext` for the holder of `pk`.
    ///
    /// Output layout: `kem_ct[1600] || nonce[12] || aead_ct`.
    pub fn seal_to(
        &self,
        pk: &PublicKey,
        plaintext: &[u8],
        context: &[u8],
    ) -> Result<Vec<u8>, SealError> {
        let (ss_raw, kem_ct) = K::encapsulate(pk)?;
        let shared_secret = Zeroizing::new(ss_raw);
        let ct_hash = kdf::ct_hash(&kem_ct);
        let wrap_key = Zeroizing::new(kdf::derive_key(&shared_secret, &ct_hash, context)?);
        let nonce = aead::nonce()?;
        let aead_ct = aead::seal(&wrap_key, &nonce, plaintext, &[])?;
        wire::encode_wrapped(&kem_ct, &nonce, &aead_ct)
    }

    /// Unwrap a value produced by [`seal_to`](Self::seal_to).
    pub fn open_from(
        &self,
        sk: &SecretKey,
        wrapped: &[u8],
        context: &[u8],
    ) -> Result<Vec<u8>, OpenError> {
        let parts = wire::decode_wrapped(wrapped)?;
        let ss_raw = K::decapsulate(sk, parts.kem_ciphertext)?;
        let shared_secret = Zeroizing::new(ss_raw);
        let ct_hash = kdf::ct_hash(parts.kem_ciphertext);
        let wrap_key = Zeroizing::new(
            kdf::derive_key(&shared_secret, &ct_hash, context).map_err(OpenError::from)?,
        );
        aead::open(&wrap_key, parts.nonce, parts.aead_ciphertext, &[])
    }
}

/// Constant-time byte equality. Used wherever key material is compared
/// (e.g. rotation round-trip verification).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
