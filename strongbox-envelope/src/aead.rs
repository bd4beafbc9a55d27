//! AEAD: AES-256-GCM

extern crate alloc;
use alloc::vec::Vec;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use getrandom::getrandom;

use crate::error::{OpenError, SealError};

/// Generate a random 12-byte nonce. Used during encryption only; a nonce is
/// never reused for the same key.
pub fn nonce() -> Result<[u8; 12], SealError> {
    let mut n = [0u8; 12];
    getrandom(&mut n).map_err(|_| SealError)?;
    Ok(n)
}

/// AEAD seal (encrypt path).
pub fn seal(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, SealError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: plaintext, aad };
    cipher.encrypt(n, payload).map_err(|_| SealError)
}

/// AEAD open (decrypt path). Tag failure, wrong key and corrupt input all
/// collapse into the same `OpenError`.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, OpenError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| OpenError)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: ciphertext, aad };
    cipher.decrypt(n, payload).map_err(|_| OpenError)
}
