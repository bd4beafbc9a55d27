use strongbox_envelope::wire::{
    KEM_CIPHERTEXT_BYTES, MIN_WRAPPED_BYTES, NONCE_BYTES, WRAPPED_CONTENT_KEY_BYTES,
};
use strongbox_envelope::{Envelope, OpenError, PublicKey, SecretKey};

fn setup() -> (Envelope, PublicKey, SecretKey) {
    let engine: Envelope = Envelope::new();
    let (pk, sk) = engine.keygen();
    (engine, pk, sk)
}

#[test]
fn roundtrip_basic() {
    let (engine, pk, sk) = setup();
    let plaintext = b"a 32 byte content key goes here!";

    let wrapped = engine.seal_to(&pk, plaintext, b"ctx").unwrap();
    let opened = engine.open_from(&sk, &wrapped, b"ctx").unwrap();
    assert_eq!(&opened, plaintext);
}

#[test]
fn wrapped_content_key_has_fixed_size() {
    let (engine, pk, _sk) = setup();
    let wrapped = engine.seal_to(&pk, &[0u8; 32], b"ctx").unwrap();
    assert_eq!(wrapped.len(), WRAPPED_CONTENT_KEY_BYTES);
}

#[test]
fn roundtrip_empty_plaintext() {
    let (engine, pk, sk) = setup();
    let wrapped = engine.seal_to(&pk, b"", b"ctx").unwrap();
    let opened = engine.open_from(&sk, &wrapped, b"ctx").unwrap();
    assert_eq!(opened, b"");
}

#[test]
fn roundtrip_large_plaintext() {
    let (engine, pk, sk) = setup();
    let plaintext = vec![0xABu8; 65536];
    let wrapped = engine.seal_to(&pk, &plaintext, b"ctx").unwrap();
    let opened = engine.open_from(&sk, &wrapped, b"ctx").unwrap();
    assert_eq!(opened, plaintext);
}

#[test]
fn wrong_context_fails() {
    let (engine, pk, sk) = setup();
    let wrapped = engine.seal_to(&pk, b"data", b"good-ctx").unwrap();
    let result = engine.open_from(&sk, &wrapped, b"bad-ctx");
    assert_eq!(result, Err(OpenError));
}

#[test]
fn wrong_key_fails() {
    let (engine, pk, _sk) = setup();
    let (_pk2, sk2) = engine.keygen();
    let wrapped = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    let result = engine.open_from(&sk2, &wrapped, b"ctx");
    assert_eq!(result, Err(OpenError));
}

#[test]
fn tampered_kem_ct_fails() {
    let (engine, pk, sk) = setup();
    let mut wrapped = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    wrapped[KEM_CIPHERTEXT_BYTES / 2] ^= 0x01;
    assert_eq!(engine.open_from(&sk, &wrapped, b"ctx"), Err(OpenError));
}

#[test]
fn tampered_nonce_fails() {
    let (engine, pk, sk) = setup();
    let mut wrapped = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    wrapped[KEM_CIPHERTEXT_BYTES + NONCE_BYTES / 2] ^= 0x01;
    assert_eq!(engine.open_from(&sk, &wrapped, b"ctx"), Err(OpenError));
}

#[test]
fn tampered_aead_ct_fails() {
    let (engine, pk, sk) = setup();
    let mut wrapped = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    let last = wrapped.len() - 1;
    wrapped[last] ^= 0x01;
    assert_eq!(engine.open_from(&sk, &wrapped, b"ctx"), Err(OpenError));
}

#[test]
fn truncated_fails() {
    let (engine, pk, sk) = setup();
    let wrapped = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    for len in [0, 1, MIN_WRAPPED_BYTES - 1, wrapped.len() - 1] {
        assert_eq!(engine.open_from(&sk, &wrapped[..len], b"ctx"), Err(OpenError));
    }
}

#[test]
fn key_serialization_roundtrip() {
    let (engine, pk, sk) = setup();
    let pk2 = PublicKey::from_bytes(&pk.to_bytes()).unwrap();
    let sk_bytes = zeroize::Zeroizing::new(sk.to_bytes());
    let sk2 = SecretKey::from_bytes(&sk_bytes).unwrap();

    let wrapped = engine.seal_to(&pk2, b"data", b"ctx").unwrap();
    let opened = engine.open_from(&sk2, &wrapped, b"ctx").unwrap();
    assert_eq!(opened, b"data");
}

#[test]
fn nonces_are_fresh_per_seal() {
    let (engine, pk, _sk) = setup();
    let a = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    let b = engine.seal_to(&pk, b"data", b"ctx").unwrap();
    let nonce = |w: &[u8]| w[KEM_CIPHERTEXT_BYTES..KEM_CIPHERTEXT_BYTES + NONCE_BYTES].to_vec();
    // distinct encapsulations and distinct nonces
    assert_ne!(a[..KEM_CIPHERTEXT_BYTES], b[..KEM_CIPHERTEXT_BYTES]);
    assert_ne!(nonce(&a), nonce(&b));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let (engine, pk, sk) = setup();
            let wrapped = engine.seal_to(&pk, &payload, b"ctx").unwrap();
            let opened = engine.open_from(&sk, &wrapped, b"ctx").unwrap();
            prop_assert_eq!(opened, payload);
        }
    }
}
