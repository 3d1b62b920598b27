use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    XChaCha20Poly1305,
};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::constants::MAX_MESSAGE_SIZE;
use crate::error::CryptoError;
use crate::keys::{derive_shared_secret, PrivateKey, PublicKey, SharedSecret};
use crate::protocol::MessageEnvelope;
use crate::scheme::{AeadAlgorithm, Scheme};

pub fn generate_nonce(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(nonce)
}

/// Seal `plaintext` under `secret`. A fresh random nonce is drawn on every
/// call; the tag is appended to the ciphertext.
///
/// `created_at` is the local clock. Servers re-stamp on receipt.
pub fn encrypt(plaintext: &[u8], secret: &SharedSecret) -> Result<MessageEnvelope, CryptoError> {
    if plaintext.len() > MAX_MESSAGE_SIZE {
        return Err(CryptoError::PlaintextTooLarge {
            size: plaintext.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let scheme = secret.scheme();
    let nonce = generate_nonce(scheme.nonce_len())?;
    let ciphertext = seal(scheme.aead, secret.as_bytes(), &nonce, plaintext)?;

    tracing::trace!(
        scheme = scheme.id,
        ciphertext_len = ciphertext.len(),
        "sealed message"
    );

    Ok(MessageEnvelope {
        ciphertext,
        nonce,
        sender_public_key: secret.local_public().as_bytes().to_vec(),
        scheme: scheme.id.to_string(),
        created_at: Utc::now(),
    })
}

/// Open an envelope. Shape is validated first; a tag mismatch is always
/// [`CryptoError::Authentication`], never partial output.
pub fn decrypt(
    envelope: &MessageEnvelope,
    secret: &SharedSecret,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let scheme = envelope.validate()?;
    if scheme.id != secret.scheme().id {
        return Err(CryptoError::MalformedEnvelope(
            "shared secret was derived for a different scheme",
        ));
    }

    open(scheme.aead, secret.as_bytes(), &envelope.nonce, &envelope.ciphertext)
}

/// Derive the secret for `recipient` and seal in one step.
pub fn seal_for_recipient(
    scheme: &'static Scheme,
    local: &PrivateKey,
    recipient: &PublicKey,
    plaintext: &[u8],
) -> Result<MessageEnvelope, CryptoError> {
    let secret = derive_shared_secret(scheme, local, recipient)?;
    encrypt(plaintext, &secret)
}

/// Re-derive the secret from the sender key carried in the envelope and open it.
pub fn open_from_sender(
    local: &PrivateKey,
    envelope: &MessageEnvelope,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let scheme = envelope.validate()?;
    let sender = PublicKey::from_bytes(&envelope.sender_public_key)?;
    let secret = derive_shared_secret(scheme, local, &sender)?;
    decrypt(envelope, &secret)
}

fn seal(
    aead: AeadAlgorithm,
    key: &[u8; 32],
    nonce: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let sealed = match aead {
        AeadAlgorithm::XChaCha20Poly1305 => XChaCha20Poly1305::new(key.into())
            .encrypt(GenericArray::from_slice(nonce), plaintext),
        AeadAlgorithm::Aes256Gcm => {
            Aes256Gcm::new(key.into()).encrypt(GenericArray::from_slice(nonce), plaintext)
        }
    };
    sealed.map_err(|_| CryptoError::EncryptionFailed)
}

fn open(
    aead: AeadAlgorithm,
    key: &[u8; 32],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let opened = match aead {
        AeadAlgorithm::XChaCha20Poly1305 => XChaCha20Poly1305::new(key.into())
            .decrypt(GenericArray::from_slice(nonce), ciphertext),
        AeadAlgorithm::Aes256Gcm => {
            Aes256Gcm::new(key.into()).decrypt(GenericArray::from_slice(nonce), ciphertext)
        }
    };
    opened
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_keypair, KeyPair};
    use crate::scheme::SCHEMES;
    use proptest::prelude::*;

    fn pair_secrets(scheme: &'static Scheme) -> (KeyPair, KeyPair, SharedSecret, SharedSecret) {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let a = derive_shared_secret(scheme, &alice.private, &bob.public).unwrap();
        let b = derive_shared_secret(scheme, &bob.private, &alice.public).unwrap();
        (alice, bob, a, b)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_all_schemes() {
        for scheme in SCHEMES.iter() {
            let (_, _, alice_secret, bob_secret) = pair_secrets(scheme);
            let envelope = encrypt(b"Liberte, egalite, fraternite!", &alice_secret).unwrap();
            assert_eq!(envelope.scheme, scheme.id);
            assert_eq!(envelope.nonce.len(), scheme.nonce_len());

            let plaintext = decrypt(&envelope, &bob_secret).unwrap();
            assert_eq!(plaintext.as_slice(), b"Liberte, egalite, fraternite!");
        }
    }

    #[test]
    fn test_alice_to_bob_hello() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();

        let envelope =
            seal_for_recipient(Scheme::default_scheme(), &alice.private, &bob.public, b"hello")
                .unwrap();
        assert_eq!(envelope.sender_public_key, alice.public.as_bytes().to_vec());

        let opened = open_from_sender(&bob.private, &envelope).unwrap();
        assert_eq!(opened.as_slice(), b"hello");
    }

    #[test]
    fn test_nonce_uniqueness() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let first = encrypt(b"same plaintext", &secret).unwrap();
        let second = encrypt(b"same plaintext", &secret).unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let (_, _, other, _) = pair_secrets(Scheme::default_scheme());
        let envelope = encrypt(b"Secret message", &secret).unwrap();
        assert_eq!(decrypt(&envelope, &other).unwrap_err(), CryptoError::Authentication);
    }

    #[test]
    fn test_third_party_cannot_open() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let eve = generate_keypair().unwrap();
        let envelope =
            seal_for_recipient(Scheme::default_scheme(), &alice.private, &bob.public, b"psst")
                .unwrap();
        assert_eq!(
            open_from_sender(&eve.private, &envelope).unwrap_err(),
            CryptoError::Authentication
        );
    }

    #[test]
    fn test_corrupted_nonce_fails() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let mut envelope = encrypt(b"Important data", &secret).unwrap();
        envelope.nonce[0] ^= 0x01;
        assert_eq!(decrypt(&envelope, &secret).unwrap_err(), CryptoError::Authentication);
    }

    #[test]
    fn test_unknown_scheme_is_malformed() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let mut envelope = encrypt(b"hello", &secret).unwrap();
        envelope.scheme = "nacl-secretbox-x25519".into();
        assert!(matches!(
            decrypt(&envelope, &secret),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_scheme_mismatch_is_malformed() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let sha = derive_shared_secret(&SCHEMES[0], &alice.private, &bob.public).unwrap();
        let gcm = derive_shared_secret(&SCHEMES[1], &alice.private, &bob.public).unwrap();

        let envelope = encrypt(b"hello", &sha).unwrap();
        assert!(matches!(
            decrypt(&envelope, &gcm),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_is_malformed() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let mut envelope = encrypt(b"", &secret).unwrap();
        assert_eq!(envelope.ciphertext.len(), 16);
        envelope.ciphertext.pop();
        assert!(matches!(
            decrypt(&envelope, &secret),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_plaintext_too_large() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let big = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            encrypt(&big, &secret),
            Err(CryptoError::PlaintextTooLarge { .. })
        ));
    }

    #[test]
    fn test_errors_do_not_echo_input() {
        let (_, _, secret, _) = pair_secrets(Scheme::default_scheme());
        let mut envelope = encrypt(b"top secret words", &secret).unwrap();
        envelope.ciphertext[0] ^= 0xFF;
        let message = decrypt(&envelope, &secret).unwrap_err().to_string();
        assert_eq!(message, "Cannot decrypt: message authentication failed");
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
            let (_, _, a, b) = pair_secrets(Scheme::default_scheme());
            let envelope = encrypt(&plaintext, &a).unwrap();
            let opened = decrypt(&envelope, &b).unwrap();
            prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
        }

        #[test]
        fn prop_single_bit_flip_detected(
            plaintext in prop::collection::vec(any::<u8>(), 0..128),
            bit in any::<prop::sample::Index>(),
            gcm in any::<bool>(),
        ) {
            let scheme = if gcm { &SCHEMES[1] } else { &SCHEMES[0] };
            let (_, _, secret, _) = pair_secrets(scheme);
            let mut envelope = encrypt(&plaintext, &secret).unwrap();

            // Covers both the ciphertext body and the trailing tag.
            let idx = bit.index(envelope.ciphertext.len() * 8);
            envelope.ciphertext[idx / 8] ^= 1 << (idx % 8);

            prop_assert_eq!(decrypt(&envelope, &secret).unwrap_err(), CryptoError::Authentication);
        }
    }
}
