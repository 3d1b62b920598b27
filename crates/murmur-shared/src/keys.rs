//! X25519 key pairs and shared-secret derivation.
//!
//! One static key pair per user. The private half never leaves its owner; the
//! public half is published to the key directory as base64 together with the
//! [`PUBLIC_KEY_FORMAT`] tag.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::constants::{KEY_SIZE, PUBLIC_KEY_FORMAT};
use crate::error::CryptoError;
use crate::scheme::{Curve, KdfHash, Scheme};

/// X25519 private key. Zeroized on drop.
pub struct PrivateKey(StaticSecret);

// PrivateKey does not implement Clone/Debug to prevent leakage.

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| CryptoError::InvalidKey("private key is not valid base64"))?,
        );
        let bytes: [u8; KEY_SIZE] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("private key must be 32 bytes"))?;
        Ok(Self::from_bytes(bytes))
    }

    /// Export for storage inside the owner's control boundary.
    pub fn to_base64(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.0.to_bytes());
        Zeroizing::new(STANDARD.encode(bytes.as_slice()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0).to_bytes())
    }
}

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey("public key is not valid base64"))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn format(&self) -> &'static str {
        PUBLIC_KEY_FORMAT
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }
}

/// Generate a fresh key pair from OS entropy.
pub fn generate_keypair() -> Result<KeyPair, CryptoError> {
    let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(bytes.as_mut_slice())
        .map_err(|_| CryptoError::KeyGeneration)?;
    Ok(KeyPair::from_private(PrivateKey::from_bytes(*bytes)))
}

/// Symmetric key agreed between two parties, bound to the scheme it was
/// derived for. Also remembers the local public key so an envelope sealed
/// with it can name its sender.
pub struct SharedSecret {
    key: Zeroizing<[u8; 32]>,
    local_public: PublicKey,
    scheme: &'static Scheme,
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn local_public(&self) -> &PublicKey {
        &self.local_public
    }

    pub fn scheme(&self) -> &'static Scheme {
        self.scheme
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.scheme.id == other.scheme.id && bool::from(self.key.as_slice().ct_eq(other.key.as_slice()))
    }
}

impl Eq for SharedSecret {}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("scheme", &self.scheme.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// ECDH between `local` and `peer`, then hash the shared u-coordinate with
/// the scheme's KDF hash. The raw point is never used as key material.
///
/// No context string is mixed in; both sides only need their own private
/// key and the other side's public key.
pub fn derive_shared_secret(
    scheme: &'static Scheme,
    local: &PrivateKey,
    peer: &PublicKey,
) -> Result<SharedSecret, CryptoError> {
    match scheme.curve {
        Curve::X25519 => {}
    }

    let peer_point = x25519_dalek::PublicKey::from(peer.0);
    let shared = local.0.diffie_hellman(&peer_point);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("peer public key is a low-order point"));
    }

    let mut key = Zeroizing::new([0u8; 32]);
    match scheme.kdf {
        KdfHash::Sha256 => key.copy_from_slice(&Sha256::digest(shared.as_bytes())),
        KdfHash::Blake3 => key.copy_from_slice(blake3::hash(shared.as_bytes()).as_bytes()),
    }

    Ok(SharedSecret {
        key,
        local_public: local.public_key(),
        scheme,
    })
}

/// Same as [`derive_shared_secret`] for keys still in transport encoding.
pub fn derive_shared_secret_encoded(
    scheme: &'static Scheme,
    local_private_b64: &str,
    peer_public_b64: &str,
) -> Result<SharedSecret, CryptoError> {
    let local = PrivateKey::from_base64(local_private_b64)?;
    let peer = PublicKey::from_base64(peer_public_b64)?;
    derive_shared_secret(scheme, &local, &peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::SCHEMES;
    use proptest::prelude::*;

    #[test]
    fn test_keypair_generation() {
        let kp = generate_keypair().unwrap();
        assert_eq!(kp.public, kp.private.public_key());
        assert_eq!(kp.public.format(), "x25519-raw-b64");
    }

    #[test]
    fn test_ecdh_symmetry_all_schemes() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();

        for scheme in SCHEMES.iter() {
            let ab = derive_shared_secret(scheme, &alice.private, &bob.public).unwrap();
            let ba = derive_shared_secret(scheme, &bob.private, &alice.public).unwrap();
            assert_eq!(ab, ba);
            assert_eq!(ab.local_public(), &alice.public);
            assert_eq!(ba.local_public(), &bob.public);
        }
    }

    #[test]
    fn test_kdf_changes_key() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let sha = derive_shared_secret(&SCHEMES[0], &alice.private, &bob.public).unwrap();
        let b3 = derive_shared_secret(&SCHEMES[2], &alice.private, &bob.public).unwrap();
        assert_ne!(sha.as_bytes(), b3.as_bytes());
    }

    #[test]
    fn test_secret_is_hashed_not_raw() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let derived = derive_shared_secret(&SCHEMES[0], &alice.private, &bob.public).unwrap();

        let raw = alice
            .private
            .0
            .diffie_hellman(&x25519_dalek::PublicKey::from(*bob.public.as_bytes()));
        assert_ne!(derived.as_bytes(), raw.as_bytes());
        assert_eq!(
            derived.as_bytes().as_slice(),
            Sha256::digest(raw.as_bytes()).as_slice()
        );
    }

    #[test]
    fn test_low_order_point_rejected() {
        let alice = generate_keypair().unwrap();
        let identity_point = PublicKey::from_bytes(&[0u8; 32]).unwrap();
        let err = derive_shared_secret(&SCHEMES[0], &alice.private, &identity_point).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[test]
    fn test_bad_public_key_encodings() {
        assert!(matches!(
            PublicKey::from_bytes(&[1u8; 31]),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            PublicKey::from_base64("not base64!"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            PrivateKey::from_base64(&STANDARD.encode([7u8; 33])),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_base64_roundtrip_preserves_key() {
        let kp = generate_keypair().unwrap();
        let restored = PrivateKey::from_base64(&kp.private.to_base64()).unwrap();
        assert_eq!(restored.public_key(), kp.public);
        assert_eq!(PublicKey::from_base64(&kp.public.to_base64()).unwrap(), kp.public);
    }

    #[test]
    fn test_encoded_derivation_matches_typed() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let typed = derive_shared_secret(&SCHEMES[0], &alice.private, &bob.public).unwrap();
        let encoded = derive_shared_secret_encoded(
            &SCHEMES[0],
            &alice.private.to_base64(),
            &bob.public.to_base64(),
        )
        .unwrap();
        assert_eq!(typed, encoded);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let secret = derive_shared_secret(&SCHEMES[0], &alice.private, &bob.public).unwrap();
        let rendered = format!("{secret:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex_like(secret.as_bytes())));
    }

    fn hex_like(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    proptest! {
        #[test]
        fn prop_ecdh_symmetric(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            let alice = KeyPair::from_private(PrivateKey::from_bytes(a));
            let bob = KeyPair::from_private(PrivateKey::from_bytes(b));
            let ab = derive_shared_secret(Scheme::default_scheme(), &alice.private, &bob.public).unwrap();
            let ba = derive_shared_secret(Scheme::default_scheme(), &bob.private, &alice.public).unwrap();
            prop_assert_eq!(ab, ba);
        }
    }
}
