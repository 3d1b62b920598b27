//! Algorithm descriptors for key agreement, key derivation and AEAD.
//!
//! Every envelope names the scheme it was sealed with, so old envelopes stay
//! readable after the default changes. Lookup is by exact id; anything not in
//! [`SCHEMES`] fails closed.

use crate::constants::{GCM_NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE, XCHACHA_NONCE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    X25519,
}

/// Hash applied to the raw ECDH output before it is used as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfHash {
    Sha256,
    Blake3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    XChaCha20Poly1305,
    Aes256Gcm,
}

impl AeadAlgorithm {
    pub fn nonce_len(self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => XCHACHA_NONCE_SIZE,
            Self::Aes256Gcm => GCM_NONCE_SIZE,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Scheme {
    pub id: &'static str,
    pub curve: Curve,
    pub kdf: KdfHash,
    pub aead: AeadAlgorithm,
}

pub const X25519_SHA256_XCHACHA20POLY1305: Scheme = Scheme {
    id: "x25519-sha256-xchacha20poly1305",
    curve: Curve::X25519,
    kdf: KdfHash::Sha256,
    aead: AeadAlgorithm::XChaCha20Poly1305,
};

pub const X25519_SHA256_AES256GCM: Scheme = Scheme {
    id: "x25519-sha256-aes256gcm",
    curve: Curve::X25519,
    kdf: KdfHash::Sha256,
    aead: AeadAlgorithm::Aes256Gcm,
};

pub const X25519_BLAKE3_XCHACHA20POLY1305: Scheme = Scheme {
    id: "x25519-blake3-xchacha20poly1305",
    curve: Curve::X25519,
    kdf: KdfHash::Blake3,
    aead: AeadAlgorithm::XChaCha20Poly1305,
};

/// All schemes this build can open.
pub static SCHEMES: [Scheme; 3] = [
    X25519_SHA256_XCHACHA20POLY1305,
    X25519_SHA256_AES256GCM,
    X25519_BLAKE3_XCHACHA20POLY1305,
];

impl Scheme {
    /// Scheme used for newly sealed messages.
    pub fn default_scheme() -> &'static Scheme {
        &SCHEMES[0]
    }

    pub fn from_id(id: &str) -> Option<&'static Scheme> {
        SCHEMES.iter().find(|s| s.id == id)
    }

    pub fn nonce_len(&self) -> usize {
        self.aead.nonce_len()
    }

    pub fn tag_len(&self) -> usize {
        TAG_SIZE
    }

    pub fn key_len(&self) -> usize {
        SYMMETRIC_KEY_SIZE
    }
}
