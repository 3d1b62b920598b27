//! Wire forms of an encrypted message.
//!
//! [`SealedPayload`] is what a client submits: ciphertext, nonce, sender key
//! and scheme, with no timestamp. The server stamps it into a
//! [`MessageEnvelope`], whose `created_at` is always server-assigned. A client
//! that tries to send its own `created_at` is rejected at deserialization.
//!
//! Byte fields travel as standard base64. The AEAD tag is embedded at the end
//! of `ciphertext`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{KEY_SIZE, MAX_MESSAGE_SIZE};
use crate::error::CryptoError;
use crate::scheme::Scheme;

/// A stored, server-stamped encrypted message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(rename = "sender_pub", with = "b64")]
    pub sender_public_key: Vec<u8>,
    pub scheme: String,
    pub created_at: DateTime<Utc>,
}

/// Client-submitted envelope, before the server assigns a timestamp.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealedPayload {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(rename = "sender_pub", with = "b64")]
    pub sender_public_key: Vec<u8>,
    pub scheme: String,
}

impl MessageEnvelope {
    /// Check scheme and field lengths. Runs before any cipher primitive.
    pub fn validate(&self) -> Result<&'static Scheme, CryptoError> {
        check_shape(
            &self.scheme,
            &self.nonce,
            &self.ciphertext,
            &self.sender_public_key,
        )
    }

    /// Strip the timestamp, e.g. to submit a locally sealed envelope.
    pub fn to_payload(&self) -> SealedPayload {
        SealedPayload {
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce.clone(),
            sender_public_key: self.sender_public_key.clone(),
            scheme: self.scheme.clone(),
        }
    }
}

impl SealedPayload {
    pub fn validate(&self) -> Result<&'static Scheme, CryptoError> {
        check_shape(
            &self.scheme,
            &self.nonce,
            &self.ciphertext,
            &self.sender_public_key,
        )
    }

    /// Validate and stamp with the server clock.
    pub fn into_envelope(self, created_at: DateTime<Utc>) -> Result<MessageEnvelope, CryptoError> {
        self.validate()?;
        Ok(MessageEnvelope {
            ciphertext: self.ciphertext,
            nonce: self.nonce,
            sender_public_key: self.sender_public_key,
            scheme: self.scheme,
            created_at,
        })
    }
}

fn check_shape(
    scheme_id: &str,
    nonce: &[u8],
    ciphertext: &[u8],
    sender_public_key: &[u8],
) -> Result<&'static Scheme, CryptoError> {
    let scheme =
        Scheme::from_id(scheme_id).ok_or(CryptoError::MalformedEnvelope("unknown scheme"))?;

    if nonce.len() != scheme.nonce_len() {
        return Err(CryptoError::MalformedEnvelope("nonce length does not match scheme"));
    }
    if ciphertext.len() < scheme.tag_len() {
        return Err(CryptoError::MalformedEnvelope("ciphertext shorter than tag"));
    }
    if ciphertext.len() > MAX_MESSAGE_SIZE + scheme.tag_len() {
        return Err(CryptoError::MalformedEnvelope("ciphertext too large"));
    }
    if sender_public_key.len() != KEY_SIZE {
        return Err(CryptoError::MalformedEnvelope("sender public key has wrong length"));
    }

    Ok(scheme)
}

// Lengths only: nonces and ciphertext stay out of logs.
impl std::fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("scheme", &self.scheme)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl std::fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedPayload")
            .field("scheme", &self.scheme)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .finish()
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s.trim())
            .map_err(|_| serde::de::Error::custom("invalid base64"))
    }
}
