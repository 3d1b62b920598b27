use thiserror::Error;

/// Failures of key exchange and message encryption.
///
/// Reasons are static strings on purpose: no variant ever carries key
/// bytes, nonces or plaintext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The OS entropy source failed. Fatal for the calling operation.
    #[error("Key generation failed: entropy source unavailable")]
    KeyGeneration,

    /// Key material failed to decode or is not a usable curve point.
    #[error("Invalid key: {0}")]
    InvalidKey(&'static str),

    /// Tag did not verify: tampered ciphertext, wrong key or corrupted nonce.
    #[error("Cannot decrypt: message authentication failed")]
    Authentication,

    /// Structurally invalid envelope, rejected before any cipher runs.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Plaintext too large: {size} bytes (max {max})")]
    PlaintextTooLarge { size: usize, max: usize },
}

/// Addressing-layer validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identity must not be empty")]
    Empty,

    #[error("Identity too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Identity contains the reserved delimiter ':'")]
    ContainsDelimiter,

    #[error("A conversation needs two distinct participants")]
    SelfConversation,

    #[error("Malformed conversation id")]
    MalformedConversationId,
}
