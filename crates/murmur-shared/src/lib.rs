//! # murmur-shared
//!
//! The end-to-end encrypted messaging core: X25519 key exchange, AEAD
//! envelopes, deterministic conversation addressing and inbox aggregation.
//!
//! Everything here is a pure function of its inputs (plus OS entropy for
//! keys and nonces) and is safe to call concurrently. Storage is reached
//! only through the traits in [`storage`].

pub mod addressing;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod inbox;
pub mod keys;
pub mod protocol;
pub mod scheme;
pub mod storage;
pub mod types;

pub use addressing::{conversation_id, ConversationId};
pub use error::{CryptoError, IdentityError};
pub use keys::{derive_shared_secret, generate_keypair, KeyPair, PrivateKey, PublicKey, SharedSecret};
pub use protocol::{MessageEnvelope, SealedPayload};
pub use scheme::Scheme;
pub use types::{
    normalize_username, Conversation, Message, MessageOrder, Profile, PublishedKey, UserId,
};
