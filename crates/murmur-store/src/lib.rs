//! # murmur-store
//!
//! SQLite storage collaborator for Murmur.
//!
//! Holds the append-only message log per conversation, the conversation
//! registry and user profiles (display name, photo, published public key).
//! Only ciphertext is ever stored. The crate exposes a synchronous
//! [`Database`] handle wrapping a `rusqlite::Connection`; it implements the
//! core's [`ConversationStore`](murmur_shared::storage::ConversationStore) and
//! [`ProfileDirectory`](murmur_shared::storage::ProfileDirectory) traits.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod profiles;

mod error;

pub use database::Database;
pub use error::StoreError;
