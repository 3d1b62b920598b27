/// Application name
pub const APP_NAME: &str = "Murmur";

/// X25519 public and private key size in bytes
pub const KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (all registered AEADs)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// AEAD tag size in bytes (Poly1305 and GCM)
pub const TAG_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size in bytes
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// AES-256-GCM nonce size in bytes
pub const GCM_NONCE_SIZE: usize = 12;

/// Maximum plaintext size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum identity length in bytes
pub const MAX_IDENTITY_LEN: usize = 128;

/// Joins the two sorted participants of a conversation id.
/// Never legal inside an identity.
pub const CONVERSATION_ID_DELIMITER: char = ':';

/// Format tag published alongside every public key
pub const PUBLIC_KEY_FORMAT: &str = "x25519-raw-b64";

/// Placeholder shown instead of message content in inbox previews
pub const REDACTED_PREVIEW: &str = "[Redacted]";

/// Display name used when the profile collaborator knows nothing
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

/// Default display offset for inbox timestamps (UTC+08:00), in minutes
pub const DEFAULT_DISPLAY_UTC_OFFSET_MINUTES: i32 = 480;
