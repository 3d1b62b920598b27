//! v001 -- Initial schema creation.
//!
//! Creates `profiles`, `conversations` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (display data + published public key)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    user_id      TEXT PRIMARY KEY NOT NULL,
    display_name TEXT,
    photo_url    TEXT,
    public_key   TEXT,                        -- hex-encoded 32-byte X25519 key
    key_format   TEXT,
    updated_at   TEXT NOT NULL                -- RFC-3339, fixed width
);

-- ----------------------------------------------------------------
-- Conversations (exactly two participants, sorted)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id            TEXT PRIMARY KEY NOT NULL,  -- "<lo>:<hi>"
    participant_a TEXT NOT NULL,
    participant_b TEXT NOT NULL,
    created_at    TEXT NOT NULL,

    CHECK (participant_a < participant_b)
);

CREATE INDEX IF NOT EXISTS idx_conversations_a ON conversations(participant_a);
CREATE INDEX IF NOT EXISTS idx_conversations_b ON conversations(participant_b);

-- ----------------------------------------------------------------
-- Messages (append-only; seq keeps append order for equal timestamps)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL UNIQUE,     -- UUID v4
    conversation_id TEXT NOT NULL,            -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,
    recipient_id    TEXT NOT NULL,
    ciphertext      BLOB NOT NULL,            -- ciphertext || tag
    nonce           BLOB NOT NULL,
    sender_pub      BLOB NOT NULL,
    scheme          TEXT NOT NULL,
    created_at      TEXT NOT NULL,            -- server-assigned

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
