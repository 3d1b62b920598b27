use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use murmur_shared::addressing::{conversation_id, ConversationId};
use murmur_shared::types::{Conversation, UserId};

use crate::database::{conversion_error, decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Return the conversation between `a` and `b`, inserting it on first use.
    ///
    /// Concurrent callers for the same pair converge on one row: the insert
    /// is a no-op when the id already exists.
    pub fn ensure_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        let id = conversation_id(a, b)?;
        let (lo, hi) = id.participants();

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO conversations (id, participant_a, participant_b, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), lo.as_str(), hi.as_str(), encode_ts(&Utc::now())],
        )?;
        if inserted > 0 {
            tracing::debug!(conversation = %id, "created conversation");
        }

        self.get_conversation(&id)?.ok_or(StoreError::NotFound)
    }

    pub fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let conversation = self
            .conn()
            .query_row(
                "SELECT id, participant_a, participant_b, created_at
                 FROM conversations WHERE id = ?1",
                params![id.as_str()],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    /// Every conversation `user` participates in, by id.
    pub fn list_conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, participant_a, participant_b, created_at
             FROM conversations
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![user.as_str()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let a_str: String = row.get(1)?;
    let b_str: String = row.get(2)?;
    let ts_str: String = row.get(3)?;

    let id = ConversationId::parse(&id_str).map_err(|e| conversion_error(0, e))?;
    let a = UserId::new(a_str).map_err(|e| conversion_error(1, e))?;
    let b = UserId::new(b_str).map_err(|e| conversion_error(2, e))?;
    let created_at = decode_ts(3, &ts_str)?;

    Ok(Conversation {
        id,
        participants: (a, b),
        created_at,
    })
}
