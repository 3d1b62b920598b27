use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use murmur_shared::addressing::{conversation_id, ConversationId};
use murmur_shared::protocol::MessageEnvelope;
use murmur_shared::storage::ConversationStore;
use murmur_shared::types::{Conversation, Message, MessageOrder, UserId};

use crate::database::{conversion_error, decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, \
                               ciphertext, nonce, sender_pub, scheme, created_at";

impl Database {
    /// Append `message` to the log of conversation `id`.
    ///
    /// The message must name `id` and its sender/recipient pair must address
    /// exactly that conversation.
    pub fn insert_message(&self, id: &ConversationId, message: &Message) -> Result<()> {
        if message.conversation_id != *id
            || conversation_id(&message.sender_id, &message.recipient_id)? != *id
        {
            return Err(StoreError::ConversationMismatch(id.to_string()));
        }

        let envelope = &message.envelope;
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, recipient_id,
                                   ciphertext, nonce, sender_pub, scheme, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id.to_string(),
                id.as_str(),
                message.sender_id.as_str(),
                message.recipient_id.as_str(),
                envelope.ciphertext,
                envelope.nonce,
                envelope.sender_public_key,
                envelope.scheme,
                encode_ts(&message.created_at),
            ],
        )?;
        Ok(())
    }

    /// Full log of a conversation. Equal timestamps keep append order.
    pub fn get_messages_for_conversation(
        &self,
        id: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<Message>> {
        let sql = match order {
            MessageOrder::Ascending => format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, seq ASC"
            ),
            MessageOrder::Descending => format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, seq DESC"
            ),
        };

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_last_message(&self, id: &ConversationId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, seq DESC
                     LIMIT 1"
                ),
                params![id.as_str()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    pub fn count_messages(&self, id: &ConversationId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let recipient_str: String = row.get(3)?;
    let ciphertext: Vec<u8> = row.get(4)?;
    let nonce: Vec<u8> = row.get(5)?;
    let sender_public_key: Vec<u8> = row.get(6)?;
    let scheme: String = row.get(7)?;
    let ts_str: String = row.get(8)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let conversation_id =
        ConversationId::parse(&conversation_str).map_err(|e| conversion_error(1, e))?;
    let sender_id = UserId::new(sender_str).map_err(|e| conversion_error(2, e))?;
    let recipient_id = UserId::new(recipient_str).map_err(|e| conversion_error(3, e))?;
    let created_at = decode_ts(8, &ts_str)?;

    Ok(Message {
        id,
        conversation_id,
        sender_id,
        recipient_id,
        envelope: MessageEnvelope {
            ciphertext,
            nonce,
            sender_public_key,
            scheme,
            created_at,
        },
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Core storage interface
// ---------------------------------------------------------------------------

impl ConversationStore for Database {
    type Error = StoreError;

    fn get_or_create_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        self.ensure_conversation(a, b)
    }

    fn append_message(&self, id: &ConversationId, message: &Message) -> Result<()> {
        self.insert_message(id, message)
    }

    fn stream_messages(&self, id: &ConversationId, order: MessageOrder) -> Result<Vec<Message>> {
        self.get_messages_for_conversation(id, order)
    }

    fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>> {
        self.list_conversations_for(user)
    }

    fn last_message(&self, id: &ConversationId) -> Result<Option<Message>> {
        self.get_last_message(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use murmur_shared::crypto::{open_from_sender, seal_for_recipient};
    use murmur_shared::storage::append_envelope;
    use murmur_shared::{generate_keypair, Scheme};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn envelope_at(tag: u8, created_at: DateTime<Utc>) -> MessageEnvelope {
        MessageEnvelope {
            ciphertext: vec![tag; 20],
            nonce: vec![0u8; 24],
            sender_public_key: vec![1u8; 32],
            scheme: "x25519-sha256-xchacha20poly1305".into(),
            created_at,
        }
    }

    #[test]
    fn stream_orders_by_server_time() {
        let db = Database::open_in_memory().unwrap();
        let (alice, bob) = (uid("alice"), uid("bob"));

        // Appended out of time order on purpose.
        append_envelope(&db, &alice, &bob, envelope_at(2, at(200))).unwrap();
        append_envelope(&db, &bob, &alice, envelope_at(1, at(100))).unwrap();
        append_envelope(&db, &alice, &bob, envelope_at(3, at(300))).unwrap();

        let id = conversation_id(&alice, &bob).unwrap();
        let asc = db.stream_messages(&id, MessageOrder::Ascending).unwrap();
        let tags: Vec<u8> = asc.iter().map(|m| m.envelope.ciphertext[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);

        let desc = db.stream_messages(&id, MessageOrder::Descending).unwrap();
        let tags: Vec<u8> = desc.iter().map(|m| m.envelope.ciphertext[0]).collect();
        assert_eq!(tags, vec![3, 2, 1]);

        let last = db.last_message(&id).unwrap().unwrap();
        assert_eq!(last.envelope.ciphertext[0], 3);
        assert_eq!(last.sender_id, alice);
    }

    #[test]
    fn equal_timestamps_keep_append_order() {
        let db = Database::open_in_memory().unwrap();
        let (alice, bob) = (uid("alice"), uid("bob"));

        for tag in 1..=4 {
            append_envelope(&db, &alice, &bob, envelope_at(tag, at(50))).unwrap();
        }

        let id = conversation_id(&alice, &bob).unwrap();
        let asc = db.stream_messages(&id, MessageOrder::Ascending).unwrap();
        let tags: Vec<u8> = asc.iter().map(|m| m.envelope.ciphertext[0]).collect();
        assert_eq!(tags, vec![1, 2, 3, 4]);

        assert_eq!(db.last_message(&id).unwrap().unwrap().envelope.ciphertext[0], 4);
    }

    #[test]
    fn mismatched_conversation_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let (alice, bob, carol) = (uid("alice"), uid("bob"), uid("carol"));

        let ab = db.get_or_create_conversation(&alice, &bob).unwrap();
        let ac = db.get_or_create_conversation(&alice, &carol).unwrap();

        // Right pair, wrong target log.
        let message = Message::new(ab.id.clone(), alice.clone(), bob.clone(), envelope_at(1, at(1)));
        assert!(matches!(
            db.append_message(&ac.id, &message),
            Err(StoreError::ConversationMismatch(_))
        ));

        // Claims the right log but the pair addresses another one.
        let forged = Message::new(ab.id.clone(), alice, carol, envelope_at(1, at(1)));
        assert!(matches!(
            db.append_message(&ab.id, &forged),
            Err(StoreError::ConversationMismatch(_))
        ));

        assert_eq!(db.count_messages(&ab.id).unwrap(), 0);
        assert_eq!(db.count_messages(&ac.id).unwrap(), 0);
    }

    #[test]
    fn empty_conversation_has_no_last_message() {
        let db = Database::open_in_memory().unwrap();
        let conv = db.get_or_create_conversation(&uid("a"), &uid("b")).unwrap();
        assert!(db.last_message(&conv.id).unwrap().is_none());
        assert!(db
            .stream_messages(&conv.id, MessageOrder::Ascending)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sealed_message_survives_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.db");
        let (alice_id, bob_id) = (uid("alice"), uid("bob"));
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();

        {
            let db = Database::open_at(&path).unwrap();
            let envelope = seal_for_recipient(
                Scheme::default_scheme(),
                &alice.private,
                &bob.public,
                b"hello",
            )
            .unwrap();
            append_envelope(&db, &alice_id, &bob_id, envelope).unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let id = conversation_id(&bob_id, &alice_id).unwrap();
        let messages = db.stream_messages(&id, MessageOrder::Ascending).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, alice_id);
        assert_eq!(messages[0].recipient_id, bob_id);

        let plaintext = open_from_sender(&bob.private, &messages[0].envelope).unwrap();
        assert_eq!(plaintext.as_slice(), b"hello");
    }
}
