//! Per-user inbox: one entry per conversation, most recent first.
//!
//! The aggregator never decrypts. It only sees envelope metadata, so every
//! preview is [`Preview::Redacted`] unless the caller attaches text it
//! decrypted itself.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Serialize, Serializer};

use crate::addressing::ConversationId;
use crate::constants::{REDACTED_PREVIEW, UNKNOWN_DISPLAY_NAME};
use crate::types::{Conversation, Message, Profile, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Redacted,
    Text(String),
}

impl Preview {
    pub fn as_str(&self) -> &str {
        match self {
            Preview::Redacted => REDACTED_PREVIEW,
            Preview::Text(text) => text,
        }
    }
}

impl Serialize for Preview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxEntry {
    pub conversation_id: ConversationId,
    pub other_participant: UserId,
    pub display_name: String,
    pub preview: Preview,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_sender_id: Option<UserId>,
    /// Base64 sender key of the last message, so a client can re-derive
    /// the secret without another lookup.
    pub last_sender_public_key: Option<String>,
    pub last_scheme: Option<String>,
    pub photo_url: Option<String>,
}

impl InboxEntry {
    /// Replace the redacted marker with text the caller decrypted.
    pub fn with_preview(mut self, text: impl Into<String>) -> Self {
        self.preview = Preview::Text(text.into());
        self
    }
}

/// Build the inbox for `me` from the conversations it takes part in.
///
/// `last_message_lookup` is called once per conversation containing `me`.
pub fn build_inbox<L>(
    me: &UserId,
    conversations: &[Conversation],
    last_message_lookup: L,
) -> Vec<InboxEntry>
where
    L: FnMut(&Conversation) -> Option<Message>,
{
    build_inbox_with_profiles(me, conversations, last_message_lookup, |_| None)
}

/// Like [`build_inbox`], also filling display names and photos from the
/// profile collaborator.
pub fn build_inbox_with_profiles<L, P>(
    me: &UserId,
    conversations: &[Conversation],
    mut last_message_lookup: L,
    mut profile_lookup: P,
) -> Vec<InboxEntry>
where
    L: FnMut(&Conversation) -> Option<Message>,
    P: FnMut(&UserId) -> Option<Profile>,
{
    let mut entries: Vec<InboxEntry> = conversations
        .iter()
        .filter_map(|conversation| {
            let other = conversation.other_participant(me)?.clone();
            let last = last_message_lookup(conversation);
            let profile = profile_lookup(&other);

            let display_name = profile
                .as_ref()
                .and_then(Profile::shown_name)
                .unwrap_or(UNKNOWN_DISPLAY_NAME)
                .to_string();
            let photo_url = profile.and_then(|p| p.photo_url);

            Some(InboxEntry {
                conversation_id: conversation.id.clone(),
                other_participant: other,
                display_name,
                preview: Preview::Redacted,
                last_message_at: last.as_ref().map(|m| m.created_at),
                last_sender_id: last.as_ref().map(|m| m.sender_id.clone()),
                last_sender_public_key: last
                    .as_ref()
                    .map(|m| encode_key(&m.envelope.sender_public_key)),
                last_scheme: last.map(|m| m.envelope.scheme),
                photo_url,
            })
        })
        .collect();

    entries.sort_by(inbox_order);

    tracing::debug!(user = %me, entries = entries.len(), "built inbox");
    entries
}

/// Newest first; conversations without messages last; ties by id.
fn inbox_order(a: &InboxEntry, b: &InboxEntry) -> Ordering {
    match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.conversation_id.cmp(&b.conversation_id))
}

fn encode_key(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(bytes)
}

/// Render a timestamp for display, e.g. `Aug 14, 11:42 PM`.
pub fn format_timestamp(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%b %d, %I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::conversation_id;
    use crate::protocol::MessageEnvelope;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn conversation(a: &str, b: &str) -> Conversation {
        let id = conversation_id(&uid(a), &uid(b)).unwrap();
        Conversation {
            participants: id.participants(),
            id,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    fn message_at(conv: &Conversation, sender: &str, recipient: &str, secs: i64) -> Message {
        let envelope = MessageEnvelope {
            ciphertext: vec![0u8; 21],
            nonce: vec![0u8; 24],
            sender_public_key: vec![7u8; 32],
            scheme: "x25519-sha256-xchacha20poly1305".into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        };
        Message::new(conv.id.clone(), uid(sender), uid(recipient), envelope)
    }

    #[test]
    fn test_most_recent_first() {
        let bob = conversation("alice", "bob");
        let carol = conversation("alice", "carol");
        let mut last = HashMap::new();
        last.insert(bob.id.clone(), message_at(&bob, "bob", "alice", 100));
        last.insert(carol.id.clone(), message_at(&carol, "alice", "carol", 200));

        let inbox = build_inbox(&uid("alice"), &[bob, carol], |c| last.get(&c.id).cloned());

        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].other_participant, uid("carol"));
        assert_eq!(inbox[1].other_participant, uid("bob"));
        assert_eq!(inbox[0].preview, Preview::Redacted);
        assert_eq!(inbox[0].display_name, "Unknown");
    }

    #[test]
    fn test_empty_conversations_sort_last_with_id_tiebreak() {
        let dave = conversation("alice", "dave");
        let bob = conversation("alice", "bob");
        let erin = conversation("erin", "alice");
        let erin_msg = message_at(&erin, "erin", "alice", 5);

        let inbox = build_inbox(&uid("alice"), &[dave, bob, erin.clone()], |c| {
            (c.id == erin.id).then(|| erin_msg.clone())
        });

        let order: Vec<_> = inbox.iter().map(|e| e.other_participant.as_str()).collect();
        assert_eq!(order, vec!["erin", "bob", "dave"]);
        assert!(inbox[2].last_message_at.is_none());
    }

    #[test]
    fn test_equal_timestamps_tiebreak_by_id() {
        let zoe = conversation("alice", "zoe");
        let bob = conversation("alice", "bob");
        let msgs = [
            message_at(&zoe, "zoe", "alice", 50),
            message_at(&bob, "bob", "alice", 50),
        ];

        let inbox = build_inbox(&uid("alice"), &[zoe, bob], |c| {
            msgs.iter().find(|m| m.conversation_id == c.id).cloned()
        });
        assert_eq!(inbox[0].other_participant, uid("bob"));
        assert_eq!(inbox[1].other_participant, uid("zoe"));
    }

    #[test]
    fn test_skips_foreign_conversations_without_lookup() {
        let foreign = conversation("bob", "carol");
        let mine = conversation("alice", "bob");
        let mut calls = 0;

        let inbox = build_inbox(&uid("alice"), &[foreign, mine], |_| {
            calls += 1;
            None
        });
        assert_eq!(inbox.len(), 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_metadata_and_profiles() {
        let bob = conversation("alice", "bob");
        let msg = message_at(&bob, "bob", "alice", 10);

        let inbox = build_inbox_with_profiles(
            &uid("alice"),
            &[bob],
            |_| Some(msg.clone()),
            |user| {
                Some(Profile {
                    user_id: user.clone(),
                    username: Some("bob".into()),
                    display_name: Some("Bobby".into()),
                    photo_url: Some("https://img.example/bob.png".into()),
                    published_key: None,
                    updated_at: Utc::now(),
                })
            },
        );

        let entry = &inbox[0];
        assert_eq!(entry.display_name, "Bobby");
        assert_eq!(entry.photo_url.as_deref(), Some("https://img.example/bob.png"));
        assert_eq!(entry.last_sender_id, Some(uid("bob")));
        assert_eq!(entry.last_scheme.as_deref(), Some("x25519-sha256-xchacha20poly1305"));
        assert_eq!(entry.last_sender_public_key, Some(encode_key(&[7u8; 32])));
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let bob = conversation("alice", "bob");
        let carol = conversation("alice", "carol");

        let inbox = build_inbox_with_profiles(
            &uid("alice"),
            &[bob, carol],
            |_| None,
            |user| {
                (user.as_str() == "bob").then(|| Profile {
                    user_id: user.clone(),
                    username: Some("bobcat".into()),
                    display_name: None,
                    photo_url: None,
                    published_key: None,
                    updated_at: Utc::now(),
                })
            },
        );

        assert_eq!(inbox[0].display_name, "bobcat");
        assert_eq!(inbox[1].display_name, "Unknown");
    }

    #[test]
    fn test_caller_supplied_preview() {
        let bob = conversation("alice", "bob");
        let inbox = build_inbox(&uid("alice"), &[bob], |_| None);
        let entry = inbox.into_iter().next().unwrap().with_preview("see you at 8");
        assert_eq!(entry.preview.as_str(), "see you at 8");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["preview"], "see you at 8");
    }

    #[test]
    fn test_format_timestamp_manila() {
        let ts = Utc.with_ymd_and_hms(2024, 8, 14, 15, 42, 0).unwrap();
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(format_timestamp(ts, offset), "Aug 14, 11:42 PM");
    }
}
