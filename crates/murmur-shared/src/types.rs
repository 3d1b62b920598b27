use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::addressing::ConversationId;
use crate::constants::{CONVERSATION_ID_DELIMITER, MAX_IDENTITY_LEN};
use crate::error::IdentityError;
use crate::protocol::MessageEnvelope;

/// Opaque user identity assigned by the auth collaborator.
/// Never empty and never contains the conversation-id delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(pub(crate) String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Result<Self, IdentityError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdentityError::Empty);
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong {
                len: raw.len(),
                max: MAX_IDENTITY_LEN,
            });
        }
        if raw.contains(CONVERSATION_ID_DELIMITER) {
            return Err(IdentityError::ContainsDelimiter);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A two-party conversation. Participants are stored in id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: (UserId, UserId),
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn contains(&self, user: &UserId) -> bool {
        self.participants.0 == *user || self.participants.1 == *user
    }

    /// The participant that is not `me`, or `None` if `me` is not a member.
    pub fn other_participant(&self, me: &UserId) -> Option<&UserId> {
        if self.participants.0 == *me {
            Some(&self.participants.1)
        } else if self.participants.1 == *me {
            Some(&self.participants.0)
        } else {
            None
        }
    }
}

/// A persisted message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub envelope: MessageEnvelope,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Wrap a server-stamped envelope. `created_at` mirrors the envelope's.
    pub fn new(
        conversation_id: ConversationId,
        sender_id: UserId,
        recipient_id: UserId,
        envelope: MessageEnvelope,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            recipient_id,
            created_at: envelope.created_at,
            envelope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrder {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

/// A user's public key as published to the key directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKey {
    pub public_key: String,
    pub format: String,
}

/// What the profile collaborator knows about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    /// Searchable handle, stored normalized by [`normalize_username`].
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub published_key: Option<PublishedKey>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Name to show for this user: the display name, else the username.
    /// Blank values count as missing.
    pub fn shown_name(&self) -> Option<&str> {
        [&self.display_name, &self.username]
            .into_iter()
            .filter_map(|name| name.as_deref())
            .map(str::trim)
            .find(|name| !name.is_empty())
    }
}

/// Canonical form of a username for storage and lookup.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}
