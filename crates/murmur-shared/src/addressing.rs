//! Deterministic conversation addressing.
//!
//! A conversation id is the two participant identities sorted byte-wise and
//! joined with [`CONVERSATION_ID_DELIMITER`]. The delimiter can never occur
//! inside a [`UserId`], so distinct unordered pairs never collide.

use serde::{Deserialize, Serialize};

use crate::constants::CONVERSATION_ID_DELIMITER;
use crate::error::IdentityError;
use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

/// Order-independent id for the conversation between `a` and `b`.
pub fn conversation_id(a: &UserId, b: &UserId) -> Result<ConversationId, IdentityError> {
    if a == b {
        return Err(IdentityError::SelfConversation);
    }
    let (lo, hi) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
    Ok(ConversationId(format!(
        "{}{}{}",
        lo.as_str(),
        CONVERSATION_ID_DELIMITER,
        hi.as_str()
    )))
}

impl ConversationId {
    /// Parse a stored id, re-checking both halves and their order.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let (lo, hi) = raw
            .split_once(CONVERSATION_ID_DELIMITER)
            .ok_or(IdentityError::MalformedConversationId)?;
        let lo = UserId::new(lo)?;
        let hi = UserId::new(hi)?;
        let id = conversation_id(&lo, &hi)?;
        if id.0 != raw {
            return Err(IdentityError::MalformedConversationId);
        }
        Ok(id)
    }

    /// Both participants, in id order.
    pub fn participants(&self) -> (UserId, UserId) {
        let (lo, hi) = self
            .0
            .split_once(CONVERSATION_ID_DELIMITER)
            .unwrap_or((self.0.as_str(), ""));
        (UserId(lo.to_owned()), UserId(hi.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConversationId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConversationId> for String {
    fn from(value: ConversationId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
