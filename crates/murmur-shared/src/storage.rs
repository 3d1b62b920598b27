//! Interfaces the core consumes from its storage and profile collaborators.
//!
//! Implementations must make appends to one conversation linearizable and
//! must either complete a call or fail it; no partial writes.

use crate::addressing::ConversationId;
use crate::protocol::MessageEnvelope;
use crate::types::{Conversation, Message, MessageOrder, Profile, PublishedKey, UserId};

pub trait ConversationStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Look up the conversation between `a` and `b`, creating it on first use.
    fn get_or_create_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Conversation, Self::Error>;

    fn append_message(&self, id: &ConversationId, message: &Message) -> Result<(), Self::Error>;

    fn stream_messages(
        &self,
        id: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<Message>, Self::Error>;

    /// Every conversation `user` takes part in.
    fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>, Self::Error>;

    fn last_message(&self, id: &ConversationId) -> Result<Option<Message>, Self::Error>;
}

pub trait ProfileDirectory {
    type Error: std::error::Error + Send + Sync + 'static;

    fn profile(&self, user: &UserId) -> Result<Option<Profile>, Self::Error>;

    fn public_key(&self, user: &UserId) -> Result<Option<PublishedKey>, Self::Error> {
        Ok(self.profile(user)?.and_then(|p| p.published_key))
    }
}

/// Append a server-stamped envelope from `sender` to `recipient`, creating
/// the conversation lazily.
pub fn append_envelope<S: ConversationStore>(
    store: &S,
    sender: &UserId,
    recipient: &UserId,
    envelope: MessageEnvelope,
) -> Result<Message, S::Error> {
    let conversation = store.get_or_create_conversation(sender, recipient)?;
    let message = Message::new(
        conversation.id.clone(),
        sender.clone(),
        recipient.clone(),
        envelope,
    );
    store.append_message(&conversation.id, &message)?;

    tracing::debug!(
        conversation = %conversation.id,
        message_id = %message.id,
        "appended message"
    );
    Ok(message)
}
