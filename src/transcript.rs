//! Conversation transcript with an explicit streaming accumulator.
//!
//! While a response streams in, deltas are applied to the in-progress
//! assistant message by id: each delta swaps an updated copy into the list
//! instead of mutating through a held reference, so a reader can never
//! observe a half-applied message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An ordered conversation transcript.
///
/// Append-only within a session; `clear` wipes it wholesale. Completed
/// messages are never edited — only the in-progress assistant message
/// grows, via [`Transcript::apply_delta`].
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a completed message.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Start an empty assistant message to accumulate streamed deltas into.
    /// Returns its id for subsequent [`Transcript::apply_delta`] calls.
    pub fn begin_assistant(&mut self) -> Uuid {
        let message = ChatMessage::new(Role::Assistant, "");
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Append a delta to the message with the given id. Returns false if no
    /// such message exists (e.g. the transcript was cleared mid-stream).
    pub fn apply_delta(&mut self, id: Uuid, delta: &str) -> bool {
        let Some(pos) = self.messages.iter().position(|m| m.id == id) else {
            return false;
        };
        let mut updated = self.messages[pos].clone();
        updated.content.push_str(delta);
        self.messages[pos] = updated;
        true
    }

    /// Clear the whole conversation.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_accumulate_in_order() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::new(Role::User, "hi"));
        let id = transcript.begin_assistant();

        assert!(transcript.apply_delta(id, "Hel"));
        assert!(transcript.apply_delta(id, "lo"));
        assert!(transcript.apply_delta(id, ", world"));

        let last = transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Hello, world");
    }

    #[test]
    fn delta_after_clear_is_rejected() {
        let mut transcript = Transcript::new();
        let id = transcript.begin_assistant();
        transcript.clear();

        assert!(!transcript.apply_delta(id, "late"));
        assert!(transcript.is_empty());
    }

    #[test]
    fn deltas_only_touch_the_target_message() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::new(Role::User, "question"));
        transcript.push(ChatMessage::new(Role::Assistant, "earlier answer"));
        let id = transcript.begin_assistant();
        transcript.apply_delta(id, "new answer");

        assert_eq!(transcript.messages()[1].content, "earlier answer");
        assert_eq!(transcript.messages()[2].content, "new answer");
    }
}
