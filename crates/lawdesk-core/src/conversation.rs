use tracing::debug;

use crate::types::ConversationTurn;

/// Ordered, append-only chat log for one session.
///
/// Only final user prompts and assistant reports land here; retrieval data
/// never does. Created when a session starts, cleared by `reset`, dropped
/// with the session.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.append(ConversationTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.append(ConversationTurn::assistant(content));
    }

    /// Clear the log. Safe to call on an empty conversation.
    pub fn reset(&mut self) {
        debug!(cleared = self.turns.len(), "conversation reset");
        self.turns.clear();
    }

    /// Replay history in insertion order. Each call starts from the beginning.
    pub fn render(&self) -> impl Iterator<Item = &ConversationTurn> + '_ {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
