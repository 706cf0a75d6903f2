//! Ordered message history for one chat or completion.
//!
//! The system prompt is held apart from the other turns so it is always sent
//! first and can never be duplicated. Turns are only ever appended; the chat
//! commands may drop trailing turns but never edit one in place.

use crate::api::{ChatMessage, ChatToolCall};
use crate::core::message::{Role, Turn};
use crate::core::rethink::Rewrite;

#[derive(Clone, Default)]
pub struct ConversationState {
    system: Option<String>,
    turns: Vec<Turn>,
    baseline: usize,
    user_rewrite: Option<Rewrite>,
    assistant_rewrite: Option<Rewrite>,
}

impl std::fmt::Debug for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationState")
            .field("system", &self.system)
            .field("turns", &self.turns)
            .field("baseline", &self.baseline)
            .finish_non_exhaustive()
    }
}

impl ConversationState {
    pub fn new(system: Option<String>) -> Self {
        Self {
            system: system.filter(|prompt| !prompt.is_empty()),
            ..Default::default()
        }
    }

    /// Rewrite applied to every user prompt as it is appended.
    pub fn with_user_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.user_rewrite = Some(rewrite);
        self
    }

    /// Rewrite applied to assistant text before it is committed.
    pub fn with_assistant_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.assistant_rewrite = Some(rewrite);
        self
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn append_user(&mut self, text: &str) {
        let content = match &self.user_rewrite {
            Some(rewrite) => rewrite(text),
            None => text.to_string(),
        };
        let mut turn = Turn::new(Role::User, content);
        turn.typed = Some(text.to_string());
        self.turns.push(turn);
    }

    /// Commits a finished response. Only visible text belongs here; thought
    /// text never enters history.
    pub fn append_assistant(&mut self, text: &str) {
        let content = match &self.assistant_rewrite {
            Some(rewrite) => rewrite(text),
            None => text.to_string(),
        };
        self.turns.push(Turn::new(Role::Assistant, content));
    }

    pub fn append_tool_request(&mut self, text: &str, calls: Vec<ChatToolCall>) {
        let mut turn = Turn::new(Role::Assistant, text);
        turn.tool_calls = Some(calls);
        self.turns.push(turn);
    }

    pub fn append_tool_result(&mut self, call_id: &str, content: impl Into<String>) {
        let mut turn = Turn::new(Role::Tool, content);
        turn.tool_call_id = Some(call_id.to_string());
        self.turns.push(turn);
    }

    /// Marks the current turns as the starting point restored by [`reset`].
    ///
    /// [`reset`]: ConversationState::reset
    pub fn mark_baseline(&mut self) {
        self.baseline = self.turns.len();
    }

    pub fn reset(&mut self) {
        self.turns.truncate(self.baseline);
    }

    /// Drops the most recent user turn and everything after it, returning
    /// what the user originally typed. Turns before the baseline are kept.
    pub fn undo_exchange(&mut self) -> Option<String> {
        let index = self
            .turns
            .iter()
            .rposition(|turn| turn.role == Role::User)
            .filter(|&index| index >= self.baseline)?;
        let removed = self.turns.drain(index..).next()?;
        Some(removed.typed.unwrap_or(removed.content))
    }

    /// True when the last turn still needs a model response.
    pub fn awaiting_response(&self) -> bool {
        matches!(
            self.turns.last().map(|turn| turn.role),
            Some(Role::User | Role::Tool)
        )
    }

    /// System turn first if present, then history in order.
    pub fn api_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::new(Role::System.as_str(), system.clone()));
        }
        messages.extend(self.turns.iter().map(Turn::to_api));
        messages
    }

    /// The system turn (if any) followed by history, as stored on disk.
    pub fn transcript(&self) -> Vec<Turn> {
        let mut transcript = Vec::with_capacity(self.turns.len() + 1);
        if let Some(system) = &self.system {
            transcript.push(Turn::new(Role::System, system.clone()));
        }
        transcript.extend(self.turns.iter().cloned());
        transcript
    }
}
