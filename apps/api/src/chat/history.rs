//! Chat transcript and the stream reducer that fills the pending assistant turn.

use serde::{Deserialize, Serialize};

use crate::chat::prompts::STREAM_ERROR_PREFIX;
use crate::llm_client::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered transcript. Insertion order is conversation order; only the tail
/// placeholder may change, and only while a turn is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
    turn_open: bool,
}

impl ChatHistory {
    /// A transcript holding a single informational assistant message.
    pub fn with_notice(notice: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(notice)],
            turn_open: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_turn_open(&self) -> bool {
        self.turn_open
    }

    /// Appends the visitor's message and an empty assistant placeholder.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) {
        self.messages.push(ChatMessage::user(user_text));
        self.messages.push(ChatMessage::assistant(String::new()));
        self.turn_open = true;
    }

    /// Overwrites the open placeholder. Ignored once the turn is closed.
    fn set_placeholder(&mut self, content: &str) {
        if !self.turn_open {
            return;
        }
        if let Some(tail) = self.messages.last_mut() {
            tail.content.clear();
            tail.content.push_str(content);
        }
    }

    fn close_turn(&mut self) {
        self.turn_open = false;
    }
}

/// Folds a fragment sequence into the pending assistant message.
///
/// Content only grows during a turn: every non-empty fragment is appended to
/// the running buffer, which then replaces the placeholder.
#[derive(Debug, Default)]
pub struct StreamReducer {
    buffer: String,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the fragment changed the placeholder.
    pub fn apply(&mut self, history: &mut ChatHistory, fragment: &Fragment) -> bool {
        match fragment.text.as_deref() {
            Some(text) if !text.is_empty() => {
                self.buffer.push_str(text);
                history.set_placeholder(&self.buffer);
                true
            }
            _ => false,
        }
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Closes the turn; the placeholder keeps the accumulated content.
    pub fn finish(self, history: &mut ChatHistory) -> String {
        history.set_placeholder(&self.buffer);
        history.close_turn();
        self.buffer
    }

    /// Closes the turn with a fixed reply instead of streamed content.
    pub fn finish_with(self, history: &mut ChatHistory, reply: &str) -> String {
        history.set_placeholder(reply);
        history.close_turn();
        reply.to_string()
    }

    /// Rewrites the placeholder as a visible error turn.
    pub fn fail(self, history: &mut ChatHistory, reason: &str) -> String {
        let reply = format!("{STREAM_ERROR_PREFIX} {reason}");
        self.finish_with(history, &reply)
    }
}
