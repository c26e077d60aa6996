use std::sync::Arc;

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::info;

use crate::chat::prompts::{ASSISTANT_SYSTEM, CONTEXT_ACKNOWLEDGEMENT, CONTEXT_SEED_PROMPT};
use crate::context::bundle::ContextBundle;
use crate::llm_client::{ChatBackend, Conversation, ConversationConfig, FragmentStream, Turn};
use crate::normalizer::Failure;

/// Low temperature favours factual, grounded answers.
pub const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Error)]
#[error("Error initializing AI session: {0}")]
pub struct ChatInitError(pub String);

/// A dialogue grounded in one [`ContextBundle`].
///
/// The bundle is held by value: changing context means building a new session.
#[derive(Clone)]
pub struct ChatSession {
    bundle: ContextBundle,
    conversation: Arc<dyn Conversation>,
}

impl ChatSession {
    pub async fn create(
        backend: &dyn ChatBackend,
        bundle: ContextBundle,
    ) -> Result<Self, ChatInitError> {
        let conversation = backend
            .open_conversation(seed_config(&bundle))
            .await
            .map_err(|e| ChatInitError(Failure::from(e).normalize()))?;

        info!(
            "Chat session created ({} resume characters)",
            bundle.resume_text().chars().count()
        );
        Ok(Self {
            bundle,
            conversation,
        })
    }

    pub fn bundle(&self) -> &ContextBundle {
        &self.bundle
    }

    /// Sends a visitor question stamped with today's local date.
    pub fn send(&self, user_text: &str) -> FragmentStream {
        self.send_on(user_text, Local::now().date_naive())
    }

    pub fn send_on(&self, user_text: &str, today: NaiveDate) -> FragmentStream {
        self.conversation.send_stream(stamp_with_date(user_text, today))
    }
}

/// System instruction, the serialized bundle as a user turn, and the canned
/// acknowledgement as a model turn.
pub fn seed_config(bundle: &ContextBundle) -> ConversationConfig {
    ConversationConfig {
        system_instruction: ASSISTANT_SYSTEM.to_string(),
        temperature: TEMPERATURE,
        history: vec![
            Turn::user(CONTEXT_SEED_PROMPT.replace("{context}", &bundle.to_preamble())),
            Turn::model(CONTEXT_ACKNOWLEDGEMENT),
        ],
    }
}

/// Lets the model reason about relative dates (ages, durations).
pub fn stamp_with_date(user_text: &str, today: NaiveDate) -> String {
    format!("(Today's date is {})\n\n{user_text}", today.format("%Y-%m-%d"))
}
