//! Assistant engine — owns the current [`ChatSession`], the transcript and the
//! `thinking` flag, and publishes every state change to subscribers.
//!
//! The transcript tail and the flag are only touched under one mutex; readers
//! never lock, they watch [`ChatSnapshot`]s.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::chat::history::{ChatHistory, ChatMessage, StreamReducer};
use crate::chat::prompts::CONTEXT_NOT_LOADED_REPLY;
use crate::chat::session::ChatSession;
use crate::context::assembler::{ContextAssembler, ContextFetchError, ContextOutcome};
use crate::context::prompts::{
    error_notice, GREETING_NOTICE, LOADED_NOTICE, LOADING_NOTICE, NO_RESUME_NOTICE,
};
use crate::llm_client::ChatBackend;
use crate::normalizer::Failure;

/// What subscribers render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub thinking: bool,
    pub loading_context: bool,
}

/// Outcome of a context refresh, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContextStatus {
    Loaded { message: String, session_ready: bool },
    NoResume { message: String },
    Error { message: String },
}

impl ContextStatus {
    pub fn message(&self) -> &str {
        match self {
            ContextStatus::Loaded { message, .. }
            | ContextStatus::NoResume { message }
            | ContextStatus::Error { message } => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnRejected {
    #[error("Message must not be empty.")]
    Empty,

    #[error("The portfolio context is still loading. Please wait.")]
    LoadingContext,

    #[error("A response is already being generated. Please wait for it to finish.")]
    Busy,
}

/// A submitted turn whose placeholder is already in the transcript.
pub struct PendingTurn {
    generation: u64,
    user_text: String,
    session: Option<ChatSession>,
}

struct EngineState {
    history: ChatHistory,
    session: Option<ChatSession>,
    thinking: bool,
    loading: bool,
    /// Bumped on every transcript reset so stale turns cannot write into it.
    generation: u64,
}

impl EngineState {
    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.history.messages().to_vec(),
            thinking: self.thinking,
            loading_context: self.loading,
        }
    }

    fn reset_transcript(&mut self, notice: &str) {
        self.history = ChatHistory::with_notice(notice);
        self.generation += 1;
    }
}

pub struct AssistantEngine {
    backend: Arc<dyn ChatBackend>,
    state: Mutex<EngineState>,
    updates: watch::Sender<ChatSnapshot>,
}

impl AssistantEngine {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let state = EngineState {
            history: ChatHistory::with_notice(GREETING_NOTICE),
            session: None,
            thinking: false,
            loading: false,
            generation: 0,
        };
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            backend,
            state: Mutex::new(state),
            updates,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.updates.borrow().clone()
    }

    fn publish(&self, state: &EngineState) {
        self.updates.send_replace(state.snapshot());
    }

    /// Runs the assembler to completion, then rebuilds the session from its result.
    pub async fn refresh_context(&self, assembler: &ContextAssembler) -> ContextStatus {
        {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.reset_transcript(LOADING_NOTICE);
            self.publish(&state);
        }

        let result = assembler.refresh().await;
        self.install_context(result).await
    }

    /// Applies a finished refresh: replaces the session and resets the
    /// transcript to a single notice describing the outcome.
    ///
    /// A failed refresh keeps the previous session, if any.
    pub async fn install_context(
        &self,
        result: Result<ContextOutcome, ContextFetchError>,
    ) -> ContextStatus {
        let (status, replacement) = match result {
            Ok(ContextOutcome::Loaded(bundle)) if bundle.has_resume() => {
                match ChatSession::create(self.backend.as_ref(), bundle).await {
                    Ok(session) => (
                        ContextStatus::Loaded {
                            message: LOADED_NOTICE.to_string(),
                            session_ready: true,
                        },
                        Some(Some(session)),
                    ),
                    Err(e) => {
                        warn!("{e}");
                        (
                            ContextStatus::Error {
                                message: error_notice(&e.to_string()),
                            },
                            None,
                        )
                    }
                }
            }
            Ok(ContextOutcome::Loaded(_)) => {
                info!("Context loaded without resume text; chat session not created");
                (
                    ContextStatus::Loaded {
                        message: LOADED_NOTICE.to_string(),
                        session_ready: false,
                    },
                    Some(None),
                )
            }
            Ok(ContextOutcome::NoResumeYet) => (
                ContextStatus::NoResume {
                    message: NO_RESUME_NOTICE.to_string(),
                },
                Some(None),
            ),
            Err(e) => (
                ContextStatus::Error {
                    message: error_notice(&e.message),
                },
                None,
            ),
        };

        let mut state = self.state.lock().await;
        if let Some(session) = replacement {
            state.session = session;
        }
        state.loading = false;
        state.reset_transcript(status.message());
        self.publish(&state);
        status
    }

    /// Opens a turn: appends the visitor message and an empty placeholder.
    ///
    /// Rejected while another turn is in flight or the context is loading.
    pub async fn begin_turn(&self, user_text: &str) -> Result<PendingTurn, TurnRejected> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(TurnRejected::Empty);
        }

        let mut state = self.state.lock().await;
        if state.loading {
            return Err(TurnRejected::LoadingContext);
        }
        if state.thinking {
            return Err(TurnRejected::Busy);
        }

        state.thinking = true;
        state.history.begin_turn(text);
        self.publish(&state);

        Ok(PendingTurn {
            generation: state.generation,
            user_text: text.to_string(),
            session: state.session.clone(),
        })
    }

    /// Streams the reply into the placeholder and closes the turn.
    /// Returns the final assistant content.
    pub async fn run_turn(&self, turn: PendingTurn) -> String {
        let PendingTurn {
            generation,
            user_text,
            session,
        } = turn;
        let mut reducer = StreamReducer::new();

        let Some(session) = session else {
            return self
                .close_turn(generation, move |history| {
                    reducer.finish_with(history, CONTEXT_NOT_LOADED_REPLY)
                })
                .await;
        };

        let mut fragments = session.send(&user_text);
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    let mut state = self.state.lock().await;
                    if state.generation == generation
                        && reducer.apply(&mut state.history, &fragment)
                    {
                        self.publish(&state);
                    }
                }
                Err(e) => {
                    let failure = Failure::from(e);
                    warn!("Chat stream failed: {failure}");
                    let reason = failure.normalize();
                    return self
                        .close_turn(generation, move |history| reducer.fail(history, &reason))
                        .await;
                }
            }
        }

        debug!("Chat turn completed ({} characters)", reducer.content().len());
        self.close_turn(generation, move |history| reducer.finish(history))
            .await
    }

    /// Submits one message and waits for the reply.
    pub async fn submit(&self, user_text: &str) -> Result<String, TurnRejected> {
        let turn = self.begin_turn(user_text).await?;
        Ok(self.run_turn(turn).await)
    }

    async fn close_turn(
        &self,
        generation: u64,
        close: impl FnOnce(&mut ChatHistory) -> String,
    ) -> String {
        let mut state = self.state.lock().await;
        state.thinking = false;
        let reply = if state.generation == generation {
            close(&mut state.history)
        } else {
            String::new()
        };
        self.publish(&state);
        reply
    }
}
