//! Axum route handlers for the chat API.

use async_stream::stream;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::engine::ChatSnapshot;
use crate::chat::history::{ChatMessage, Role};
use crate::errors::AppError;
use crate::render::{render_markdown, RenderNode};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<RenderNode>>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        let nodes = (message.role == Role::Assistant).then(|| render_markdown(&message.content));
        Self {
            role: message.role,
            content: message.content.clone(),
            nodes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatView {
    pub messages: Vec<MessageView>,
    pub thinking: bool,
    pub loading_context: bool,
}

impl From<&ChatSnapshot> for ChatView {
    fn from(snapshot: &ChatSnapshot) -> Self {
        Self {
            messages: snapshot.messages.iter().map(MessageView::from).collect(),
            thinking: snapshot.thinking,
            loading_context: snapshot.loading_context,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/chat
pub async fn handle_get_chat(State(state): State<AppState>) -> Json<ChatView> {
    Json(ChatView::from(&state.engine.snapshot()))
}

/// POST /api/v1/chat/messages
///
/// Streams `delta` events carrying the assistant content accumulated so far,
/// then one `done` event with the final reply.
pub async fn handle_send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let turn = state.engine.begin_turn(&req.message).await?;
    let mut updates = state.engine.subscribe();

    let engine = state.engine.clone();
    let mut task = tokio::spawn(async move { engine.run_turn(turn).await });

    let events = stream! {
        let mut last_sent = String::new();
        loop {
            let step = tokio::select! {
                finished = &mut task => Step::Done(finished.unwrap_or_default()),
                changed = updates.changed() => match changed {
                    Ok(()) => pending_content(&updates.borrow_and_update())
                        .filter(|content| *content != last_sent)
                        .map_or(Step::Unchanged, Step::Delta),
                    Err(_) => Step::Closed,
                },
            };

            match step {
                Step::Delta(content) => {
                    yield Event::default().event("delta").json_data(json!({ "content": &content }));
                    last_sent = content;
                }
                Step::Unchanged => {}
                Step::Done(reply) => {
                    yield Event::default().event("done").json_data(json!({ "content": reply }));
                    break;
                }
                Step::Closed => {
                    let reply = (&mut task).await.unwrap_or_default();
                    yield Event::default().event("done").json_data(json!({ "content": reply }));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

enum Step {
    Delta(String),
    Unchanged,
    Done(String),
    /// The engine dropped its update channel; only the reply is left.
    Closed,
}

/// Content of the in-flight assistant placeholder, if a turn is open.
fn pending_content(snapshot: &ChatSnapshot) -> Option<String> {
    if !snapshot.thinking {
        return None;
    }
    snapshot
        .messages
        .last()
        .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
        .map(|m| m.content.clone())
}
