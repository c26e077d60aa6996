//! LLM Client — the single point of entry for all Gemini API calls.
//!
//! ARCHITECTURAL RULE: No other module may call the model API directly.
//! Conversations are opened through the [`ChatBackend`] trait so the chat
//! engine can be exercised without a network.
//!
//! Model: gemini-2.5-flash (hardcoded — do not make configurable to prevent drift)
use std::sync::{Arc, Mutex, MutexGuard};

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::normalizer::Failure;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for every conversation.
pub const MODEL: &str = "gemini-2.5-flash";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM client misconfigured: {0}")]
    Config(String),
}

impl From<LlmError> for Failure {
    fn from(e: LlmError) -> Self {
        match e {
            // The body is the backend's JSON error document; the normalizer unwraps it.
            LlmError::Api { status, message } => Failure::Backend {
                status: Some(status),
                message,
            },
            other => Failure::message(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One prior turn sent to the backend as history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// Everything needed to open a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationConfig {
    pub system_instruction: String,
    pub temperature: f32,
    pub history: Vec<Turn>,
}

/// One incremental piece of a streamed response. `text` may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub text: Option<String>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Lazy, single-consumption sequence of response fragments.
pub type FragmentStream = BoxStream<'static, Result<Fragment, LlmError>>;

/// Opens backend conversations. Carried in `AppState` as `Arc<dyn ChatBackend>`.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_conversation(
        &self,
        config: ConversationConfig,
    ) -> Result<Arc<dyn Conversation>, LlmError>;
}

/// Opaque handle to a running backend conversation.
pub trait Conversation: Send + Sync {
    fn send_stream(&self, message: String) -> FragmentStream;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<TurnRole>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentRequest {
    fn new(config: &ConversationSettings, turns: &[Turn]) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: config.system_instruction.clone(),
                }],
            },
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: Some(turn.role),
                    parts: vec![Part {
                        text: turn.text.clone(),
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini client
// ────────────────────────────────────────────────────────────────────────────

/// Gemini `streamGenerateContent` client with retry on open.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn open_conversation(
        &self,
        config: ConversationConfig,
    ) -> Result<Arc<dyn Conversation>, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::Config("GEMINI_API_KEY is empty".to_string()));
        }
        debug!(
            "Opening conversation with {} seed turns at temperature {}",
            config.history.len(),
            config.temperature
        );
        Ok(Arc::new(GeminiConversation {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            settings: Arc::new(ConversationSettings {
                system_instruction: config.system_instruction,
                temperature: config.temperature,
            }),
            history: ConversationHistory::new(config.history),
        }))
    }
}

struct ConversationSettings {
    system_instruction: String,
    temperature: f32,
}

/// Prior turns of one conversation. The backend is stateless, so every request
/// resends them; an exchange is recorded once its reply has streamed completely.
#[derive(Clone)]
struct ConversationHistory {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl ConversationHistory {
    fn new(seed: Vec<Turn>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(seed)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Turn>> {
        self.turns.lock().unwrap_or_else(|poisoned| {
            warn!("Conversation history lock was poisoned; recovering prior turns");
            poisoned.into_inner()
        })
    }

    /// Request carrying every prior turn followed by `message`.
    fn request_for(&self, settings: &ConversationSettings, message: &str) -> GenerateContentRequest {
        let mut turns = self.lock().clone();
        turns.push(Turn::user(message));
        GenerateContentRequest::new(settings, &turns)
    }

    fn record(&self, message: String, reply: String) {
        let mut turns = self.lock();
        turns.push(Turn::user(message));
        turns.push(Turn::model(reply));
    }
}

struct GeminiConversation {
    client: Client,
    api_key: String,
    settings: Arc<ConversationSettings>,
    history: ConversationHistory,
}

impl Conversation for GeminiConversation {
    fn send_stream(&self, message: String) -> FragmentStream {
        let request = self.history.request_for(&self.settings, &message);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let fragments = stream! {
            match open_stream(&client, &api_key, &request).await {
                Ok(response) => {
                    let mut fragments = Box::pin(sse_fragments(response.bytes_stream()));
                    while let Some(item) = fragments.next().await {
                        yield item;
                    }
                }
                Err(e) => yield Err(e),
            }
        };

        record_on_completion(fragments, self.history.clone(), message)
    }
}

/// Passes fragments through and records the exchange once the stream ends
/// cleanly. A failed turn is not added to the history.
fn record_on_completion<S>(fragments: S, history: ConversationHistory, message: String) -> FragmentStream
where
    S: Stream<Item = Result<Fragment, LlmError>> + Send + 'static,
{
    Box::pin(stream! {
        let mut fragments = Box::pin(fragments);
        let mut reply = String::new();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    if let Some(text) = &fragment.text {
                        reply.push_str(text);
                    }
                    yield Ok(fragment);
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        history.record(message, reply);
    })
}

/// Splits a response body into SSE lines and parses each `data:` line.
/// Chunks may end mid-line; a final line without a trailing newline still counts.
fn sse_fragments<S, E>(body: S) -> impl Stream<Item = Result<Fragment, LlmError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    LlmError: From<E>,
{
    stream! {
        let mut body = Box::pin(body);
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::from(e));
                    return;
                }
            };
            pending.extend_from_slice(&chunk);

            while let Some(line_end) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=line_end).collect();
                if let Some(item) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        return;
                    }
                }
            }
        }

        if let Some(item) = parse_sse_line(&String::from_utf8_lossy(&pending)) {
            yield item;
        }
    }
}

/// Opens the SSE stream. Retries on 429 (rate limit), 5xx and transport
/// errors with exponential backoff; other statuses fail immediately.
async fn open_stream(
    client: &Client,
    api_key: &str,
    request: &GenerateContentRequest,
) -> Result<reqwest::Response, LlmError> {
    let url = format!("{GEMINI_API_BASE}/{MODEL}:streamGenerateContent?alt=sse");
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s
            let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "Gemini stream attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(LlmError::Http(e));
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API returned {}: {}", status, body);
            last_error = Some(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        return Ok(response);
    }

    Err(last_error.unwrap_or(LlmError::RateLimited {
        retries: MAX_RETRIES,
    }))
}

/// Parses one SSE line. `None` for blank lines, comments and non-data fields.
fn parse_sse_line(line: &str) -> Option<Result<Fragment, LlmError>> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }

    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(LlmError::Parse(e))),
    };

    if let Some(error) = chunk.error {
        let status = error
            .get("code")
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        return Some(Err(LlmError::Api {
            status,
            message: payload.to_string(),
        }));
    }

    let text: String = chunk
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    Some(Ok(Fragment {
        text: (!text.is_empty()).then_some(text),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_text_chunk() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"},{"text":", world"}],"role":"model"}}]}"#;
        let fragment = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(fragment, Fragment::text("Hello, world"));
    }

    #[test]
    fn test_parse_sse_chunk_without_text() {
        let line = r#"data: {"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":12}}"#;
        let fragment = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(fragment.text, None);
    }

    #[test]
    fn test_parse_sse_ignores_non_data_lines() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: message").is_none());
    }

    #[test]
    fn test_parse_sse_error_chunk_keeps_payload() {
        let line = r#"data: {"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let err = parse_sse_line(line).unwrap().unwrap_err();
        let LlmError::Api { status, message } = err else {
            panic!("expected an API error");
        };
        assert_eq!(status, 503);
        assert!(message.contains("The model is overloaded."));
    }

    #[test]
    fn test_api_error_normalizes_to_inner_message() {
        let failure = Failure::from(LlmError::Api {
            status: 400,
            message: r#"{"error":{"code":400,"message":"API key not valid."}}"#.to_string(),
        });
        assert_eq!(failure.normalize(), "API key not valid.");
    }

    #[test]
    fn test_request_serializes_roles_and_temperature() {
        let settings = ConversationSettings {
            system_instruction: "Be brief".to_string(),
            temperature: 0.3,
        };
        let request =
            GenerateContentRequest::new(&settings, &[Turn::user("hi"), Turn::model("hello")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "Be brief");
        assert!(json["system_instruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert!((json["generation_config"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    fn chunk(text: &str) -> Result<Bytes, LlmError> {
        Ok(Bytes::from(text.to_string()))
    }

    fn text_line(text: &str) -> String {
        format!(r#"data: {{"candidates":[{{"content":{{"parts":[{{"text":"{text}"}}]}}}}]}}"#)
    }

    async fn texts<S>(stream: S) -> Vec<Result<Option<String>, String>>
    where
        S: Stream<Item = Result<Fragment, LlmError>>,
    {
        stream
            .map(|item| item.map(|f| f.text).map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_sse_line_split_across_chunks() {
        let first = format!("{}\n\n", text_line("Hel"));
        let (head, tail) = first.split_at(25);
        let body = futures::stream::iter(vec![chunk(head), chunk(tail), chunk(&text_line("lo"))]);

        let items = texts(sse_fragments(body)).await;

        // The last line has no trailing newline and is still delivered.
        assert_eq!(
            items,
            vec![Ok(Some("Hel".to_string())), Ok(Some("lo".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_sse_stops_after_error_chunk() {
        let body = futures::stream::iter(vec![
            chunk(&format!("{}\n", text_line("partial"))),
            chunk("data: {\"error\":{\"code\":429,\"message\":\"Quota\"}}\n"),
            chunk(&format!("{}\n", text_line("never"))),
        ]);

        let items = texts(sse_fragments(body)).await;

        assert_eq!(items.len(), 2);
        assert!(items[1].as_ref().unwrap_err().contains("status 429"));
    }

    fn settings() -> ConversationSettings {
        ConversationSettings {
            system_instruction: "Be brief".to_string(),
            temperature: 0.3,
        }
    }

    fn contents(request: &GenerateContentRequest) -> Vec<(Option<TurnRole>, String)> {
        request
            .contents
            .iter()
            .map(|c| (c.role, c.parts[0].text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_completed_turn_is_resent_as_history() {
        let history = ConversationHistory::new(vec![Turn::user("seed"), Turn::model("ack")]);
        let first = history.request_for(&settings(), "q1");
        assert_eq!(first.contents.len(), 3);

        let reply = futures::stream::iter(vec![
            Ok(Fragment::text("a")),
            Ok(Fragment::default()),
            Ok(Fragment::text("1")),
        ]);
        let streamed = texts(record_on_completion(reply, history.clone(), "q1".to_string())).await;
        assert_eq!(streamed.len(), 3);

        let second = history.request_for(&settings(), "q2");
        assert_eq!(
            contents(&second),
            vec![
                (Some(TurnRole::User), "seed".to_string()),
                (Some(TurnRole::Model), "ack".to_string()),
                (Some(TurnRole::User), "q1".to_string()),
                (Some(TurnRole::Model), "a1".to_string()),
                (Some(TurnRole::User), "q2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_turn_is_not_recorded() {
        let history = ConversationHistory::new(vec![Turn::user("seed"), Turn::model("ack")]);
        let reply = futures::stream::iter(vec![
            Ok(Fragment::text("half")),
            Err(LlmError::RateLimited { retries: 3 }),
        ]);
        texts(record_on_completion(reply, history.clone(), "q1".to_string())).await;

        assert_eq!(history.request_for(&settings(), "q2").contents.len(), 3);
    }

    #[test]
    fn test_poisoned_history_keeps_prior_turns() {
        let history = ConversationHistory::new(vec![Turn::user("seed")]);
        let shared = history.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.turns.lock().unwrap();
            panic!("poison the history lock");
        })
        .join();

        assert!(history.turns.is_poisoned());
        history.record("q".to_string(), "a".to_string());
        assert_eq!(history.request_for(&settings(), "next").contents.len(), 4);
    }

    #[tokio::test]
    async fn test_open_conversation_requires_api_key() {
        let client = GeminiClient::new(String::new());
        let config = ConversationConfig {
            system_instruction: String::new(),
            temperature: 0.3,
            history: vec![],
        };
        assert!(matches!(
            client.open_conversation(config).await,
            Err(LlmError::Config(_))
        ));
    }
}
