//! Failure normalization: the single place that decides what a visitor reads
//! when the store, the storage bucket, or the model backend fails.
//!
//! Failures are captured as a tagged [`Failure`] where they are caught, so
//! callers never need to sniff the shape of an error at display time.

use serde_json::Value;
use thiserror::Error;

use crate::context::extract::ExtractError;

/// Shown whenever a failure carries nothing a visitor could act on.
pub const GENERIC_FAILURE_MESSAGE: &str = "Could not load portfolio context. \
This often happens when not logged in while trying to access a private resume file. \
Please try logging in as an administrator.";

/// A failure as it arrived from an external layer.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// An error value that exposes its own message.
    #[error("{message}")]
    Error { message: String },

    /// A model-backend failure. `message` is often a JSON document of the
    /// form `{"error": {"message": "..."}}`.
    #[error("backend error (status {status:?}): {message}")]
    Backend { status: Option<u16>, message: String },

    /// A bare string.
    #[error("{0}")]
    Text(String),

    /// Anything else, kept only for logging.
    #[error("unstructured failure: {0}")]
    Opaque(Value),
}

impl Failure {
    pub fn message(message: impl Into<String>) -> Self {
        Failure::Error {
            message: message.into(),
        }
    }

    /// The user-facing message for this failure.
    pub fn normalize(&self) -> String {
        normalize_failure(self)
    }
}

impl From<sqlx::Error> for Failure {
    fn from(e: sqlx::Error) -> Self {
        Failure::message(e.to_string())
    }
}

impl From<ExtractError> for Failure {
    fn from(e: ExtractError) -> Self {
        Failure::message(e.to_string())
    }
}

/// Resolves a failure to one non-empty, human-readable string.
///
/// Order: direct message, then the innermost `error.message` of a backend
/// payload, then a bare string. Anything unusable falls back to
/// [`GENERIC_FAILURE_MESSAGE`].
pub fn normalize_failure(failure: &Failure) -> String {
    let candidate = match failure {
        Failure::Error { message } => message.trim().to_string(),
        Failure::Backend { message, .. } => backend_message(message),
        Failure::Text(text) => text.trim().to_string(),
        Failure::Opaque(value) => opaque_message(value),
    };

    if is_unhelpful(&candidate) {
        GENERIC_FAILURE_MESSAGE.to_string()
    } else {
        candidate
    }
}

/// Prefers the nested `error.message` of a JSON-encoded backend message.
/// A message that is not JSON is returned as-is.
fn backend_message(message: &str) -> String {
    match serde_json::from_str::<Value>(message) {
        Ok(parsed) => parsed
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|inner| !inner.is_empty())
            .map(String::from)
            .unwrap_or_else(|| message.trim().to_string()),
        Err(_) => message.trim().to_string(),
    }
}

fn opaque_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => {
            if let Some(message) = map.get("message").and_then(Value::as_str) {
                if !message.trim().is_empty() {
                    return message.trim().to_string();
                }
            }
            map.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(backend_message)
                .unwrap_or_default()
        }
        _ => String::new(),
    }
}

/// True for messages a visitor should never see: empty text, object dumps.
fn is_unhelpful(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.is_empty()
        || trimmed.contains("{}")
        || trimmed.to_lowercase().contains("object object")
    {
        return true;
    }
    matches!(
        serde_json::from_str::<Value>(trimmed),
        Ok(Value::Object(_)) | Ok(Value::Array(_))
    )
}
