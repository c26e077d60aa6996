#![allow(dead_code)]

//! Dictation merges speech-recognition transcripts into the visitor's input
//! buffer without losing text that was typed before listening started.
//!
//! The recognizer itself is a host capability behind [`SpeechCapability`]; the
//! controller is a plain state machine driven by [`RecognitionEvent`]s.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictationError {
    #[error("Speech recognition is not supported in this environment.")]
    Unavailable,

    #[error("Speech recognition failed to start: {0}")]
    StartFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DictationPhase {
    #[default]
    Idle,
    Listening,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DictationState {
    pub phase: DictationPhase,
    /// Input buffer captured when listening started.
    pub base_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: "en-US".to_string(),
        }
    }
}

/// A host speech recognizer.
pub trait SpeechCapability: Send {
    fn is_available(&self) -> bool;

    fn start(&mut self, options: &RecognitionOptions) -> Result<(), DictationError>;

    /// Releases the recognizer. Must be safe to call when nothing is running.
    fn stop(&mut self);
}

/// Used where no recognizer exists, e.g. on the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeechCapability;

impl SpeechCapability for NoSpeechCapability {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _options: &RecognitionOptions) -> Result<(), DictationError> {
        Err(DictationError::Unavailable)
    }

    fn stop(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    pub transcript: String,
    pub is_final: bool,
}

impl TranscriptSegment {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    /// Results of the current pass; only entries from `result_index` on are new.
    Result {
        result_index: usize,
        results: Vec<TranscriptSegment>,
    },
    End,
    Error(String),
}

pub struct DictationController<C: SpeechCapability> {
    capability: C,
    state: DictationState,
}

impl<C: SpeechCapability> DictationController<C> {
    pub fn new(capability: C) -> Self {
        Self {
            capability,
            state: DictationState::default(),
        }
    }

    /// `false` means the dictation control should be disabled.
    pub fn is_enabled(&self) -> bool {
        self.capability.is_available()
    }

    pub fn state(&self) -> &DictationState {
        &self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state.phase == DictationPhase::Listening
    }

    pub fn toggle(&mut self, buffer: &str) -> Result<DictationPhase, DictationError> {
        if self.is_listening() {
            self.stop();
        } else {
            self.start(buffer)?;
        }
        Ok(self.state.phase)
    }

    pub fn start(&mut self, buffer: &str) -> Result<(), DictationError> {
        if !self.capability.is_available() {
            warn!("Speech recognition not supported in this environment");
            return Err(DictationError::Unavailable);
        }
        if self.is_listening() {
            return Ok(());
        }

        self.capability.start(&RecognitionOptions::default())?;
        self.state = DictationState {
            phase: DictationPhase::Listening,
            base_text: if buffer.is_empty() {
                String::new()
            } else {
                format!("{buffer} ")
            },
        };
        debug!("Dictation started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.capability.stop();
        self.state.phase = DictationPhase::Idle;
    }

    /// Applies one recognizer event. Returns the new input buffer when the
    /// event produced one.
    pub fn on_event(&mut self, event: RecognitionEvent) -> Option<String> {
        match event {
            RecognitionEvent::Started => {
                self.state.phase = DictationPhase::Listening;
                None
            }
            RecognitionEvent::Result {
                result_index,
                results,
            } => {
                if !self.is_listening() {
                    return None;
                }
                let (finals, interims): (Vec<_>, Vec<_>) = results
                    .iter()
                    .skip(result_index)
                    .partition(|segment| segment.is_final);

                let mut buffer = self.state.base_text.clone();
                buffer.extend(finals.iter().map(|s| s.transcript.as_str()));
                buffer.extend(interims.iter().map(|s| s.transcript.as_str()));
                Some(buffer)
            }
            RecognitionEvent::End => {
                self.stop();
                None
            }
            RecognitionEvent::Error(reason) => {
                warn!("Speech recognition error: {reason}");
                self.stop();
                None
            }
        }
    }
}
