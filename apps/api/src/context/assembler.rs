//! Context Assembler — compiles the grounding [`ContextBundle`] from the active
//! resume and the profile record.
//!
//! Flow: latest resume → download → extract text → profile (best effort) → bundle.
//! Each step runs sequentially; a bundle is only produced once every step has
//! completed, never partially.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::context::bundle::ContextBundle;
use crate::context::extract::{DocumentExtractor, DocumentKind};
use crate::context::prompts::EMPTY_DOWNLOAD_MESSAGE;
use crate::normalizer::Failure;
use crate::storage::PortfolioStore;

/// Result of a successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextOutcome {
    Loaded(ContextBundle),
    /// Nothing uploaded yet. Informational, not an error.
    NoResumeYet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    Query,
    Download,
    Extract,
}

/// A refresh failure. `message` has already been normalized for display.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ContextFetchError {
    pub stage: FetchStage,
    pub message: String,
}

impl ContextFetchError {
    fn from_failure(stage: FetchStage, failure: &Failure) -> Self {
        error!("Context fetch failed during {stage:?}: {failure}");
        Self {
            stage,
            message: failure.normalize(),
        }
    }
}

pub struct ContextAssembler {
    store: Arc<dyn PortfolioStore>,
    extractor: DocumentExtractor,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn PortfolioStore>) -> Self {
        Self {
            store,
            extractor: DocumentExtractor,
        }
    }

    pub async fn refresh(&self) -> Result<ContextOutcome, ContextFetchError> {
        // Step 1: active resume record
        let resume = self
            .store
            .latest_resume()
            .await
            .map_err(|f| ContextFetchError::from_failure(FetchStage::Query, &f))?;

        let Some(path) = resume
            .and_then(|r| r.file_url)
            .filter(|url| !url.trim().is_empty())
        else {
            info!("No resume uploaded yet");
            return Ok(ContextOutcome::NoResumeYet);
        };

        // Step 2: download from the private bucket
        let content = self
            .store
            .download_resume(&path)
            .await
            .map_err(|f| ContextFetchError::from_failure(FetchStage::Download, &f))?;
        if content.is_empty() {
            return Err(ContextFetchError::from_failure(
                FetchStage::Download,
                &Failure::message(EMPTY_DOWNLOAD_MESSAGE),
            ));
        }

        // Step 3: extract text off the async runtime
        let resume_text = self.extract(&path, content).await.map_err(|f| {
            ContextFetchError::from_failure(FetchStage::Extract, &f)
        })?;
        info!(
            "Extracted {} characters from resume {path}",
            resume_text.chars().count()
        );

        // Step 4: profile fields degrade to empty on failure
        let (linkedin_about, github_url) = match self.store.fetch_profile().await {
            Ok(Some(profile)) => (
                profile.linkedin_about.unwrap_or_default(),
                profile.github_url.unwrap_or_default(),
            ),
            Ok(None) => Default::default(),
            Err(failure) => {
                warn!("Error fetching profile, continuing without it: {failure}");
                Default::default()
            }
        };

        // Step 5: compose
        Ok(ContextOutcome::Loaded(ContextBundle::new(
            resume_text,
            linkedin_about,
            github_url,
        )))
    }

    async fn extract(&self, path: &str, content: bytes::Bytes) -> Result<String, Failure> {
        let kind = DocumentKind::from_file_name(path)?;
        let extractor = self.extractor;
        tokio::task::spawn_blocking(move || extractor.extract(&content, kind))
            .await
            .map_err(|e| Failure::message(format!("Resume extraction task failed: {e}")))?
            .map_err(Failure::from)
    }
}
