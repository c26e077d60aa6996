//! Synchronous checks applied before anything touches the store.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

pub const MAX_UPLOAD_MB: usize = 5;
pub const MAX_UPLOAD_BYTES: usize = MAX_UPLOAD_MB * 1024 * 1024;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const TEXT_MIME: &str = "text/plain";

pub const ALLOWED_MIME_TYPES: [&str; 3] = [PDF_MIME, DOCX_MIME, TEXT_MIME];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File is too large. Maximum size is {MAX_UPLOAD_MB}MB.")]
    TooLarge { size: usize },

    #[error("Invalid file type. Please upload a PDF, DOCX, or TXT file.")]
    DisallowedType { mime: String },

    #[error("Please enter a valid GitHub profile URL.")]
    InvalidGithubUrl,

    #[error("No resume file was provided.")]
    MissingFile,
}

pub fn validate_upload(size: usize, mime: &str) -> Result<(), ValidationError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge { size });
    }
    if !ALLOWED_MIME_TYPES.contains(&mime) {
        return Err(ValidationError::DisallowedType {
            mime: mime.to_string(),
        });
    }
    Ok(())
}

fn github_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(https?://)?(www\.)?github\.com/[a-zA-Z0-9_-]+(/[a-zA-Z0-9_-]+)*/?$")
            .expect("github pattern is valid")
    })
}

/// An empty URL is accepted and clears the field.
pub fn validate_github_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    if url.is_empty() || github_pattern().is_match(url) {
        Ok(())
    } else {
        Err(ValidationError::InvalidGithubUrl)
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        PDF_MIME => "pdf",
        DOCX_MIME => "docx",
        _ => "txt",
    }
}

/// `resume_<compact UTC timestamp>.<ext>`; the extension later selects the extractor.
pub fn resume_object_key(mime: &str, at: DateTime<Utc>) -> String {
    format!(
        "resume_{}.{}",
        at.format("%Y%m%dT%H%M%S%3fZ"),
        extension_for(mime)
    )
}
