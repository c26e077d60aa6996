//! Document text extraction — turns an uploaded resume into plain text.
//!
//! One stateless strategy per document kind, selected statically by
//! [`DocumentKind`]. Parsing is CPU-bound; async callers run it inside
//! `tokio::task::spawn_blocking`.

use std::io::{Cursor, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Extensions read as plain text.
const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "js", "ts", "py", "json", "html", "css"];

/// Main document part inside a word-processor XML package.
const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            ext if PLAIN_TEXT_EXTENSIONS.contains(&ext) => Some(DocumentKind::PlainText),
            _ => None,
        }
    }

    /// Resolves the kind from the extension of a file name or storage path.
    pub fn from_file_name(name: &str) -> Result<Self, ExtractError> {
        let file_name = name.rsplit('/').next().unwrap_or(name);
        let extension = file_name.rsplit('.').next().unwrap_or_default();
        Self::from_extension(extension)
            .ok_or_else(|| ExtractError::UnsupportedFormat(extension.to_ascii_lowercase()))
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Docx => "DOCX",
            DocumentKind::PlainText => "text file",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file type: .{0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {kind}: {reason}")]
    ExtractionFailure { kind: &'static str, reason: String },
}

impl ExtractError {
    fn failure(kind: DocumentKind, reason: impl Into<String>) -> Self {
        ExtractError::ExtractionFailure {
            kind: kind.label(),
            reason: reason.into(),
        }
    }
}

/// A format-specific text extraction strategy. Implementations hold no state.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, content: &[u8]) -> Result<String, ExtractError>;
}

pub struct PdfExtractor;
pub struct DocxExtractor;
pub struct PlainTextExtractor;

impl TextExtractor for PdfExtractor {
    /// Pages in order; runs on a page joined by single spaces, pages separated
    /// by a blank line.
    fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
        // pdf-extract panics on some malformed inputs instead of returning Err.
        let pages = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(content)
        }))
        .map_err(|_| {
            ExtractError::failure(DocumentKind::Pdf, "the document structure could not be read")
        })?
        .map_err(|e| ExtractError::failure(DocumentKind::Pdf, e.to_string()))?;

        Ok(pages
            .iter()
            .map(|page| page.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

impl TextExtractor for DocxExtractor {
    /// Raw paragraph text of the document body; styling is discarded.
    fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(content))
            .map_err(|e| ExtractError::failure(DocumentKind::Docx, e.to_string()))?;
        let mut body = archive.by_name(DOCX_BODY_PART).map_err(|_| {
            ExtractError::failure(DocumentKind::Docx, format!("missing {DOCX_BODY_PART}"))
        })?;
        let mut xml = String::new();
        body.read_to_string(&mut xml)
            .map_err(|e| ExtractError::failure(DocumentKind::Docx, e.to_string()))?;
        Ok(docx_raw_text(&xml))
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
        String::from_utf8(content.to_vec()).map_err(|e| {
            ExtractError::failure(DocumentKind::PlainText, format!("not valid UTF-8 ({e})"))
        })
    }
}

/// Dispatches to the strategy for a document kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn extract(&self, content: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
        Self::strategy(kind).extract(content)
    }

    /// Extracts using the kind implied by `file_name`'s extension.
    pub fn extract_file(&self, file_name: &str, content: &[u8]) -> Result<String, ExtractError> {
        self.extract(content, DocumentKind::from_file_name(file_name)?)
    }

    fn strategy(kind: DocumentKind) -> &'static dyn TextExtractor {
        match kind {
            DocumentKind::Pdf => &PdfExtractor,
            DocumentKind::Docx => &DocxExtractor,
            DocumentKind::PlainText => &PlainTextExtractor,
        }
    }
}

fn docx_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // An empty run may be written self-closing (`<w:t xml:space="preserve"/>`);
        // the opening tag must not end in `/` or the lazy body would swallow markup.
        Regex::new(r"(?s)<w:t(?:\s[^>]*[^/>])?>(.*?)</w:t>|<w:tab/>|<w:br\b[^>]*/>|</w:p>")
            .expect("docx token pattern is valid")
    })
}

fn char_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&#(?:x([0-9a-fA-F]+)|([0-9]+));").expect("char reference pattern is valid")
    })
}

/// Text runs of a `word/document.xml` body. Each paragraph ends with a blank line.
fn docx_raw_text(xml: &str) -> String {
    let mut text = String::new();
    for token in docx_token_pattern().captures_iter(xml) {
        if let Some(run) = token.get(1) {
            text.push_str(&unescape_xml(run.as_str()));
            continue;
        }
        match &token[0] {
            "</w:p>" => text.push_str("\n\n"),
            "<w:tab/>" => text.push('\t'),
            _ => text.push('\n'),
        }
    }
    text
}

/// Decodes numeric character references, then the five predefined entities.
/// `&amp;` goes last so `&amp;lt;` stays the literal text `&lt;`.
fn unescape_xml(raw: &str) -> String {
    let decoded = char_reference_pattern().replace_all(raw, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    decoded
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
