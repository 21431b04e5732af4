//! Text extraction for uploaded JD / CV documents.
//!
//! Exactly two formats are understood: PDF and OOXML word-processing documents.
//! Anything else is rejected by the caller through `DocumentKind::from_mime`
//! before extraction is attempted.

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use thiserror::Error;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not read PDF: {0}")]
    Pdf(String),

    #[error("could not read word document: {0}")]
    Docx(String),

    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Maps a declared MIME type to a supported kind. Parameters such as
    /// `; charset=...` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        if essence.eq_ignore_ascii_case(PDF_MIME) {
            Some(DocumentKind::Pdf)
        } else if essence.eq_ignore_ascii_case(DOCX_MIME) {
            Some(DocumentKind::Docx)
        } else {
            None
        }
    }

    /// Fallback for uploads declared as `application/octet-stream` or with no
    /// type at all: decide by the file extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Some(DocumentKind::Pdf)
        } else if lower.ends_with(".docx") {
            Some(DocumentKind::Docx)
        } else {
            None
        }
    }
}

/// Extracts plain text from a document of a known kind.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
    }
}

/// Runs `extract_text` on the blocking pool. PDF parsing is CPU bound and the
/// underlying parser may panic on hostile input; a panic surfaces as `Aborted`.
pub async fn extract_text_blocking(
    bytes: bytes::Bytes,
    kind: DocumentKind,
) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
        .await
        .map_err(|e| ExtractError::Aborted(e.to_string()))?
}

/// Pages are concatenated in order; a page without a text layer adds nothing.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Every top-level paragraph's text followed by a newline, in document order.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut text = String::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            for item in &paragraph.children {
                if let ParagraphChild::Run(run) = item {
                    for run_child in &run.children {
                        match run_child {
                            RunChild::Text(t) => text.push_str(&t.text),
                            RunChild::Tab(_) => text.push('\t'),
                            _ => {}
                        }
                    }
                }
            }
            text.push('\n');
        }
    }
    Ok(text)
}
