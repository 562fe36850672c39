//! Typed failures for documents and completion calls.
//!
//! Document-level errors are terminal for one document only and chunk-level
//! [`ProviderError`]s are terminal for one chunk only. Nothing in this module
//! aborts a batch; see [`crate::batch`] for how they are collected.

use serde::Serialize;
use thiserror::Error;

/// Why a single document dropped out of the pipeline.
///
/// Every variant names the offending file so the message can be shown to the
/// user as-is.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentError {
    /// The upload exceeds the configured per-document byte limit. The document
    /// never reaches extraction.
    #[error("{filename} is too large ({size} bytes, limit {limit} bytes). Please upload smaller files.")]
    OversizedInput {
        filename: String,
        size: usize,
        limit: usize,
    },

    /// The declared content type is not one of plain text, docx, pptx, or pdf.
    #[error("{filename}: unsupported format '{content_type}'")]
    UnsupportedFormat {
        filename: String,
        content_type: String,
    },

    /// The extractor rejected the bytes (corrupt archive, bad encoding, ...).
    #[error("Error processing {filename}: {cause}")]
    ExtractionFailure { filename: String, cause: String },
}

impl DocumentError {
    /// The file this error belongs to.
    pub fn filename(&self) -> &str {
        match self {
            DocumentError::OversizedInput { filename, .. }
            | DocumentError::UnsupportedFormat { filename, .. }
            | DocumentError::ExtractionFailure { filename, .. } => filename,
        }
    }

    /// Short machine-readable label, matching the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::OversizedInput { .. } => "oversized_input",
            DocumentError::UnsupportedFormat { .. } => "unsupported_format",
            DocumentError::ExtractionFailure { .. } => "extraction_failure",
        }
    }
}

/// A failed completion call (network, auth, rate limit, timeout, bad payload).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::new(format!("request timed out: {}", err))
        } else {
            ProviderError::new(format!("request failed: {}", err))
        }
    }
}
