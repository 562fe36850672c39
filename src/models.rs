//! Core data models used throughout the insights pipeline.
//!
//! These types describe what flows through a batch: uploads, extracted
//! documents, chunks, keyword snippets, and the per-document results handed
//! back to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::DocumentError;
use crate::extract::{MIME_DOCX, MIME_PDF, MIME_PPTX, MIME_TEXT};

/// Raw upload as it arrives at the batch boundary.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    /// Declared MIME type, as given by the uploader. Not sniffed.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// One entry of a batch as handed to [`crate::batch::BatchProcessor::process`].
///
/// Sources that can fail per file (disk reads, base64 payloads) report the
/// failure here so the batch can record it against that file alone.
#[derive(Debug, Clone)]
pub enum Upload {
    Received(UploadedFile),
    /// Contents were not read because the declared size already exceeds the
    /// per-document limit.
    Withheld {
        filename: String,
        content_type: String,
        size_bytes: usize,
    },
    /// The source could not produce the bytes.
    Unreadable {
        filename: String,
        content_type: String,
        size_bytes: usize,
        cause: String,
    },
}

impl Upload {
    pub fn filename(&self) -> &str {
        match self {
            Upload::Received(file) => &file.filename,
            Upload::Withheld { filename, .. } | Upload::Unreadable { filename, .. } => filename,
        }
    }

    /// Size in bytes: actual for received files, declared otherwise.
    pub fn size_bytes(&self) -> usize {
        match self {
            Upload::Received(file) => file.bytes.len(),
            Upload::Withheld { size_bytes, .. } | Upload::Unreadable { size_bytes, .. } => {
                *size_bytes
            }
        }
    }
}

impl From<UploadedFile> for Upload {
    fn from(file: UploadedFile) -> Self {
        Upload::Received(file)
    }
}

/// Document format, resolved once from the declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PlainText,
    WordDoc,
    SlideDeck,
    Pdf,
    Unsupported,
}

impl ContentKind {
    /// Resolve a declared MIME type. Parameters (`; charset=...`) and case are
    /// ignored.
    pub fn from_mime(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            MIME_TEXT => ContentKind::PlainText,
            MIME_DOCX => ContentKind::WordDoc,
            MIME_PPTX => ContentKind::SlideDeck,
            MIME_PDF => ContentKind::Pdf,
            _ => ContentKind::Unsupported,
        }
    }
}

/// A document in the working set of one batch.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub size_bytes: usize,
    pub content_type: String,
    pub kind: ContentKind,
    /// `None` when extraction failed or the format is unsupported.
    pub text: Option<String>,
    pub batch_id: Uuid,
}

/// A sentence-aligned slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// Length in characters, the unit the segmenter budgets in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Context window around one keyword match. Offsets are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub match_start: usize,
    pub match_end: usize,
    pub matched: String,
}

/// All matches of one keyword in one document.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordMatches {
    pub keyword: String,
    pub count: usize,
    pub snippets: Vec<Snippet>,
    /// Set when the keyword could not be compiled (regex mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One chunk whose completion call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub message: String,
}

/// Ordered concatenation of per-chunk insights for one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightResult {
    pub text: String,
    pub chunks_total: usize,
    pub chunks_succeeded: usize,
    pub failures: Vec<ChunkFailure>,
    /// True when the batch was cancelled before every chunk finished.
    pub partial: bool,
}

/// Everything the batch produced for one filename.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub filename: String,
    pub content_type: String,
    pub kind: ContentKind,
    pub size_bytes: usize,
    pub text: Option<String>,
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentError>,
    pub keywords: Vec<KeywordMatches>,
    pub insights: Option<InsightResult>,
}

impl DocumentReport {
    /// Total snippet count across all keywords.
    pub fn match_count(&self) -> usize {
        self.keywords.iter().map(|k| k.count).sum()
    }

    pub fn keyword(&self, keyword: &str) -> Option<&KeywordMatches> {
        self.keywords.iter().find(|k| k.keyword == keyword)
    }
}

/// Structured result of one batch, keyed by filename.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub documents: BTreeMap<String, DocumentReport>,
    /// Documents refused before extraction (oversized uploads).
    pub rejections: Vec<DocumentError>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn empty(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            started_at: Utc::now(),
            documents: BTreeMap::new(),
            rejections: Vec::new(),
            cancelled: false,
        }
    }

    /// All document-level errors in the batch, rejections first.
    pub fn errors(&self) -> Vec<&DocumentError> {
        self.rejections
            .iter()
            .chain(self.documents.values().filter_map(|d| d.error.as_ref()))
            .collect()
    }
}

/// First `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_from_mime() {
        assert_eq!(ContentKind::from_mime("text/plain"), ContentKind::PlainText);
        assert_eq!(
            ContentKind::from_mime("Text/Plain; charset=utf-8"),
            ContentKind::PlainText
        );
        assert_eq!(ContentKind::from_mime(MIME_DOCX), ContentKind::WordDoc);
        assert_eq!(ContentKind::from_mime(MIME_PPTX), ContentKind::SlideDeck);
        assert_eq!(ContentKind::from_mime("application/pdf"), ContentKind::Pdf);
        assert_eq!(
            ContentKind::from_mime("application/vnd.ms-powerpoint"),
            ContentKind::Unsupported
        );
        assert_eq!(ContentKind::from_mime(""), ContentKind::Unsupported);
    }

    #[test]
    fn preview_counts_chars_not_bytes() {
        assert_eq!(preview("héllo wörld", 5), "héllo");
        assert_eq!(preview("abc", 500), "abc");
    }
}
