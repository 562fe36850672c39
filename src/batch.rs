//! Batch pipeline orchestration.
//!
//! Coordinates one request end to end: size check → format resolution →
//! extraction → keyword matching → segmentation → insight synthesis, and
//! aggregates the per-document results into a [`BatchReport`] keyed by
//! filename.
//!
//! Failures are contained at the smallest possible scope. An oversized or
//! unreadable document drops out alone, a failed completion call drops only
//! its chunk, and an empty batch is an empty report rather than an error.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::chunk::segment;
use crate::config::Config;
use crate::error::DocumentError;
use crate::extract::extract_text;
use crate::keyword::{search_keyword, MatchMode};
use crate::models::{
    preview, BatchReport, ChunkFailure, ContentKind, Document, DocumentReport, InsightResult,
    KeywordMatches, Upload,
};
use crate::progress::{BatchEvent, ProgressReporter};
use crate::provider::{ApiKey, CompletionProvider};
use crate::synthesize::{synthesize, CancelSignal, SynthesisOptions};

/// Tunables for one batch, usually derived from [`Config`].
#[derive(Clone, Debug)]
pub struct BatchSettings {
    pub max_document_bytes: usize,
    pub preview_chars: usize,
    pub segment_chars: usize,
    pub snippet_radius: usize,
    pub match_mode: MatchMode,
    pub documents_concurrency: usize,
    /// Run the segment + synthesize stage. Keyword matching always runs.
    pub insights: bool,
    pub synthesis: SynthesisOptions,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for BatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_document_bytes: config.limits.max_document_bytes,
            preview_chars: config.limits.preview_chars,
            segment_chars: config.chunking.segment_chars,
            snippet_radius: config.keywords.snippet_radius,
            match_mode: if config.keywords.regex {
                MatchMode::Regex
            } else {
                MatchMode::Literal
            },
            documents_concurrency: config.completion.documents_concurrency.max(1),
            insights: true,
            synthesis: SynthesisOptions::from(&config.completion),
        }
    }
}

/// Runs batches against one completion provider.
///
/// The provider and reporter are shared across documents and chunks; neither
/// is locked across a completion call.
pub struct BatchProcessor {
    settings: BatchSettings,
    provider: Arc<dyn CompletionProvider>,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchProcessor {
    pub fn new(
        settings: BatchSettings,
        provider: Arc<dyn CompletionProvider>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            settings,
            provider,
            reporter,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Process one batch of uploads.
    ///
    /// `keywords` are already split and trimmed (see
    /// [`crate::keyword::parse_keywords`]). The credential is used for every
    /// completion call of this batch and is not retained afterwards. An
    /// [`Upload::Unreadable`] entry becomes an extraction failure for that
    /// file; the rest of the batch proceeds.
    pub async fn process<U: Into<Upload>>(
        &self,
        uploads: Vec<U>,
        keywords: &[String],
        credential: &ApiKey,
        cancel: &CancelSignal,
    ) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let mut report = BatchReport::empty(batch_id);

        let uploads = uploads.into_iter().map(Into::into).collect();
        let accepted = self.admit(uploads, &mut report.rejections);

        let documents: Vec<DocumentReport> = stream::iter(accepted)
            .map(|upload| {
                let span = info_span!("document", filename = %upload.filename(), batch = %batch_id);
                self.process_document(upload, batch_id, keywords, credential, cancel)
                    .instrument(span)
            })
            .buffered(self.settings.documents_concurrency.max(1))
            .collect()
            .await;

        for document in documents {
            report.documents.insert(document.filename.clone(), document);
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
            self.reporter.report(BatchEvent::Cancelled);
        }

        report
    }

    /// Reject oversized uploads and collapse duplicate filenames (last wins).
    fn admit(&self, uploads: Vec<Upload>, rejections: &mut Vec<DocumentError>) -> Vec<Upload> {
        let mut accepted: Vec<Upload> = Vec::with_capacity(uploads.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for upload in uploads {
            if upload.size_bytes() > self.settings.max_document_bytes {
                let err = DocumentError::OversizedInput {
                    filename: upload.filename().to_string(),
                    size: upload.size_bytes(),
                    limit: self.settings.max_document_bytes,
                };
                self.reporter.report(BatchEvent::Rejected {
                    filename: upload.filename().to_string(),
                    reason: err.to_string(),
                });
                rejections.push(err);
                continue;
            }

            match positions.get(upload.filename()) {
                Some(&pos) => {
                    self.reporter.report(BatchEvent::DuplicateFilename {
                        filename: upload.filename().to_string(),
                    });
                    accepted[pos] = upload;
                }
                None => {
                    positions.insert(upload.filename().to_string(), accepted.len());
                    accepted.push(upload);
                }
            }
        }

        accepted
    }

    async fn process_document(
        &self,
        upload: Upload,
        batch_id: Uuid,
        keywords: &[String],
        credential: &ApiKey,
        cancel: &CancelSignal,
    ) -> DocumentReport {
        let (filename, content_type, size_bytes, bytes) = match upload {
            Upload::Received(file) => {
                let size = file.bytes.len();
                (file.filename, file.content_type, size, Ok(file.bytes))
            }
            Upload::Withheld {
                filename,
                content_type,
                size_bytes,
            } => (
                filename,
                content_type,
                size_bytes,
                Err("contents were not read".to_string()),
            ),
            Upload::Unreadable {
                filename,
                content_type,
                size_bytes,
                cause,
            } => (filename, content_type, size_bytes, Err(cause)),
        };
        let kind = ContentKind::from_mime(&content_type);
        let mut document = Document {
            filename,
            size_bytes,
            content_type,
            kind,
            text: None,
            batch_id,
        };

        let extracted = match bytes {
            Ok(bytes) => extract_document(&document, bytes).await,
            Err(cause) => Err(DocumentError::ExtractionFailure {
                filename: document.filename.clone(),
                cause,
            }),
        };
        let text = match extracted {
            Ok(text) => text,
            Err(err) => {
                self.reporter.report(BatchEvent::ExtractionFailed {
                    filename: document.filename.clone(),
                    reason: err.to_string(),
                });
                return self.document_report(document, Some(err), Vec::new(), None);
            }
        };
        document.text = Some(text);
        let text = document.text.as_deref().unwrap_or_default();

        let matches: Vec<KeywordMatches> = keywords
            .iter()
            .map(|keyword| {
                search_keyword(
                    keyword,
                    text,
                    self.settings.match_mode,
                    self.settings.snippet_radius,
                )
            })
            .collect();
        let match_count: usize = matches.iter().map(|m| m.count).sum();

        let insights = if self.settings.insights {
            let chunks = segment(text, self.settings.segment_chars);
            self.reporter.report(BatchEvent::Extracted {
                filename: document.filename.clone(),
                chars: text.chars().count() as u64,
                chunks: chunks.len() as u64,
            });
            debug!(
                batch = %document.batch_id,
                chunks = chunks.len(),
                "synthesizing insights"
            );

            let filename = document.filename.clone();
            let reporter = self.reporter.as_ref();
            let on_failure = move |failure: &ChunkFailure| {
                reporter.report(BatchEvent::ChunkFailed {
                    filename: filename.clone(),
                    chunk_index: failure.chunk_index as u64,
                    reason: failure.message.clone(),
                });
            };
            Some(
                synthesize(
                    &chunks,
                    self.provider.as_ref(),
                    credential,
                    &self.settings.synthesis,
                    cancel,
                    &on_failure,
                )
                .await,
            )
        } else {
            None
        };

        let (chunks_succeeded, chunks_total) = insights
            .as_ref()
            .map(|i: &InsightResult| (i.chunks_succeeded as u64, i.chunks_total as u64))
            .unwrap_or((0, 0));
        self.reporter.report(BatchEvent::DocumentDone {
            filename: document.filename.clone(),
            matches: match_count as u64,
            chunks_succeeded,
            chunks_total,
        });

        self.document_report(document, None, matches, insights)
    }

    fn document_report(
        &self,
        document: Document,
        error: Option<DocumentError>,
        keywords: Vec<KeywordMatches>,
        insights: Option<InsightResult>,
    ) -> DocumentReport {
        DocumentReport {
            preview: document
                .text
                .as_deref()
                .map(|t| preview(t, self.settings.preview_chars)),
            filename: document.filename,
            content_type: document.content_type,
            kind: document.kind,
            size_bytes: document.size_bytes,
            text: document.text,
            error,
            keywords,
            insights,
        }
    }
}

/// Resolve the format and extract text off the async runtime.
///
/// Extraction runs on the blocking pool so a large PDF does not stall other
/// documents; a panic inside a format parser becomes an extraction failure.
async fn extract_document(document: &Document, bytes: Vec<u8>) -> Result<String, DocumentError> {
    if document.kind == ContentKind::Unsupported {
        return Err(DocumentError::UnsupportedFormat {
            filename: document.filename.clone(),
            content_type: document.content_type.clone(),
        });
    }

    let kind = document.kind;
    let extracted = tokio::task::spawn_blocking(move || extract_text(&bytes, kind)).await;
    match extracted {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DocumentError::ExtractionFailure {
            filename: document.filename.clone(),
            cause: e.to_string(),
        }),
        Err(join_err) => Err(DocumentError::ExtractionFailure {
            filename: document.filename.clone(),
            cause: format!("extractor crashed: {}", join_err),
        }),
    }
}
