use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transcript_insights::batch::{BatchProcessor, BatchSettings};
use transcript_insights::error::{DocumentError, ProviderError};
use transcript_insights::extract::{MIME_DOCX, MIME_TEXT};
use transcript_insights::models::UploadedFile;
use transcript_insights::progress::{BatchEvent, ProgressReporter};
use transcript_insights::provider::{ApiKey, CompletionProvider};
use transcript_insights::synthesize::{cancel_pair, CancelSignal, SynthesisOptions, PROMPT_PREFIX};

/// Answers "insight: <chunk>". Chunks containing FAIL error out, LATE waits
/// 200ms, SLOW waits 10s.
#[derive(Default)]
struct ScriptedProvider {
    calls: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        _max_tokens: u32,
        credential: &ApiKey,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(credential.expose(), "sk-test");

        let chunk = prompt
            .strip_prefix(PROMPT_PREFIX)
            .expect("prompt carries the instruction prefix")
            .to_string();
        if chunk.contains("SLOW") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        if chunk.contains("LATE") {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.completed.lock().unwrap().push(chunk.clone());
        if chunk.contains("FAIL") {
            return Err(ProviderError::new("429 Too Many Requests"));
        }
        Ok(format!("\n insight: {} \n", chunk))
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<BatchEvent>>,
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: BatchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn settings(segment_chars: usize, concurrency: usize) -> BatchSettings {
    BatchSettings {
        segment_chars,
        synthesis: SynthesisOptions {
            max_tokens: 50,
            concurrency,
            timeout: Duration::from_secs(5),
        },
        ..BatchSettings::default()
    }
}

fn text_upload(filename: &str, text: &str) -> UploadedFile {
    UploadedFile::new(filename, MIME_TEXT, text.as_bytes().to_vec())
}

fn key() -> ApiKey {
    ApiKey::new("sk-test")
}

#[tokio::test]
async fn failed_chunk_is_dropped_from_insights() {
    let provider = Arc::new(ScriptedProvider::default());
    let progress = Arc::new(RecordingProgress::default());
    let processor = BatchProcessor::new(settings(12, 3), provider.clone(), progress.clone());

    let report = processor
        .process(
            vec![text_upload("call.txt", "alpha one. FAIL two. gamma three")],
            &[],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    let insights = report.documents["call.txt"].insights.as_ref().unwrap();
    assert_eq!(insights.text, "insight: alpha one insight: gamma three");
    assert_eq!(insights.chunks_total, 3);
    assert_eq!(insights.chunks_succeeded, 2);
    assert_eq!(insights.failures.len(), 1);
    assert_eq!(insights.failures[0].chunk_index, 1);
    assert!(insights.failures[0].message.contains("429"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    let events = progress.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, BatchEvent::ChunkFailed { chunk_index: 1, .. })));
}

#[tokio::test]
async fn size_limit_is_inclusive() {
    let processor = BatchProcessor::new(
        BatchSettings {
            insights: false,
            ..BatchSettings::default()
        },
        Arc::new(ScriptedProvider::default()),
        Arc::new(RecordingProgress::default()),
    );

    let report = processor
        .process(
            vec![
                text_upload("exact.txt", &"a".repeat(10_000_000)),
                text_upload("over.txt", &"a".repeat(10_000_001)),
            ],
            &[],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    assert!(report.documents.contains_key("exact.txt"));
    assert!(!report.documents.contains_key("over.txt"));
    assert_eq!(report.rejections.len(), 1);
    match &report.rejections[0] {
        DocumentError::OversizedInput {
            filename,
            size,
            limit,
        } => {
            assert_eq!(filename, "over.txt");
            assert_eq!(*size, 10_000_001);
            assert_eq!(*limit, 10_000_000);
        }
        other => panic!("expected OversizedInput, got {:?}", other),
    }
    assert!(report.rejections[0]
        .to_string()
        .contains("Please upload smaller files"));
}

#[tokio::test]
async fn empty_batch_is_empty_report() {
    let provider = Arc::new(ScriptedProvider::default());
    let processor = BatchProcessor::new(
        settings(1000, 4),
        provider.clone(),
        Arc::new(RecordingProgress::default()),
    );

    let report = processor
        .process(
            Vec::<UploadedFile>::new(),
            &["budget".to_string()],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    assert!(report.documents.is_empty());
    assert!(report.errors().is_empty());
    assert!(!report.cancelled);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_format_only_affects_its_document() {
    let processor = BatchProcessor::new(
        settings(1000, 2),
        Arc::new(ScriptedProvider::default()),
        Arc::new(RecordingProgress::default()),
    );

    let report = processor
        .process(
            vec![
                UploadedFile::new("legacy.ppt", "application/vnd.ms-powerpoint", b"\xd0\xcf".to_vec()),
                text_upload("notes.txt", "The budget slipped. Budget review next week"),
            ],
            &["budget".to_string()],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    let legacy = &report.documents["legacy.ppt"];
    assert!(legacy.text.is_none());
    assert!(matches!(
        legacy.error,
        Some(DocumentError::UnsupportedFormat { .. })
    ));
    assert!(legacy.insights.is_none());

    let notes = &report.documents["notes.txt"];
    assert!(notes.error.is_none());
    assert_eq!(notes.keyword("budget").unwrap().count, 2);
    assert_eq!(report.errors().len(), 1);
}

#[tokio::test]
async fn corrupt_docx_is_an_extraction_failure() {
    let processor = BatchProcessor::new(
        settings(1000, 2),
        Arc::new(ScriptedProvider::default()),
        Arc::new(RecordingProgress::default()),
    );

    let report = processor
        .process(
            vec![UploadedFile::new("broken.docx", MIME_DOCX, b"not a zip".to_vec())],
            &["x".to_string()],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    let doc = &report.documents["broken.docx"];
    assert!(doc.text.is_none());
    assert!(doc.keywords.is_empty());
    let err = doc.error.as_ref().unwrap();
    assert_eq!(err.kind(), "extraction_failure");
    assert!(err.to_string().starts_with("Error processing broken.docx"));
}

#[tokio::test]
async fn duplicate_filename_keeps_last_upload() {
    let progress = Arc::new(RecordingProgress::default());
    let processor = BatchProcessor::new(
        BatchSettings {
            insights: false,
            ..BatchSettings::default()
        },
        Arc::new(ScriptedProvider::default()),
        progress.clone(),
    );

    let report = processor
        .process(
            vec![
                text_upload("standup.txt", "old budget notes"),
                text_upload("standup.txt", "new plan. the plan changed"),
            ],
            &["plan".to_string(), "budget".to_string()],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    assert_eq!(report.documents.len(), 1);
    let doc = &report.documents["standup.txt"];
    assert_eq!(doc.keyword("plan").unwrap().count, 2);
    assert_eq!(doc.keyword("budget").unwrap().count, 0);
    assert!(progress
        .events
        .lock()
        .unwrap()
        .contains(&BatchEvent::DuplicateFilename {
            filename: "standup.txt".to_string()
        }));
}

#[tokio::test]
async fn out_of_order_completion_keeps_chunk_order() {
    let provider = Arc::new(ScriptedProvider::default());
    let processor = BatchProcessor::new(
        settings(8, 3),
        provider.clone(),
        Arc::new(RecordingProgress::default()),
    );

    let report = processor
        .process(
            vec![text_upload("call.txt", "LATE first. second. third")],
            &[],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    let completed = provider.completed.lock().unwrap().clone();
    assert_eq!(completed.last().map(String::as_str), Some("LATE first"));

    let insights = report.documents["call.txt"].insights.as_ref().unwrap();
    assert_eq!(
        insights.text,
        "insight: LATE first insight: second insight: third"
    );
}

#[tokio::test]
async fn cancellation_returns_partial_result() {
    let provider = Arc::new(ScriptedProvider::default());
    let progress = Arc::new(RecordingProgress::default());
    let processor = BatchProcessor::new(settings(8, 1), provider.clone(), progress.clone());

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let report = processor
        .process(
            vec![text_upload("call.txt", "fast one. SLOW two. three")],
            &[],
            &key(),
            &signal,
        )
        .await;

    assert!(report.cancelled);
    let insights = report.documents["call.txt"].insights.as_ref().unwrap();
    assert!(insights.partial);
    assert_eq!(insights.text, "insight: fast one");
    assert_eq!(insights.chunks_succeeded, 1);
    assert!(insights.failures.is_empty());
    // the third chunk never reaches the provider
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert!(progress
        .events
        .lock()
        .unwrap()
        .contains(&BatchEvent::Cancelled));
}

fn docx_fixture(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn docx_transcript_runs_full_pipeline() {
    let provider = Arc::new(ScriptedProvider::default());
    let processor = BatchProcessor::new(
        settings(1000, 2),
        provider.clone(),
        Arc::new(RecordingProgress::default()),
    );

    let bytes = docx_fixture(&["Ana: The Budget is tight.", "Ben: Cut the budget then."]);
    let report = processor
        .process(
            vec![UploadedFile::new("meeting.docx", MIME_DOCX, bytes)],
            &["budget".to_string()],
            &key(),
            &CancelSignal::never(),
        )
        .await;

    let doc = &report.documents["meeting.docx"];
    assert_eq!(
        doc.text.as_deref(),
        Some("Ana: The Budget is tight. Ben: Cut the budget then.")
    );
    let budget = doc.keyword("budget").unwrap();
    assert_eq!(budget.count, 2);
    assert_eq!(budget.snippets[0].matched, "Budget");

    let insights = doc.insights.as_ref().unwrap();
    assert_eq!(insights.chunks_total, 1);
    assert!(insights.text.starts_with("insight: Ana: The Budget"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}
