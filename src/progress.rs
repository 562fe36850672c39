//! Batch progress reporting.
//!
//! Reports what happens to each document during `insights analyze` so users
//! see rejections and per-chunk failures as they occur instead of only in the
//! final report. Progress is emitted on **stderr** so stdout remains parseable
//! for scripts.

use std::io::Write;

/// A single observable event during a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchEvent {
    /// Upload refused before extraction (oversized).
    Rejected { filename: String, reason: String },
    /// Format unsupported or extraction failed; no keyword or insight stages.
    ExtractionFailed { filename: String, reason: String },
    /// Text extracted; synthesis about to start.
    Extracted {
        filename: String,
        chars: u64,
        chunks: u64,
    },
    /// A completion call for one chunk failed. Synthesis continues.
    ChunkFailed {
        filename: String,
        chunk_index: u64,
        reason: String,
    },
    /// All stages finished for a document.
    DocumentDone {
        filename: String,
        matches: u64,
        chunks_succeeded: u64,
        chunks_total: u64,
    },
    /// A later upload with the same filename replaced an earlier result.
    DuplicateFilename { filename: String },
    /// The batch was cancelled; remaining calls are abandoned.
    Cancelled,
}

/// Receives batch events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the batch pipeline, possibly from
    /// several documents concurrently.
    fn report(&self, event: BatchEvent);
}

/// Human-friendly progress on stderr: "insights notes.txt  2 / 3 chunks ok, 4 matches".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: BatchEvent) {
        let line = match &event {
            BatchEvent::Rejected { reason, .. } => format!("rejected  {}\n", reason),
            BatchEvent::ExtractionFailed { reason, .. } => format!("failed  {}\n", reason),
            BatchEvent::Extracted {
                filename,
                chars,
                chunks,
            } => format!(
                "insights {}  extracted {} chars, {} chunks\n",
                filename,
                format_number(*chars),
                format_number(*chunks)
            ),
            BatchEvent::ChunkFailed {
                filename,
                chunk_index,
                reason,
            } => format!(
                "insights {}  chunk {} failed: {}\n",
                filename, chunk_index, reason
            ),
            BatchEvent::DocumentDone {
                filename,
                matches,
                chunks_succeeded,
                chunks_total,
            } => format!(
                "insights {}  {} / {} chunks ok, {} matches\n",
                filename,
                format_number(*chunks_succeeded),
                format_number(*chunks_total),
                format_number(*matches)
            ),
            BatchEvent::DuplicateFilename { filename } => format!(
                "warning  duplicate filename {}: later upload replaces earlier result\n",
                filename
            ),
            BatchEvent::Cancelled => "cancelled  abandoning remaining completion calls\n".to_string(),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: BatchEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &BatchEvent) -> serde_json::Value {
    match event {
        BatchEvent::Rejected { filename, reason } => serde_json::json!({
            "event": "rejected",
            "filename": filename,
            "reason": reason
        }),
        BatchEvent::ExtractionFailed { filename, reason } => serde_json::json!({
            "event": "extraction_failed",
            "filename": filename,
            "reason": reason
        }),
        BatchEvent::Extracted {
            filename,
            chars,
            chunks,
        } => serde_json::json!({
            "event": "extracted",
            "filename": filename,
            "chars": chars,
            "chunks": chunks
        }),
        BatchEvent::ChunkFailed {
            filename,
            chunk_index,
            reason,
        } => serde_json::json!({
            "event": "chunk_failed",
            "filename": filename,
            "chunk_index": chunk_index,
            "reason": reason
        }),
        BatchEvent::DocumentDone {
            filename,
            matches,
            chunks_succeeded,
            chunks_total,
        } => serde_json::json!({
            "event": "document_done",
            "filename": filename,
            "matches": matches,
            "chunks_succeeded": chunks_succeeded,
            "chunks_total": chunks_total
        }),
        BatchEvent::DuplicateFilename { filename } => serde_json::json!({
            "event": "duplicate_filename",
            "filename": filename
        }),
        BatchEvent::Cancelled => serde_json::json!({ "event": "cancelled" }),
    }
}

/// Routes events into `tracing`; used by the HTTP server where stderr
/// progress lines would interleave across requests.
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, event: BatchEvent) {
        match &event {
            BatchEvent::Rejected { .. }
            | BatchEvent::ExtractionFailed { .. }
            | BatchEvent::ChunkFailed { .. }
            | BatchEvent::DuplicateFilename { .. } => {
                tracing::warn!(event = %event_json(&event), "batch progress")
            }
            _ => tracing::info!(event = %event_json(&event), "batch progress"),
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: BatchEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
