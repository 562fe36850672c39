//! Chunk-by-chunk insight synthesis.
//!
//! Each chunk is wrapped in a fixed instruction prompt and sent to a
//! [`CompletionProvider`]. Calls run concurrently up to
//! [`SynthesisOptions::concurrency`], each bounded by a timeout, and results
//! are reassembled in chunk order no matter which call finishes first.
//!
//! A failed call costs only its own chunk: the failure is recorded and
//! reported, and the remaining chunks still contribute to the
//! [`InsightResult`].

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::models::{Chunk, ChunkFailure, InsightResult};
use crate::provider::{ApiKey, CompletionProvider};

/// Instruction placed in front of every chunk.
pub const PROMPT_PREFIX: &str = "Provide insights on the following transcript segment: ";

pub fn build_prompt(chunk_text: &str) -> String {
    format!("{}{}", PROMPT_PREFIX, chunk_text)
}

/// Knobs for one synthesis run.
#[derive(Clone, Debug)]
pub struct SynthesisOptions {
    pub max_tokens: u32,
    /// Completion calls allowed in flight at once (minimum 1).
    pub concurrency: usize,
    /// Per-call timeout; an expired call is a chunk failure.
    pub timeout: Duration,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

impl From<&CompletionConfig> for SynthesisOptions {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            concurrency: config.concurrency.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Batch-level cancellation, observed by every synthesis run in the batch.
///
/// Cloning is cheap; all clones observe the same [`CancelHandle`].
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Raises the paired [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Create a connected cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is raised. Pends forever if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

enum ChunkOutcome {
    Insight(String),
    Failed(ChunkFailure),
    Skipped,
    Cancelled,
}

/// Run every chunk through the provider and join the insights in chunk order.
///
/// `on_failure` is invoked as soon as a chunk's call fails, possibly from
/// several chunks concurrently.
pub async fn synthesize(
    chunks: &[Chunk],
    provider: &dyn CompletionProvider,
    credential: &ApiKey,
    options: &SynthesisOptions,
    cancel: &CancelSignal,
    on_failure: &(dyn Fn(&ChunkFailure) + Send + Sync),
) -> InsightResult {
    // Built and boxed before streaming so the batch future stays `Send`.
    let calls: Vec<BoxFuture<'_, ChunkOutcome>> = chunks
        .iter()
        .map(|chunk| {
            synthesize_chunk(chunk, provider, credential, options, cancel, on_failure).boxed()
        })
        .collect();

    // `buffered` yields in input order regardless of completion order
    let outcomes: Vec<ChunkOutcome> = stream::iter(calls)
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    assemble(chunks.len(), outcomes)
}

async fn synthesize_chunk(
    chunk: &Chunk,
    provider: &dyn CompletionProvider,
    credential: &ApiKey,
    options: &SynthesisOptions,
    cancel: &CancelSignal,
    on_failure: &(dyn Fn(&ChunkFailure) + Send + Sync),
) -> ChunkOutcome {
    if cancel.is_cancelled() {
        return ChunkOutcome::Cancelled;
    }
    if chunk.text.trim().is_empty() {
        return ChunkOutcome::Skipped;
    }

    let prompt = build_prompt(&chunk.text);
    debug!(
        chunk = chunk.index,
        provider = provider.name(),
        prompt_chars = prompt.len(),
        "requesting completion"
    );

    let call = tokio::time::timeout(
        options.timeout,
        provider.complete(&prompt, options.max_tokens, credential),
    );
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return ChunkOutcome::Cancelled,
        result = call => result,
    };

    let message = match result {
        Ok(Ok(text)) => return ChunkOutcome::Insight(text.trim().to_string()),
        Ok(Err(e)) => e.message,
        Err(_) => format!(
            "completion timed out after {:.1}s",
            options.timeout.as_secs_f64()
        ),
    };
    let failure = ChunkFailure {
        chunk_index: chunk.index,
        message,
    };
    on_failure(&failure);
    ChunkOutcome::Failed(failure)
}

fn assemble(chunks_total: usize, outcomes: Vec<ChunkOutcome>) -> InsightResult {
    let mut text = String::new();
    let mut result = InsightResult {
        chunks_total,
        ..InsightResult::default()
    };

    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Insight(insight) => {
                text.push_str(&insight);
                text.push(' ');
                result.chunks_succeeded += 1;
            }
            ChunkOutcome::Failed(failure) => result.failures.push(failure),
            ChunkOutcome::Skipped => {}
            ChunkOutcome::Cancelled => result.partial = true,
        }
    }

    result.text = text.trim_end().to_string();
    result
}
