//! The `insights analyze` command.
//!
//! Collects files from disk, runs them through one [`BatchProcessor`] batch,
//! and prints the [`BatchReport`] either as JSON or as the human-readable
//! sections below. Per-document failures are part of the report; only
//! configuration and I/O problems make the command itself fail.

use anyhow::Result;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::batch::{BatchProcessor, BatchSettings};
use crate::config::Config;
use crate::inputs::collect_uploads;
use crate::keyword::{parse_keywords, MatchMode};
use crate::models::BatchReport;
use crate::progress::{ProgressMode, ProgressReporter};
use crate::provider::{create_provider, ApiKey};
use crate::synthesize::cancel_pair;

/// Resolved command-line options for one `analyze` run.
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub paths: Vec<PathBuf>,
    /// Raw comma-delimited keyword string.
    pub keywords: String,
    pub regex: bool,
    pub json: bool,
    pub no_insights: bool,
    pub progress: ProgressMode,
    pub api_key: Option<String>,
}

/// CLI entry point: analyze the given paths and print the report to stdout.
pub async fn run_analyze(config: &Config, args: AnalyzeArgs) -> Result<()> {
    let keywords = parse_keywords(&args.keywords);
    let uploads = collect_uploads(&args.paths, &config.inputs, config.limits.max_document_bytes)?;

    let mut settings = BatchSettings::from(config);
    if args.regex {
        settings.match_mode = MatchMode::Regex;
    }
    settings.insights = !args.no_insights && config.completion.is_enabled();

    let credential = resolve_credential(config, args.api_key.as_deref());
    if settings.insights && credential.is_empty() && config.completion.provider == "openai" {
        warn!(
            env = %config.completion.api_key_env,
            "no API key provided; every completion call will fail"
        );
    }

    let provider = create_provider(&config.completion)?;
    let reporter: Arc<dyn ProgressReporter> = Arc::from(args.progress.reporter());
    let processor = BatchProcessor::new(settings, provider, reporter);

    let (handle, signal) = cancel_pair();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let report = processor
        .process(uploads, &keywords, &credential, &signal)
        .await;
    ctrl_c.abort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    Ok(())
}

/// `--api-key` wins; otherwise the environment variable named in config.
fn resolve_credential(config: &Config, flag: Option<&str>) -> ApiKey {
    match flag {
        Some(key) => ApiKey::new(key),
        None => std::env::var(&config.completion.api_key_env)
            .map(ApiKey::new)
            .unwrap_or_default(),
    }
}

/// Human-readable rendering of a batch report.
pub fn render_report(report: &BatchReport) -> String {
    let mut out = String::new();

    let errors = report.errors();
    if !errors.is_empty() {
        let _ = writeln!(out, "--- Errors ---");
        for err in errors {
            let _ = writeln!(out, "{}", err);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "--- Uploaded Files & Previews ---");
    if report.documents.is_empty() {
        let _ = writeln!(out, "(no documents)");
    }
    for doc in report.documents.values() {
        let _ = writeln!(out, "{} ({}, {} bytes)", doc.filename, doc.content_type, doc.size_bytes);
        match &doc.preview {
            Some(preview) => {
                let _ = writeln!(out, "{}", preview);
            }
            None => {
                let _ = writeln!(out, "(no text extracted)");
            }
        }
        let _ = writeln!(out);
    }

    let has_keywords = report.documents.values().any(|d| !d.keywords.is_empty());
    if has_keywords {
        let _ = writeln!(out, "--- Keyword Matches ---");
        for doc in report.documents.values() {
            for matches in &doc.keywords {
                if let Some(err) = &matches.error {
                    let _ = writeln!(
                        out,
                        "Invalid pattern '{}' for {}: {}",
                        matches.keyword, doc.filename, err
                    );
                    continue;
                }
                let _ = writeln!(
                    out,
                    "Found {} instances of '{}' in {}:",
                    matches.count, matches.keyword, doc.filename
                );
                for snippet in &matches.snippets {
                    let _ = writeln!(out, "...{}...", snippet.text);
                }
            }
        }
        let _ = writeln!(out);
    }

    let has_insights = report.documents.values().any(|d| d.insights.is_some());
    if has_insights {
        let _ = writeln!(out, "--- Extracted Insights ---");
        for doc in report.documents.values() {
            let Some(insights) = &doc.insights else {
                continue;
            };
            let _ = writeln!(out, "Insights from {}:", doc.filename);
            let _ = writeln!(out, "{}", insights.text);
            for failure in &insights.failures {
                let _ = writeln!(
                    out,
                    "  (chunk {} failed: {})",
                    failure.chunk_index, failure.message
                );
            }
            if insights.partial {
                let _ = writeln!(out, "  (partial: batch cancelled)");
            }
            let _ = writeln!(out);
        }
    }

    out
}
