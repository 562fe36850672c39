//! # Transcript Insights CLI (`insights`)
//!
//! Analyzes meeting transcripts: extracts text from plain text, Word, PowerPoint,
//! and PDF files, finds keyword mentions, and asks a completion API for
//! insights on each segment of the transcript.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `insights analyze <paths>...` | Analyze files and directories, print a report |
//! | `insights serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Keyword matches and insights for two transcripts
//! OPENAI_API_KEY=sk-... insights analyze standup.docx retro.pdf --keywords "budget, hiring"
//!
//! # Keywords only, machine-readable
//! insights analyze ./transcripts --keywords "risk" --no-insights --json
//!
//! # Serve the HTTP API
//! insights serve --config ./config/insights.toml
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use transcript_insights::analyze::{run_analyze, AnalyzeArgs};
use transcript_insights::config::{self, Config};
use transcript_insights::progress::ProgressMode;
use transcript_insights::server;

/// Transcript Insights: keyword search and AI insights for meeting transcripts.
#[derive(Parser)]
#[command(
    name = "insights",
    about = "Keyword search and AI-generated insights for meeting transcripts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze transcript files.
    ///
    /// Directories are walked recursively and filtered by `[inputs]` globs.
    /// Files larger than `limits.max_document_bytes` are rejected; other
    /// files are processed even when some of them fail.
    Analyze {
        /// Files or directories to analyze.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Comma-delimited keywords, e.g. "budget, timeline".
        #[arg(long, short = 'k', default_value = "")]
        keywords: String,

        /// Treat keywords as regular expressions.
        #[arg(long)]
        regex: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Skip insight synthesis; keyword matching still runs.
        #[arg(long)]
        no_insights: bool,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to `human`
        /// on a terminal and `off` otherwise.
        #[arg(long)]
        progress: Option<String>,

        /// Completion API key. Falls back to the variable named by
        /// `completion.api_key_env`.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Analyze {
            paths,
            keywords,
            regex,
            json,
            no_insights,
            progress,
            api_key,
        } => {
            let progress = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(value) => match ProgressMode::parse(value) {
                    Some(mode) => mode,
                    None => bail!("Invalid --progress value '{}': use off, human, or json", value),
                },
            };
            run_analyze(
                &cfg,
                AnalyzeArgs {
                    paths,
                    keywords,
                    regex,
                    json,
                    no_insights,
                    progress,
                    api_key,
                },
            )
            .await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
