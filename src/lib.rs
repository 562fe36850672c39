//! # Transcript Insights
//!
//! Keyword search and AI-generated insights for meeting transcripts.
//!
//! A batch of uploaded documents flows through one pipeline per document:
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────────┐
//! │  Upload  │──▶│  Extract  │──▶│ Keyword Matcher │──┐
//! │ size cap │   │ txt/docx/ │   └─────────────────┘  │   ┌─────────────┐
//! └──────────┘   │ pptx/pdf  │   ┌─────────┐ ┌──────┐ ├──▶│ BatchReport │
//!                └───────────┘──▶│ Segment │▶│ LLM  │─┘   └─────────────┘
//!                                └─────────┘ └──────┘
//! ```
//!
//! Failures stay local: an oversized or unreadable file drops out alone and
//! a failed completion call drops only its chunk.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Document and provider errors |
//! | [`extract`] | Text extraction from txt, docx, pptx, and pdf |
//! | [`keyword`] | Keyword snippets |
//! | [`chunk`] | Sentence segmentation |
//! | [`provider`] | Completion provider abstraction |
//! | [`synthesize`] | Concurrent per-chunk insight synthesis |
//! | [`batch`] | Batch orchestration |
//! | [`progress`] | Progress reporting |
//! | [`inputs`] | Reading uploads from disk |
//! | [`analyze`] | `insights analyze` command |
//! | [`server`] | HTTP server |

pub mod analyze;
pub mod batch;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod inputs;
pub mod keyword;
pub mod models;
pub mod progress;
pub mod provider;
pub mod server;
pub mod synthesize;
