//! Turns command-line paths into uploads.
//!
//! Files named explicitly are always taken; directories are walked and
//! filtered with the `[inputs]` globs. The declared content type comes from
//! the file extension. Nothing here inspects file contents, so a mislabelled
//! file surfaces later as an extraction failure.
//!
//! Per-file problems do not stop the run: a file over the size limit is not
//! read, and a file that cannot be read is handed on as
//! [`Upload::Unreadable`]. Only a path that does not exist is fatal.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::InputsConfig;
use crate::extract::{MIME_DOCX, MIME_PDF, MIME_PPTX, MIME_TEXT};
use crate::models::{Upload, UploadedFile};

/// Content type declared for extensions we do not recognize.
pub const MIME_UNKNOWN: &str = "application/octet-stream";

/// Declared MIME type for a path, by extension (case-insensitive).
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" => MIME_TEXT,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "pdf" => MIME_PDF,
        _ => MIME_UNKNOWN,
    }
}

/// Read every input path into an [`Upload`].
///
/// Explicit files are named by their file name; files found under a directory
/// are named by their path relative to that directory. Files larger than
/// `max_bytes` are sized from metadata and left unread.
pub fn collect_uploads(
    paths: &[PathBuf],
    config: &InputsConfig,
    max_bytes: usize,
) -> Result<Vec<Upload>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/target/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut uploads = Vec::new();

    for root in paths {
        if root.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| root.display().to_string());
            uploads.push(load_upload(root, name, max_bytes));
            continue;
        }
        if !root.is_dir() {
            bail!("Input path does not exist: {}", root.display());
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        root = %root.display(),
                        error = %e,
                        "skipping unreadable directory entry"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            found.push(load_upload(path, rel_str, max_bytes));
        }

        // Sort for deterministic ordering
        found.sort_by(|a, b| a.filename().cmp(b.filename()));
        uploads.extend(found);
    }

    Ok(uploads)
}

/// Size-check then read one file. Never fails; problems become variants.
fn load_upload(path: &Path, filename: String, max_bytes: usize) -> Upload {
    let content_type = mime_for_path(path).to_string();
    let size_bytes = match std::fs::metadata(path) {
        Ok(meta) => meta.len() as usize,
        Err(e) => {
            return Upload::Unreadable {
                filename,
                content_type,
                size_bytes: 0,
                cause: format!("cannot stat {}: {}", path.display(), e),
            }
        }
    };
    if size_bytes > max_bytes {
        return Upload::Withheld {
            filename,
            content_type,
            size_bytes,
        };
    }
    match std::fs::read(path) {
        Ok(bytes) => Upload::Received(UploadedFile {
            filename,
            content_type,
            bytes,
        }),
        Err(e) => Upload::Unreadable {
            filename,
            content_type,
            size_bytes,
            cause: format!("failed to read {}: {}", path.display(), e),
        },
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
