//! Turns the user's input arguments into an ordered list of documents.
//!
//! Order is the order of the arguments; a directory contributes its PDF
//! files sorted by file name at the directory's position. The resulting
//! ordinals are what `NumeroDocumento` is derived from.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use docsheet_core::DocumentHandle;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no PDF documents selected ({skipped} input(s) skipped)")]
    Empty { skipped: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The path does not exist.
    Missing,
    /// Same file as an earlier input.
    Duplicate,
    /// A directory with no PDF files directly inside it.
    EmptyDirectory,
    /// The path exists but could not be read.
    Unreadable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "not found"),
            SkipReason::Duplicate => write!(f, "already selected"),
            SkipReason::EmptyDirectory => write!(f, "directory contains no PDF files"),
            SkipReason::Unreadable(e) => write!(f, "unreadable: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Documents chosen for a run plus every input that was left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub handles: Vec<DocumentHandle>,
    pub skipped: Vec<SkippedInput>,
}

/// Case-insensitive `.pdf` extension check.
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Resolve input arguments into document handles.
///
/// - Files are taken as given, whatever their extension.
/// - Directories expand to the `*.pdf` files directly inside them, sorted by
///   file name. Subdirectories are not visited.
/// - Missing paths are skipped with a warning.
/// - A file reached twice (same canonical path) is kept at its first position.
///
/// Returns [`SelectionError::Empty`] when nothing is left.
pub fn select_documents<P: AsRef<Path>>(inputs: &[P]) -> Result<Selection, SelectionError> {
    let mut selection = Selection::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    let mut push = |selection: &mut Selection, path: PathBuf| {
        let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if !seen.insert(key) {
            tracing::debug!(path = %path.display(), "duplicate input skipped");
            selection.skipped.push(SkippedInput {
                path,
                reason: SkipReason::Duplicate,
            });
            return;
        }
        let ordinal = selection.handles.len();
        selection.handles.push(DocumentHandle::new(ordinal, path));
    };

    for input in inputs {
        let input = input.as_ref();
        let metadata = match std::fs::metadata(input) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %input.display(), "input not found, skipping");
                selection.skipped.push(SkippedInput {
                    path: input.to_path_buf(),
                    reason: SkipReason::Missing,
                });
                continue;
            }
            Err(e) => {
                tracing::warn!(path = %input.display(), error = %e, "input unreadable, skipping");
                selection.skipped.push(SkippedInput {
                    path: input.to_path_buf(),
                    reason: SkipReason::Unreadable(e.to_string()),
                });
                continue;
            }
        };

        if !metadata.is_dir() {
            push(&mut selection, input.to_path_buf());
            continue;
        }

        match pdfs_in_directory(input) {
            Ok(files) if files.is_empty() => {
                tracing::warn!(path = %input.display(), "directory contains no PDF files");
                selection.skipped.push(SkippedInput {
                    path: input.to_path_buf(),
                    reason: SkipReason::EmptyDirectory,
                });
            }
            Ok(files) => {
                for file in files {
                    push(&mut selection, file);
                }
            }
            Err(e) => {
                tracing::warn!(path = %input.display(), error = %e, "cannot list directory, skipping");
                selection.skipped.push(SkippedInput {
                    path: input.to_path_buf(),
                    reason: SkipReason::Unreadable(e.to_string()),
                });
            }
        }
    }

    if selection.handles.is_empty() {
        return Err(SelectionError::Empty {
            skipped: selection.skipped.len(),
        });
    }
    tracing::info!(
        documents = selection.handles.len(),
        skipped = selection.skipped.len(),
        "selection resolved"
    );
    Ok(selection)
}

fn pdfs_in_directory(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_pdf_path(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
