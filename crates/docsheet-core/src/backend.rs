use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors provide the blocking decode step only. The extraction pool
/// runs it on the blocking thread pool, one document per call, so
/// implementations must not keep per-call state behind `&self`.
pub trait PdfBackend: Send + Sync {
    /// Extract the full text content of a PDF file.
    ///
    /// Pages are separated by a form feed (`\u{c}`).
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}
