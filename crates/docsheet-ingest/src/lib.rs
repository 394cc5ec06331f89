use std::sync::Arc;

use thiserror::Error;

pub mod selection;

// Re-export domain types for convenience
pub use docsheet_core::{DocumentHandle, PdfBackend};
pub use selection::{Selection, SelectionError, SkipReason, SkippedInput, is_pdf_path, select_documents};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// The PDF backend compiled into this build.
#[cfg(feature = "pdf")]
pub fn default_backend() -> Result<Arc<dyn PdfBackend>, IngestError> {
    Ok(Arc::new(docsheet_pdf_mupdf::MupdfBackend::default()))
}

#[cfg(not(feature = "pdf"))]
pub fn default_backend() -> Result<Arc<dyn PdfBackend>, IngestError> {
    Err(IngestError::BackendUnavailable(
        "PDF support not compiled in (enable the `pdf` feature of docsheet-ingest)".into(),
    ))
}
