use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod consolidate;
pub mod extraction;
pub mod mock;
pub mod pipeline;
pub mod pool;
pub mod structuring;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use consolidate::{
    COLUMN_NUMERO_DOCUMENTO, COLUMN_NUMERO_PAGINA, Consolidation, ConsolidatedRow, DocumentState,
    DocumentSummary, Report, RunSummary, SchemaPolicy, consolidate,
};
pub use pipeline::{PipelineError, run_pipeline};
pub use structuring::{StructuringError, StructuringService};
pub use structuring::canvas::{CanvasClient, ConfigError};

/// Field name under `message.content` that holds the record list in the
/// canvas used for DARF receipts.
pub const DEFAULT_RECORDS_FIELD: &str = "Composição do documento de arrecadação";
/// Canvas variable that receives the document text.
pub const DEFAULT_TEXT_VARIABLE: &str = "arquivo";
pub const DEFAULT_BASE_URL: &str = "https://api.tela.com";

/// Reference to one input PDF.
///
/// `ordinal` is the 0-based position in the user's selection and is the
/// identity used to key every downstream result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentHandle {
    pub ordinal: usize,
    pub path: PathBuf,
}

impl DocumentHandle {
    pub fn new(ordinal: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            ordinal,
            path: path.into(),
        }
    }

    /// File name for display, falling back to the full path.
    pub fn name(&self) -> String {
        display_name(&self.path)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Full text of one successfully decoded document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub handle: DocumentHandle,
    pub text: String,
}

/// A per-document failure. Never aborts the batch.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub handle: DocumentHandle,
    pub error: DocumentError,
}

pub type ExtractionOutcome = Result<ExtractedText, DocumentFailure>;

/// One row of structured data returned for a document.
///
/// The schema is open: field names come from the remote template, in the
/// order the service returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredRecord {
    pub fields: Map<String, Value>,
}

impl StructuredRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl From<Map<String, Value>> for StructuredRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Final per-document result handed to the consolidator.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub handle: DocumentHandle,
    pub result: Result<Vec<StructuredRecord>, DocumentError>,
}

impl DocumentOutcome {
    pub fn failed(failure: DocumentFailure) -> Self {
        Self {
            handle: failure.handle,
            result: Err(failure.error),
        }
    }
}

/// Errors isolated to a single document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("service error{}: {message}", status_suffix(.status))]
    Service {
        status: Option<u16>,
        message: String,
    },
    #[error("schema error at `{path}`: {detail}")]
    Schema { path: String, detail: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl DocumentError {
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::Extraction(_) => "extraction",
            DocumentError::Service { .. } => "service",
            DocumentError::Schema { .. } => "schema",
        }
    }
}

impl From<StructuringError> for DocumentError {
    fn from(err: StructuringError) -> Self {
        match err {
            StructuringError::Service { status, message } => {
                DocumentError::Service { status, message }
            }
            StructuringError::Schema { path, detail } => DocumentError::Schema { path, detail },
        }
    }
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ExtractionStarted {
        index: usize,
        total: usize,
        name: String,
    },
    Extracted {
        index: usize,
        total: usize,
        name: String,
        chars: usize,
        elapsed: Duration,
    },
    ExtractionFailed {
        index: usize,
        total: usize,
        name: String,
        error: DocumentError,
    },
    Structured {
        index: usize,
        total: usize,
        name: String,
        records: usize,
        elapsed: Duration,
    },
    StructuringFailed {
        index: usize,
        total: usize,
        name: String,
        error: DocumentError,
    },
}

/// Runtime configuration for a batch.
#[derive(Clone)]
pub struct Config {
    /// Bearer credential for the structuring service. Never compiled in.
    pub api_key: Option<String>,
    /// Template ("canvas") identifier selecting the extraction schema.
    pub canvas_id: Option<String>,
    pub base_url: String,
    /// Key under `choices[0].message.content` holding the record array.
    pub records_field: String,
    pub text_variable: String,
    pub request_timeout_secs: u64,
    /// Concurrent PDF decodes.
    pub num_workers: usize,
    /// Concurrent in-flight structuring requests.
    pub structuring_concurrency: usize,
    pub schema_policy: SchemaPolicy,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("canvas_id", &self.canvas_id)
            .field("base_url", &self.base_url)
            .field("records_field", &self.records_field)
            .field("text_variable", &self.text_variable)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("num_workers", &self.num_workers)
            .field("structuring_concurrency", &self.structuring_concurrency)
            .field("schema_policy", &self.schema_policy)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            canvas_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            records_field: DEFAULT_RECORDS_FIELD.to_string(),
            text_variable: DEFAULT_TEXT_VARIABLE.to_string(),
            request_timeout_secs: 120,
            num_workers: default_num_workers(),
            structuring_concurrency: 4,
            schema_policy: SchemaPolicy::default(),
        }
    }
}

/// Number of available execution units, or 4 if it cannot be determined.
pub fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
