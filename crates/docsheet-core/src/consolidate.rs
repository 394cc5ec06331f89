//! Merge per-document record batches into one ordered report.
//!
//! Documents are numbered by selection order, never by completion order, and
//! rows inside a document are renumbered 1..=n in the order the structuring
//! service returned them.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{DocumentError, DocumentOutcome};

pub const COLUMN_NUMERO_DOCUMENTO: &str = "NumeroDocumento";
pub const COLUMN_NUMERO_PAGINA: &str = "NumeroPagina";

/// What to do with a document whose response lacked the record array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Count the document as failed.
    #[default]
    Fail,
    /// Contribute zero rows, but flag the document as a schema mismatch.
    #[serde(alias = "empty", alias = "treat-as-empty")]
    TreatAsEmpty,
}

impl FromStr for SchemaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(SchemaPolicy::Fail),
            "empty" | "treat_as_empty" | "treat-as-empty" => Ok(SchemaPolicy::TreatAsEmpty),
            other => Err(format!(
                "unknown schema policy `{}` (expected `fail` or `empty`)",
                other
            )),
        }
    }
}

/// A structured record annotated with its document and row identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedRow {
    pub numero_documento: usize,
    pub numero_pagina: usize,
    /// Record fields without the two identifier columns.
    pub fields: Map<String, Value>,
}

impl ConsolidatedRow {
    /// Value for `column`, including the injected identifier columns.
    /// `None` means the record has no such field.
    pub fn cell(&self, column: &str) -> Option<Value> {
        match column {
            COLUMN_NUMERO_DOCUMENTO => Some(Value::from(self.numero_documento)),
            COLUMN_NUMERO_PAGINA => Some(Value::from(self.numero_pagina)),
            other => self.fields.get(other).cloned(),
        }
    }
}

/// The consolidated dataset destined for the spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Identifier columns first, then every record field in first-seen order.
    pub columns: Vec<String>,
    pub rows: Vec<ConsolidatedRow>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows belonging to one document.
    pub fn rows_for(&self, numero_documento: usize) -> impl Iterator<Item = &ConsolidatedRow> {
        self.rows
            .iter()
            .filter(move |r| r.numero_documento == numero_documento)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self {
            columns: vec![
                COLUMN_NUMERO_DOCUMENTO.to_string(),
                COLUMN_NUMERO_PAGINA.to_string(),
            ],
            rows: vec![],
        }
    }
}

/// How one document ended up in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    /// Structured into this many rows (always > 0).
    Rows(usize),
    /// The service answered with an empty record list.
    Empty,
    /// The response lacked the record array and the policy treats that as
    /// zero rows. Kept apart from [`DocumentState::Empty`].
    SchemaMismatch { detail: String },
    Failed(DocumentError),
}

impl DocumentState {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentState::Rows(_) => "ok",
            DocumentState::Empty => "empty",
            DocumentState::SchemaMismatch { .. } => "schema mismatch (treated as empty)",
            DocumentState::Failed(DocumentError::Extraction(_)) => "extraction failed",
            DocumentState::Failed(DocumentError::Service { .. }) => "service failed",
            DocumentState::Failed(DocumentError::Schema { .. }) => "schema error",
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            DocumentState::Rows(n) => *n,
            _ => 0,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            DocumentState::SchemaMismatch { detail } => Some(detail.clone()),
            DocumentState::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub numero_documento: usize,
    pub name: String,
    pub path: PathBuf,
    pub state: DocumentState,
}

/// Per-document account of a run, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub documents: Vec<DocumentSummary>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.documents.len()
    }

    pub fn structured(&self) -> usize {
        self.count(|s| matches!(s, DocumentState::Rows(_)))
    }

    pub fn empty(&self) -> usize {
        self.count(|s| matches!(s, DocumentState::Empty))
    }

    pub fn schema_mismatches(&self) -> usize {
        self.count(|s| matches!(s, DocumentState::SchemaMismatch { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DocumentState::Failed(_)))
    }

    pub fn rows(&self) -> usize {
        self.documents.iter().map(|d| d.state.rows()).sum()
    }

    /// Documents that failed or were flagged, with their reasons.
    pub fn problems(&self) -> impl Iterator<Item = &DocumentSummary> {
        self.documents.iter().filter(|d| {
            matches!(
                d.state,
                DocumentState::Failed(_) | DocumentState::SchemaMismatch { .. }
            )
        })
    }

    fn count(&self, pred: impl Fn(&DocumentState) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.state)).count()
    }
}

/// Output of [`consolidate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    pub report: Report,
    pub summary: RunSummary,
}

/// Merge every document outcome into a single report.
///
/// Outcomes may arrive in any order. They are ranked by selection ordinal and
/// numbered 1..=n by that rank; each document's records keep their service
/// order and get `NumeroPagina` 1..=k. Payload fields named like the
/// identifier columns are overwritten.
pub fn consolidate(mut outcomes: Vec<DocumentOutcome>, policy: SchemaPolicy) -> Consolidation {
    outcomes.sort_by_key(|o| o.handle.ordinal);

    let mut seen_ordinals = HashSet::new();
    let mut columns = Report::default().columns;
    let mut seen_columns: HashSet<String> = columns.iter().cloned().collect();
    let mut rows = Vec::new();
    let mut documents = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        if !seen_ordinals.insert(outcome.handle.ordinal) {
            tracing::warn!(
                ordinal = outcome.handle.ordinal,
                document = %outcome.handle.path.display(),
                "duplicate outcome for document, keeping the first"
            );
            continue;
        }
        let numero_documento = documents.len() + 1;

        let state = match outcome.result {
            Ok(records) if records.is_empty() => DocumentState::Empty,
            Ok(records) => {
                let count = records.len();
                for (i, record) in records.into_iter().enumerate() {
                    let mut fields = record.fields;
                    for injected in [COLUMN_NUMERO_DOCUMENTO, COLUMN_NUMERO_PAGINA] {
                        if let Some(original) = fields.remove(injected) {
                            tracing::debug!(
                                numero_documento,
                                field = injected,
                                original = %original,
                                "overriding service-provided identifier"
                            );
                        }
                    }
                    for key in fields.keys() {
                        if !seen_columns.contains(key) {
                            seen_columns.insert(key.clone());
                            columns.push(key.clone());
                        }
                    }
                    rows.push(ConsolidatedRow {
                        numero_documento,
                        numero_pagina: i + 1,
                        fields,
                    });
                }
                DocumentState::Rows(count)
            }
            Err(DocumentError::Schema { path, detail }) if policy == SchemaPolicy::TreatAsEmpty => {
                DocumentState::SchemaMismatch {
                    detail: format!("{}: {}", path, detail),
                }
            }
            Err(e) => DocumentState::Failed(e),
        };

        documents.push(DocumentSummary {
            numero_documento,
            name: outcome.handle.name(),
            path: outcome.handle.path,
            state,
        });
    }

    Consolidation {
        report: Report { columns, rows },
        summary: RunSummary { documents },
    }
}
