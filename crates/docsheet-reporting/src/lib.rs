use std::path::{Path, PathBuf};

use thiserror::Error;

use docsheet_core::Consolidation;

pub mod cells;
pub mod export;
pub mod xlsx;

pub use cells::{Cell, cell_for, data_grid};
pub use export::{emit_report, render, write_atomic};

/// Default output file name when none is given.
pub const DEFAULT_OUTPUT: &str = "Resultado_Extração_PDF.xlsx";
/// Name of the data sheet when none is configured.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
/// Name of the optional per-document summary sheet.
pub const SUMMARY_SHEET_NAME: &str = "Resumo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "Excel",
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// Pick the format from the output path's extension. Anything that is
    /// not `.csv` or `.json` is written as a workbook.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => ExportFormat::Csv,
            "json" => ExportFormat::Json,
            _ => ExportFormat::Xlsx,
        }
    }
}

/// Rendering options shared by every format.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub sheet_name: String,
    /// Add the "Resumo" sheet listing every document's outcome (workbook only).
    pub summary_sheet: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            summary_sheet: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to render workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report has {rows} rows, more than a worksheet can hold")]
    TooManyRows { rows: usize },
}

/// Convenience: render and write `consolidation` to `path`, choosing the
/// format from the extension.
pub fn emit(
    consolidation: &Consolidation,
    path: &Path,
    options: &ReportOptions,
) -> Result<ExportFormat, EmitError> {
    let format = ExportFormat::from_path(path);
    emit_report(consolidation, format, path, options)?;
    Ok(format)
}
