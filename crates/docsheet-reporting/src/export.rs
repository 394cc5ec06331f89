use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value};

use docsheet_core::{Consolidation, Report};

use crate::cells::data_grid;
use crate::{EmitError, ExportFormat, ReportOptions, xlsx};

/// Render `consolidation` and write it to `path` atomically.
///
/// Nothing is left at `path` unless the whole artifact was written; a
/// previous file at `path` is replaced only on success.
pub fn emit_report(
    consolidation: &Consolidation,
    format: ExportFormat,
    path: &Path,
    options: &ReportOptions,
) -> Result<(), EmitError> {
    let bytes = render(consolidation, format, options)?;
    write_atomic(path, &bytes)?;
    tracing::info!(
        path = %path.display(),
        format = format.label(),
        rows = consolidation.report.len(),
        bytes = bytes.len(),
        "report written"
    );
    Ok(())
}

/// Render the report in memory.
pub fn render(
    consolidation: &Consolidation,
    format: ExportFormat,
    options: &ReportOptions,
) -> Result<Vec<u8>, EmitError> {
    match format {
        ExportFormat::Xlsx => xlsx::render_workbook(consolidation, options),
        ExportFormat::Csv => Ok(render_csv(&consolidation.report).into_bytes()),
        ExportFormat::Json => render_json(&consolidation.report),
    }
}

/// Write `bytes` to a temporary file beside `path`, then rename it over
/// `path`. Parent directories are created as needed. On failure the
/// temporary file is removed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EmitError> {
    let io_err = |source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn render_csv(report: &Report) -> String {
    let mut out = String::new();
    let header: Vec<String> = report.columns.iter().map(|c| csv_escape(c)).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");

    for row in data_grid(report) {
        let line: Vec<String> = row.iter().map(|c| csv_escape(&c.as_text())).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn render_json(report: &Report) -> Result<Vec<u8>, EmitError> {
    let rows: Vec<Value> = report
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = report
                .columns
                .iter()
                .map(|c| (c.clone(), row.cell(c).unwrap_or(Value::Null)))
                .collect();
            Value::Object(object)
        })
        .collect();
    let mut bytes = serde_json::to_vec_pretty(&rows)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsheet_core::ConsolidatedRow;
    use serde_json::json;

    fn report() -> Report {
        let mut fields = Map::new();
        fields.insert("Descrição".into(), json!("CP, \"PATRONAL\""));
        fields.insert("Total".into(), json!(1649.18));
        Report {
            columns: vec![
                "NumeroDocumento".into(),
                "NumeroPagina".into(),
                "Descrição".into(),
                "Total".into(),
                "Extra".into(),
            ],
            rows: vec![ConsolidatedRow {
                numero_documento: 1,
                numero_pagina: 2,
                fields,
            }],
        }
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_escape_comma() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("plain"), "plain");
    }

    #[test]
    fn csv_rows_follow_columns() {
        let csv = render_csv(&report());
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "NumeroDocumento,NumeroPagina,Descrição,Total,Extra");
        assert_eq!(lines[1], "1,2,\"CP, \"\"PATRONAL\"\"\",1649.18,");
        assert_eq!(lines[2], "");
    }

    #[test]
    fn json_rows_keep_column_order_and_nulls() {
        let bytes = render_json(&report()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        let row = parsed[0].as_object().unwrap();
        let keys: Vec<&String> = row.keys().collect();
        assert_eq!(
            keys,
            vec!["NumeroDocumento", "NumeroPagina", "Descrição", "Total", "Extra"]
        );
        assert_eq!(row["NumeroPagina"], json!(2));
        assert_eq!(row["Extra"], Value::Null);
    }

    #[test]
    fn header_only_csv_for_empty_report() {
        let csv = render_csv(&Report::default());
        assert_eq!(csv, "NumeroDocumento,NumeroPagina\r\n");
    }
}
