//! Workbook rendering with `rust_xlsxwriter`.

use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};

use docsheet_core::{Consolidation, Report, RunSummary};

use crate::cells::{Cell, data_grid};
use crate::{EmitError, ReportOptions, SUMMARY_SHEET_NAME};

/// Header fill, the dark blue used by the receipts' own spreadsheets.
pub const HEADER_FILL: u32 = 0x1F4E78;

/// Rows available below the header in one worksheet.
const MAX_DATA_ROWS: usize = 1_048_575;

/// Longest string Excel stores in a single cell.
pub const MAX_CELL_CHARS: usize = 32_767;

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::VerticalCenter)
}

/// Render the data sheet (and the summary sheet when enabled) to bytes.
pub fn render_workbook(
    consolidation: &Consolidation,
    options: &ReportOptions,
) -> Result<Vec<u8>, EmitError> {
    let rows = consolidation.report.len();
    if rows > MAX_DATA_ROWS {
        return Err(EmitError::TooManyRows { rows });
    }

    let mut workbook = Workbook::new();
    let header = header_format();

    let sheet = workbook.add_worksheet();
    sheet.set_name(&options.sheet_name)?;
    write_report_sheet(sheet, &consolidation.report, &header)?;

    if options.summary_sheet {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SUMMARY_SHEET_NAME)?;
        write_summary_sheet(sheet, &consolidation.summary, &header)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_header(
    sheet: &mut Worksheet,
    columns: &[&str],
    last_row: u32,
    header: &Format,
) -> Result<(), EmitError> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, header)?;
    }
    if !columns.is_empty() {
        sheet.autofilter(0, 0, last_row, (columns.len() - 1) as u16)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Cut `text` to [`MAX_CELL_CHARS`], warning with the cell's position.
fn clamp_text<'a>(text: &'a str, row: u32, column: &str) -> &'a str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => {
            tracing::warn!(
                row,
                column,
                chars = text.chars().count(),
                limit = MAX_CELL_CHARS,
                "cell text truncated to the xlsx limit"
            );
            &text[..end]
        }
        None => text,
    }
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    column: &str,
    cell: &Cell,
) -> Result<(), EmitError> {
    match cell {
        Cell::Empty => {}
        Cell::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
        Cell::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Cell::Text(s) => {
            sheet.write_string(row, col, clamp_text(s, row, column))?;
        }
    }
    Ok(())
}

fn write_report_sheet(
    sheet: &mut Worksheet,
    report: &Report,
    header: &Format,
) -> Result<(), EmitError> {
    let columns: Vec<&str> = report.columns.iter().map(String::as_str).collect();
    write_header(sheet, &columns, report.len() as u32, header)?;

    for (r, row) in data_grid(report).iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            write_cell(sheet, r as u32 + 1, c as u16, columns[c], cell)?;
        }
    }
    sheet.autofit();
    Ok(())
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    summary: &RunSummary,
    header: &Format,
) -> Result<(), EmitError> {
    let columns = ["NumeroDocumento", "Arquivo", "Status", "Linhas", "Erro"];
    write_header(sheet, &columns, summary.total() as u32, header)?;

    for (i, doc) in summary.documents.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_number(row, 0, doc.numero_documento as f64)?;
        sheet.write_string(row, 1, &doc.name)?;
        sheet.write_string(row, 2, doc.state.label())?;
        sheet.write_number(row, 3, doc.state.rows() as f64)?;
        if let Some(message) = doc.state.error_message() {
            sheet.write_string(row, 4, clamp_text(&message, row, "Erro"))?;
        }
    }
    sheet.autofit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsheet_core::{ConsolidatedRow, DocumentState, DocumentSummary};
    use serde_json::{Map, Value};

    fn one_row(column: &str, value: Value) -> Consolidation {
        let mut fields = Map::new();
        fields.insert(column.to_string(), value);
        Consolidation {
            report: Report {
                columns: vec![
                    "NumeroDocumento".into(),
                    "NumeroPagina".into(),
                    column.to_string(),
                ],
                rows: vec![ConsolidatedRow {
                    numero_documento: 1,
                    numero_pagina: 1,
                    fields,
                }],
            },
            summary: RunSummary {
                documents: vec![DocumentSummary {
                    numero_documento: 1,
                    name: "a.pdf".into(),
                    path: "/in/a.pdf".into(),
                    state: DocumentState::Rows(1),
                }],
            },
        }
    }

    #[test]
    fn oversized_text_is_clamped_not_fatal() {
        let long = "x".repeat(40_000);
        let consolidation = one_row("Descricao", Value::String(long));
        let options = ReportOptions {
            summary_sheet: true,
            ..ReportOptions::default()
        };
        let bytes = render_workbook(&consolidation, &options).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn oversized_nested_value_is_clamped() {
        let items: Vec<Value> = (0..10_000).map(|i| Value::from(i * 1000)).collect();
        let consolidation = one_row("Itens", Value::Array(items));
        assert!(render_workbook(&consolidation, &ReportOptions::default()).is_ok());
    }

    #[test]
    fn clamp_text_respects_char_boundaries() {
        let long = "ç".repeat(MAX_CELL_CHARS + 5);
        let clamped = clamp_text(&long, 1, "Descricao");
        assert_eq!(clamped.chars().count(), MAX_CELL_CHARS);
        assert_eq!(clamp_text("short", 1, "Descricao"), "short");
    }

    #[test]
    fn empty_report_renders_header_only_workbook() {
        let bytes = render_workbook(&Consolidation::default(), &ReportOptions::default()).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn invalid_sheet_name_is_rejected() {
        let options = ReportOptions {
            sheet_name: "bad/name".into(),
            ..ReportOptions::default()
        };
        let err = render_workbook(&Consolidation::default(), &options).unwrap_err();
        assert!(matches!(err, EmitError::Workbook(_)));
    }
}
