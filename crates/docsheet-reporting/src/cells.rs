//! Mapping from open-schema JSON values to typed spreadsheet cells.

use serde_json::Value;

use docsheet_core::Report;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Cell {
    /// Plain-text rendering used by the CSV writer.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

/// Typed cell for one field value. Absent fields and `null` are empty;
/// arrays and objects become compact JSON text.
pub fn cell_for(value: Option<&Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::Empty,
        Some(Value::Bool(b)) => Cell::Bool(*b),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => Cell::Number(f),
            None => Cell::Text(n.to_string()),
        },
        Some(Value::String(s)) => Cell::Text(s.clone()),
        Some(other @ (Value::Array(_) | Value::Object(_))) => Cell::Text(other.to_string()),
    }
}

/// Data rows of `report` as typed cells, one entry per column.
pub fn data_grid(report: &Report) -> Vec<Vec<Cell>> {
    report
        .rows
        .iter()
        .map(|row| {
            report
                .columns
                .iter()
                .map(|column| cell_for(row.cell(column).as_ref()))
                .collect()
        })
        .collect()
}
