use std::fs;

use docsheet_core::{
    Consolidation, DocumentError, DocumentHandle, DocumentOutcome, SchemaPolicy,
    StructuredRecord, consolidate,
};
use docsheet_reporting::{EmitError, ExportFormat, ReportOptions, emit};
use serde_json::{Value, json};

fn record(value: Value) -> StructuredRecord {
    match value {
        Value::Object(map) => StructuredRecord::new(map),
        _ => panic!("record must be an object"),
    }
}

fn sample() -> Consolidation {
    consolidate(
        vec![
            DocumentOutcome {
                handle: DocumentHandle::new(0, "/in/docA.pdf"),
                result: Ok(vec![
                    record(json!({"Codigo": "1082", "Valor": 1649.18})),
                    record(json!({"Codigo": "1138", "Valor": 10})),
                ]),
            },
            DocumentOutcome {
                handle: DocumentHandle::new(1, "/in/broken.pdf"),
                result: Err(DocumentError::Extraction("bad xref".into())),
            },
            DocumentOutcome {
                handle: DocumentHandle::new(2, "/in/docB.pdf"),
                result: Ok(vec![record(json!({"Codigo": "0561", "Pago": true}))]),
            },
        ],
        SchemaPolicy::Fail,
    )
}

fn leftovers(dir: &std::path::Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

#[test]
fn workbook_written_with_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("nested").join("Resultado.xlsx");

    let options = ReportOptions {
        summary_sheet: true,
        ..ReportOptions::default()
    };
    let format = emit(&sample(), &path, &options).unwrap();

    assert_eq!(format, ExportFormat::Xlsx);
    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], b"PK");
    assert_eq!(leftovers(path.parent().unwrap()), vec!["Resultado.xlsx"]);
}

#[test]
fn csv_chosen_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");

    let format = emit(&sample(), &path, &ReportOptions::default()).unwrap();

    assert_eq!(format, ExportFormat::Csv);
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "NumeroDocumento,NumeroPagina,Codigo,Valor,Pago");
    assert_eq!(lines[1], "1,1,1082,1649.18,");
    assert_eq!(lines[2], "1,2,1138,10,");
    assert_eq!(lines[3], "3,1,0561,,true");
    assert_eq!(lines.len(), 4);
}

#[test]
fn json_chosen_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");

    emit(&sample(), &path, &ReportOptions::default()).unwrap();

    let parsed: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let rows = parsed.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["NumeroDocumento"], json!(3));
    assert_eq!(rows[2]["Valor"], Value::Null);
}

#[test]
fn existing_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    fs::write(&path, "stale").unwrap();

    emit(&sample(), &path, &ReportOptions::default()).unwrap();

    assert!(fs::read_to_string(&path).unwrap().starts_with("NumeroDocumento"));
}

#[test]
fn failed_render_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.xlsx");
    let options = ReportOptions {
        sheet_name: "invalid[name]".into(),
        ..ReportOptions::default()
    };

    let err = emit(&sample(), &path, &options).unwrap_err();

    assert!(matches!(err, EmitError::Workbook(_)));
    assert!(!path.exists());
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn unwritable_target_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "file").unwrap();
    let path = blocker.join("report.xlsx");

    let err = emit(&sample(), &path, &ReportOptions::default()).unwrap_err();

    assert!(matches!(err, EmitError::Io { .. }));
    assert!(!path.exists());
}

#[test]
fn header_only_report_for_zero_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    let empty = consolidate(
        vec![DocumentOutcome {
            handle: DocumentHandle::new(0, "/in/blank.pdf"),
            result: Ok(vec![]),
        }],
        SchemaPolicy::Fail,
    );

    emit(&empty, &path, &ReportOptions::default()).unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "NumeroDocumento,NumeroPagina\r\n"
    );
}
