use std::fs;
use std::path::{Path, PathBuf};

use docsheet_ingest::{SelectionError, SkipReason, select_documents};

fn touch(path: &Path) {
    fs::write(path, b"%PDF-1.4\n").unwrap();
}

fn names(paths: impl IntoIterator<Item = PathBuf>) -> Vec<String> {
    paths
        .into_iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[test]
fn files_keep_argument_order() {
    let dir = tempfile::tempdir().unwrap();
    let b = dir.path().join("b.pdf");
    let a = dir.path().join("a.pdf");
    touch(&a);
    touch(&b);

    let selection = select_documents(&[&b, &a]).unwrap();
    let ordinals: Vec<_> = selection.handles.iter().map(|h| h.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1]);
    assert_eq!(
        names(selection.handles.into_iter().map(|h| h.path)),
        vec!["b.pdf", "a.pdf"]
    );
}

#[test]
fn directory_expands_to_sorted_pdfs() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("c.pdf"));
    touch(&dir.path().join("A.PDF"));
    touch(&dir.path().join("b.pdf"));
    fs::write(dir.path().join("readme.txt"), "ignore me").unwrap();
    fs::create_dir(dir.path().join("nested.pdf")).unwrap();

    let selection = select_documents(&[dir.path()]).unwrap();
    assert_eq!(
        names(selection.handles.into_iter().map(|h| h.path)),
        vec!["A.PDF", "b.pdf", "c.pdf"]
    );
}

#[test]
fn missing_inputs_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("present.pdf");
    touch(&present);
    let missing = dir.path().join("missing.pdf");

    let selection = select_documents(&[&missing, &present]).unwrap();
    assert_eq!(selection.handles.len(), 1);
    assert_eq!(selection.handles[0].ordinal, 0);
    assert_eq!(selection.skipped.len(), 1);
    assert_eq!(selection.skipped[0].reason, SkipReason::Missing);
}

#[test]
fn duplicates_kept_once_at_first_position() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.pdf");
    let b = dir.path().join("b.pdf");
    touch(&a);
    touch(&b);

    // `a.pdf` is reached directly and again through the directory.
    let selection = select_documents(&[a.clone(), dir.path().to_path_buf()]).unwrap();
    assert_eq!(
        names(selection.handles.iter().map(|h| h.path.clone())),
        vec!["a.pdf", "b.pdf"]
    );
    assert_eq!(selection.skipped.len(), 1);
    assert_eq!(selection.skipped[0].reason, SkipReason::Duplicate);
}

#[test]
fn nothing_selected_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty");
    fs::create_dir(&empty).unwrap();

    let err = select_documents(&[empty, dir.path().join("nope.pdf")]).unwrap_err();
    assert_eq!(err, SelectionError::Empty { skipped: 2 });
}

#[test]
fn no_inputs_is_an_error() {
    let inputs: Vec<PathBuf> = vec![];
    assert_eq!(
        select_documents(&inputs).unwrap_err(),
        SelectionError::Empty { skipped: 0 }
    );
}
