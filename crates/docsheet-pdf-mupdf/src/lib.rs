use std::path::Path;

use mupdf::{Document, TextPageFlags};

use docsheet_core::{BackendError, PdfBackend};

/// Separator placed between the text of consecutive pages.
pub const PAGE_BREAK: char = '\u{c}';

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the mupdf dependency (AGPL-3.0) so the rest of the
/// workspace can be built and tested without it.
///
/// Text is read block by block, one line of output per text line, and pages
/// are joined with a form feed. Every block is kept: receipts carry their data
/// right up to the page edges.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Join per-page text with [`PAGE_BREAK`].
pub fn join_pages(pages: &[String]) -> String {
    pages.join(&PAGE_BREAK.to_string())
}

impl PdfBackend for MupdfBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;
        if document
            .needs_password()
            .map_err(|e| BackendError::OpenError(e.to_string()))?
        {
            return Err(BackendError::OpenError("document is password protected".into()));
        }

        let mut pages_text = Vec::new();

        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            let mut page_text = String::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    page_text.push_str(&line_text);
                    page_text.push('\n');
                }
            }
            pages_text.push(page_text);
        }

        tracing::debug!(
            path = %path.display(),
            pages = pages_text.len(),
            "decoded document"
        );
        Ok(join_pages(&pages_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_joined_with_form_feed() {
        let pages = vec![
            "Receita Federal\nCNPJ 00.000.000/0001-00\n".to_string(),
            "Totais 10,00\n".to_string(),
        ];
        let text = join_pages(&pages);
        assert_eq!(text.split(PAGE_BREAK).count(), 2);
        assert!(text.starts_with("Receita Federal"));
        assert!(text.ends_with("Totais 10,00\n"));
    }

    #[test]
    fn single_page_has_no_break() {
        assert!(!join_pages(&["only\n".to_string()]).contains(PAGE_BREAK));
    }

    #[test]
    fn missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MupdfBackend::new()
            .extract_text(&dir.path().join("absent.pdf"))
            .unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }

    #[test]
    fn garbage_file_yields_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();
        // MuPDF may reject the file outright or repair it into an empty document.
        if let Ok(text) = MupdfBackend::new().extract_text(&path) {
            assert!(text.trim().is_empty());
        }
    }
}
