use std::io::Write;
use std::path::Path;
use std::time::Duration;

use docsheet_core::{DocumentState, ExtractionOutcome, ProgressEvent, RunSummary};
use docsheet_ingest::SkippedInput;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print inputs that were left out of the selection.
pub fn print_skipped_inputs(
    w: &mut dyn Write,
    skipped: &[SkippedInput],
    color: ColorMode,
) -> std::io::Result<()> {
    for s in skipped {
        let msg = format!("{} ({})", s.path.display(), s.reason);
        if color.enabled() {
            writeln!(w, "{} {}", "WARNING:".yellow(), msg)?;
        } else {
            writeln!(w, "WARNING: {}", msg)?;
        }
    }
    Ok(())
}

/// Print the selection header before work starts.
pub fn print_selection(
    w: &mut dyn Write,
    documents: usize,
    service: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    let noun = if documents == 1 { "document" } else { "documents" };
    if color.enabled() {
        writeln!(
            w,
            "Processing {} {} with {}",
            documents.bold(),
            noun,
            service.cyan()
        )?;
    } else {
        writeln!(w, "Processing {} {} with {}", documents, noun, service)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::ExtractionStarted { .. } => {}
        ProgressEvent::Extracted {
            index,
            total,
            name,
            chars,
            elapsed,
        } => {
            let detail = format!("{} chars in {:.1?}", chars, elapsed);
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] {} -> {} ({})",
                    index + 1,
                    total,
                    name,
                    "EXTRACTED".dimmed(),
                    detail.dimmed()
                )?;
            } else {
                writeln!(w, "[{}/{}] {} -> EXTRACTED ({})", index + 1, total, name, detail)?;
            }
        }
        ProgressEvent::ExtractionFailed {
            index,
            total,
            name,
            error,
        } => {
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] {} -> {} {}",
                    index + 1,
                    total,
                    name,
                    "EXTRACTION FAILED".red(),
                    error
                )?;
            } else {
                writeln!(
                    w,
                    "[{}/{}] {} -> EXTRACTION FAILED {}",
                    index + 1,
                    total,
                    name,
                    error
                )?;
            }
        }
        ProgressEvent::Structured {
            index,
            total,
            name,
            records,
            elapsed,
        } => {
            let detail = format!("{} records in {:.1?}", records, elapsed);
            if color.enabled() {
                let status = if *records == 0 {
                    "EMPTY".yellow().to_string()
                } else {
                    "OK".green().to_string()
                };
                writeln!(w, "[{}/{}] {} -> {} ({})", index + 1, total, name, status, detail)?;
            } else {
                let status = if *records == 0 { "EMPTY" } else { "OK" };
                writeln!(w, "[{}/{}] {} -> {} ({})", index + 1, total, name, status, detail)?;
            }
        }
        ProgressEvent::StructuringFailed {
            index,
            total,
            name,
            error,
        } => {
            let label = match error.kind() {
                "schema" => "SCHEMA ERROR",
                _ => "SERVICE ERROR",
            };
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] {} -> {} {}",
                    index + 1,
                    total,
                    name,
                    label.red(),
                    error
                )?;
            } else {
                writeln!(w, "[{}/{}] {} -> {} {}", index + 1, total, name, label, error)?;
            }
        }
    }
    Ok(())
}

/// Print one line per document for `--dry-run`.
pub fn print_dry_run(
    w: &mut dyn Write,
    outcomes: &[ExtractionOutcome],
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", "DRY RUN: text extraction only".bold().cyan())?;
    } else {
        writeln!(w, "DRY RUN: text extraction only")?;
    }
    writeln!(w)?;

    for outcome in outcomes {
        match outcome {
            Ok(doc) => {
                let pages = doc.text.split('\u{c}').count();
                writeln!(
                    w,
                    "  {:>3}. {}  {} chars, {} page(s)",
                    doc.handle.ordinal + 1,
                    doc.handle.name(),
                    doc.text.chars().count(),
                    pages
                )?;
            }
            Err(failure) => {
                let line = format!(
                    "  {:>3}. {}  {}",
                    failure.handle.ordinal + 1,
                    failure.handle.name(),
                    failure.error
                );
                if color.enabled() {
                    writeln!(w, "{}", line.red())?;
                } else {
                    writeln!(w, "{}", line)?;
                }
            }
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the final summary.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Documents processed: {}", summary.total())?;
    writeln!(w, "  Rows written: {}", summary.rows())?;
    writeln!(w)?;

    if color.enabled() {
        writeln!(w, "  {} {}", "Structured:".green(), summary.structured())?;
    } else {
        writeln!(w, "  Structured: {}", summary.structured())?;
    }
    if summary.empty() > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "No records:".yellow(), summary.empty())?;
        } else {
            writeln!(w, "  No records: {}", summary.empty())?;
        }
    }
    if summary.schema_mismatches() > 0 {
        let msg = format!(
            "Schema mismatches (treated as empty): {}",
            summary.schema_mismatches()
        );
        if color.enabled() {
            writeln!(w, "  {}", msg.yellow())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }
    if summary.failed() > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Failed:".red(), summary.failed())?;
        } else {
            writeln!(w, "  Failed: {}", summary.failed())?;
        }
    }

    let problems: Vec<_> = summary.problems().collect();
    if !problems.is_empty() {
        writeln!(w)?;
        for doc in problems {
            let reason = doc.state.error_message().unwrap_or_default();
            let line = format!(
                "  #{} {} [{}] {}",
                doc.numero_documento,
                doc.name,
                doc.state.label(),
                truncate(&reason, 120)
            );
            let is_failure = matches!(doc.state, DocumentState::Failed(_));
            if color.enabled() && is_failure {
                writeln!(w, "{}", line.red())?;
            } else if color.enabled() {
                writeln!(w, "{}", line.yellow())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
    }

    writeln!(w)?;
    Ok(())
}

/// Print where the report went and how long the run took.
pub fn print_completion(
    w: &mut dyn Write,
    path: &Path,
    format_label: &str,
    elapsed: Duration,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} report written to {}",
            format_label.green().bold(),
            path.display().bold()
        )?;
    } else {
        writeln!(w, "{} report written to {}", format_label, path.display())?;
    }
    writeln!(w, "Elapsed: {:.2?}", elapsed)?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsheet_core::{DocumentError, DocumentSummary};

    fn plain() -> ColorMode {
        ColorMode(false)
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ação", 2), "aç...");
        assert_eq!(truncate("abc", 5), "abc");
    }

    #[test]
    fn summary_lists_failures_with_numbers() {
        let summary = RunSummary {
            documents: vec![
                DocumentSummary {
                    numero_documento: 1,
                    name: "a.pdf".into(),
                    path: "/in/a.pdf".into(),
                    state: DocumentState::Rows(2),
                },
                DocumentSummary {
                    numero_documento: 2,
                    name: "b.pdf".into(),
                    path: "/in/b.pdf".into(),
                    state: DocumentState::Failed(DocumentError::Extraction("bad xref".into())),
                },
            ],
        };
        let mut out = Vec::new();
        print_summary(&mut out, &summary, plain()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Documents processed: 2"));
        assert!(text.contains("Rows written: 2"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("#2 b.pdf [extraction failed] extraction failed: bad xref"));
    }

    #[test]
    fn progress_line_for_empty_result() {
        let mut out = Vec::new();
        let event = ProgressEvent::Structured {
            index: 0,
            total: 3,
            name: "a.pdf".into(),
            records: 0,
            elapsed: Duration::from_millis(5),
        };
        print_progress(&mut out, &event, plain()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("[1/3] a.pdf -> EMPTY (0 records"));
    }
}
