use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use docsheet_core::config_file::{self, ConfigFile};
use docsheet_core::{CanvasClient, Config, PipelineError, SchemaPolicy, StructuringService};
use docsheet_reporting::{DEFAULT_OUTPUT, DEFAULT_SHEET_NAME, ExportFormat, ReportOptions};

mod output;

use output::ColorMode;

/// docsheet - Extract structured records from batches of PDFs into one spreadsheet
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Read configuration from this TOML file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, structure and consolidate PDFs into a spreadsheet
    Run(RunArgs),

    /// Print the platform configuration file path
    ConfigPath,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// PDF files or directories of PDFs, in the order they should be numbered
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path (.xlsx, .csv or .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Canvas (extraction template) identifier
    #[arg(long)]
    canvas_id: Option<String>,

    /// API key for the structuring service
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of the structuring service
    #[arg(long)]
    base_url: Option<String>,

    /// Field under the completion content that holds the record list
    #[arg(long)]
    records_field: Option<String>,

    /// Concurrent PDF decodes (default: available CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Concurrent structuring requests
    #[arg(long)]
    structuring_concurrency: Option<usize>,

    /// What to do when a response lacks the record list: fail or empty
    #[arg(long)]
    schema_errors: Option<SchemaPolicy>,

    /// Name of the data sheet
    #[arg(long)]
    sheet_name: Option<String>,

    /// Add a "Resumo" sheet with one line per document
    #[arg(long)]
    summary_sheet: bool,

    /// Parse DARF receipts locally instead of calling the structuring service
    #[arg(long)]
    offline_darf: bool,

    /// Dry run: extract text and report sizes without structuring or writing
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let file_config = match cli.config {
        Some(ref path) => config_file::load_explicit(path)?,
        None => config_file::load_config(),
    };

    match cli.command {
        Command::ConfigPath => {
            match config_file::config_path() {
                Some(path) => println!("{}", path.display()),
                None => anyhow::bail!("no configuration directory on this platform"),
            }
            Ok(())
        }
        Command::Run(args) => run(args, file_config).await,
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docsheet=warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(
    args: &RunArgs,
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Config {
    let mut config = Config::default();
    file.apply_to(&mut config);

    if let Some(v) = env("DOCSHEET_API_KEY") {
        config.api_key = Some(v);
    }
    if let Some(v) = env("DOCSHEET_CANVAS_ID") {
        config.canvas_id = Some(v);
    }
    if let Some(v) = env("DOCSHEET_BASE_URL") {
        config.base_url = v;
    }
    if let Some(n) = env("DOCSHEET_WORKERS").and_then(|v| v.parse::<usize>().ok()) {
        config.num_workers = n.max(1);
    }

    if let Some(ref v) = args.api_key {
        config.api_key = Some(v.clone());
    }
    if let Some(ref v) = args.canvas_id {
        config.canvas_id = Some(v.clone());
    }
    if let Some(ref v) = args.base_url {
        config.base_url = v.clone();
    }
    if let Some(ref v) = args.records_field {
        config.records_field = v.clone();
    }
    if let Some(n) = args.workers {
        config.num_workers = n.max(1);
    }
    if let Some(n) = args.structuring_concurrency {
        config.structuring_concurrency = n.max(1);
    }
    if let Some(policy) = args.schema_errors {
        config.schema_policy = policy;
    }
    config
}

fn resolve_report(args: &RunArgs, file: &ConfigFile) -> (PathBuf, ReportOptions) {
    let report = file.report.clone().unwrap_or_default();
    let path = args
        .output
        .clone()
        .or_else(|| report.output_path.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let options = ReportOptions {
        sheet_name: args
            .sheet_name
            .clone()
            .or(report.sheet_name)
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
        summary_sheet: args.summary_sheet || report.summary_sheet.unwrap_or(false),
    };
    (path, options)
}

fn spawn_ctrl_c(cancel: &CancellationToken) {
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });
}

async fn run(args: RunArgs, file_config: ConfigFile) -> anyhow::Result<()> {
    let started = Instant::now();
    let color = ColorMode(!args.no_color);
    let mut stdout = std::io::stdout();

    let config = resolve_config(&args, &file_config, |k| std::env::var(k).ok());
    let (output_path, report_options) = resolve_report(&args, &file_config);
    tracing::debug!(?config, output = %output_path.display(), "resolved configuration");

    let selection = match docsheet_ingest::select_documents(&args.inputs) {
        Ok(selection) => selection,
        Err(docsheet_ingest::SelectionError::Empty { skipped }) => {
            anyhow::bail!(
                "no PDF documents selected ({} input(s) skipped); nothing to do",
                skipped
            );
        }
    };
    output::print_skipped_inputs(&mut std::io::stderr(), &selection.skipped, color)?;

    let backend = docsheet_ingest::default_backend()?;

    if args.dry_run {
        return dry_run(selection.handles, backend, &config, color).await;
    }

    let service: Arc<dyn StructuringService> = if args.offline_darf {
        Arc::new(docsheet_darf::DarfStructurer::new())
    } else {
        Arc::new(CanvasClient::from_config(&config)?)
    };

    let total = selection.handles.len();
    output::print_selection(&mut stdout, total, service.name(), color)?;

    let bar = progress_bar(total as u64);
    let progress_cb = {
        let bar = bar.clone();
        move |event: docsheet_core::ProgressEvent| {
            if matches!(
                event,
                docsheet_core::ProgressEvent::ExtractionFailed { .. }
                    | docsheet_core::ProgressEvent::Structured { .. }
                    | docsheet_core::ProgressEvent::StructuringFailed { .. }
            ) {
                bar.inc(1);
            }
            bar.suspend(|| {
                let mut out = std::io::stdout().lock();
                let _ = output::print_progress(&mut out, &event, color);
                let _ = out.flush();
            });
        }
    };

    let cancel = CancellationToken::new();
    spawn_ctrl_c(&cancel);

    let result = docsheet_core::run_pipeline(
        selection.handles,
        backend,
        service,
        &config,
        progress_cb,
        cancel,
    )
    .await;
    bar.finish_and_clear();

    let consolidation = match result {
        Ok(c) => c,
        Err(PipelineError::Cancelled) => {
            anyhow::bail!("cancelled; no report was written");
        }
        Err(e) => return Err(e.into()),
    };

    output::print_summary(&mut stdout, &consolidation.summary, color)?;

    let format = docsheet_reporting::emit(&consolidation, &output_path, &report_options)?;
    output::print_completion(
        &mut stdout,
        &output_path,
        format.label(),
        started.elapsed(),
        color,
    )?;
    if format != ExportFormat::Xlsx && report_options.summary_sheet {
        tracing::warn!(
            format = format.label(),
            "summary sheet is only written to workbooks"
        );
    }
    Ok(())
}

async fn dry_run(
    handles: Vec<docsheet_core::DocumentHandle>,
    backend: Arc<dyn docsheet_core::PdfBackend>,
    config: &Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let cancel = CancellationToken::new();
    spawn_ctrl_c(&cancel);

    let bar = progress_bar(handles.len() as u64);
    let progress_cb: Arc<dyn Fn(docsheet_core::ProgressEvent) + Send + Sync> = {
        let bar = bar.clone();
        Arc::new(move |event: docsheet_core::ProgressEvent| {
            if matches!(
                event,
                docsheet_core::ProgressEvent::Extracted { .. }
                    | docsheet_core::ProgressEvent::ExtractionFailed { .. }
            ) {
                bar.inc(1);
            }
        })
    };

    let outcomes = docsheet_core::extraction::extract_documents(
        &handles,
        backend,
        config.num_workers,
        progress_cb,
        cancel.clone(),
    )
    .await;
    bar.finish_and_clear();
    if cancel.is_cancelled() {
        anyhow::bail!("cancelled");
    }

    let mut stdout = std::io::stdout();
    output::print_dry_run(&mut stdout, &outcomes, color)?;
    writeln!(stdout, "Elapsed: {:.2?}", started.elapsed())?;
    Ok(())
}

fn progress_bar(len: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:40.cyan/dim}] {pos}/{len} documents ({elapsed})",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsheet_core::config_file::{ReportConfig, ServiceConfig};
    use std::collections::HashMap;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["docsheet", "run", "a.pdf"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn file_with_canvas(canvas: &str) -> ConfigFile {
        ConfigFile {
            service: Some(ServiceConfig {
                canvas_id: Some(canvas.into()),
                api_key: Some("from-file".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn cli_overrides_env_overrides_file() {
        let env: HashMap<&str, &str> =
            HashMap::from([("DOCSHEET_CANVAS_ID", "from-env"), ("DOCSHEET_WORKERS", "3")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let config = resolve_config(&args(&[]), &file_with_canvas("from-file"), lookup);
        assert_eq!(config.canvas_id.as_deref(), Some("from-env"));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.num_workers, 3);

        let config = resolve_config(
            &args(&["--canvas-id", "from-cli", "--workers", "0"]),
            &file_with_canvas("from-file"),
            lookup,
        );
        assert_eq!(config.canvas_id.as_deref(), Some("from-cli"));
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn schema_errors_flag_parses() {
        let config = resolve_config(
            &args(&["--schema-errors", "empty"]),
            &ConfigFile::default(),
            |_| None,
        );
        assert_eq!(config.schema_policy, SchemaPolicy::TreatAsEmpty);
    }

    #[test]
    fn report_defaults_and_overrides() {
        let (path, options) = resolve_report(&args(&[]), &ConfigFile::default());
        assert_eq!(path, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(options.sheet_name, DEFAULT_SHEET_NAME);
        assert!(!options.summary_sheet);

        let file = ConfigFile {
            report: Some(ReportConfig {
                output_path: Some("from-file.xlsx".into()),
                sheet_name: Some("Dados".into()),
                summary_sheet: Some(true),
            }),
            ..Default::default()
        };
        let (path, options) = resolve_report(&args(&["-o", "cli.csv"]), &file);
        assert_eq!(path, PathBuf::from("cli.csv"));
        assert_eq!(options.sheet_name, "Dados");
        assert!(options.summary_sheet);
    }

    #[test]
    fn run_requires_inputs() {
        assert!(Cli::try_parse_from(["docsheet", "run"]).is_err());
    }
}
