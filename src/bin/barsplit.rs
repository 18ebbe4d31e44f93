//! CLI binary for barsplit.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `SplitterConfig`, runs each input through the engine and prints results.

use anyhow::{Context, Result};
use barsplit::{
    split_document_async, DecoderBackend, DocumentSource, DocumentSplitter, SplitOutcome,
    SplitPlan, SplitRequest, SplitterConfig,
};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Split a batch dropped in the consume folder (pieces land next to it)
  barsplit /srv/consume/batch.pdf

  # Split on ASN labels too, and name the pieces 0_invoice.pdf, 1_invoice.pdf, …
  barsplit --asn --override-name invoice.pdf /srv/consume/batch.pdf

  # Uploaded file: pieces go to the consumption directory
  barsplit --source api-upload --consumption-dir /srv/consume /tmp/upload.pdf

  # Multi-page TIFF with QR separators only
  barsplit --tiff --backend rqrr scan.tiff

  # Show the barcodes and split points without writing anything
  barsplit --dry-run --json batch.pdf

ENVIRONMENT VARIABLES:
  BARSPLIT_*        Every flag has a BARSPLIT_<FLAG> fallback, e.g. BARSPLIT_DPI
  PDFIUM_LIB_PATH   Path to an existing libpdfium
  RUST_LOG          Overrides the log filter chosen by -v / -q
"#;

/// Split scanned documents at barcode separator and ASN pages.
#[derive(Parser, Debug)]
#[command(
    name = "barsplit",
    version,
    about = "Split scanned PDF and TIFF files at barcode separator pages",
    long_about = "Scan every page of a PDF (or multi-page TIFF) for barcodes and cut the file \
into separate documents: separator pages are dropped, pages carrying an Archive Serial Number \
barcode start a new document. Files without split points are left untouched.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to split.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// MIME type of every input. Guessed from the file extension when unset.
    #[arg(long, env = "BARSPLIT_MIME")]
    mime: Option<String>,

    /// Where the inputs came from. Selects the destination directory.
    #[arg(long, env = "BARSPLIT_SOURCE", value_enum, default_value = "consume-folder")]
    source: SourceArg,

    /// Destination for pieces of documents not taken from the consume folder.
    #[arg(long, env = "BARSPLIT_CONSUMPTION_DIR")]
    consumption_dir: Option<PathBuf>,

    /// Name pieces `<index>_<NAME>` instead of `<stem>_document_<index>.pdf`.
    #[arg(long, env = "BARSPLIT_OVERRIDE_NAME")]
    override_name: Option<String>,

    /// Do not scan at all; every input is reported as not split.
    #[arg(long, env = "BARSPLIT_DISABLED")]
    disabled: bool,

    /// Accept TIFF input.
    #[arg(long, env = "BARSPLIT_TIFF")]
    tiff: bool,

    /// Barcode value marking a separator page.
    #[arg(long, env = "BARSPLIT_SEPARATOR", default_value = "PATCHT")]
    separator: String,

    /// Also split before pages carrying an ASN barcode.
    #[arg(long, env = "BARSPLIT_ASN")]
    asn: bool,

    /// Prefix identifying ASN barcodes.
    #[arg(long, env = "BARSPLIT_ASN_PREFIX", default_value = "ASN")]
    asn_prefix: String,

    /// Barcode decoder: rxing (1D and 2D) or rqrr (QR only).
    #[arg(long, env = "BARSPLIT_BACKEND", value_enum, default_value = "rxing")]
    backend: BackendArg,

    /// Rendering DPI (72–600).
    #[arg(long, env = "BARSPLIT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Scan only the first N pages (0 = all).
    #[arg(long, env = "BARSPLIT_MAX_PAGES", default_value_t = 0)]
    max_pages: usize,

    /// Enlarge page images by this factor before decoding (≤ 1 disables, at most 8).
    #[arg(long, env = "BARSPLIT_UPSCALE", default_value_t = 0.0)]
    upscale: f32,

    /// Parent directory for per-document working copies.
    #[arg(long, env = "BARSPLIT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Path to the pdfium shared library.
    #[arg(long, env = "BARSPLIT_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "BARSPLIT_JOBS", default_value_t = 1)]
    jobs: usize,

    /// Report barcodes and split points without writing anything.
    #[arg(long, env = "BARSPLIT_DRY_RUN")]
    dry_run: bool,

    /// Delete an input after it was split successfully.
    #[arg(long, env = "BARSPLIT_DELETE_ORIGINAL", conflicts_with = "dry_run")]
    delete_original: bool,

    /// Print one JSON report for all inputs.
    #[arg(long, env = "BARSPLIT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BARSPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BARSPLIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BARSPLIT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    ApiUpload,
    ConsumeFolder,
    MailFetch,
    MobileApp,
    WebUi,
}

impl From<SourceArg> for DocumentSource {
    fn from(v: SourceArg) -> Self {
        match v {
            SourceArg::ApiUpload => DocumentSource::ApiUpload,
            SourceArg::ConsumeFolder => DocumentSource::ConsumeFolder,
            SourceArg::MailFetch => DocumentSource::MailFetch,
            SourceArg::MobileApp => DocumentSource::MobileApp,
            SourceArg::WebUi => DocumentSource::WebUi,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Rxing,
    Rqrr,
}

impl From<BackendArg> for DecoderBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Rxing => DecoderBackend::Rxing,
            BackendArg::Rqrr => DecoderBackend::Rqrr,
        }
    }
}

/// Result for one input, as printed with `--json`.
#[derive(Debug, Serialize)]
struct FileReport {
    input: PathBuf,
    mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SplitOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<SplitPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    original_deleted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    let bar = if show_progress {
        new_bar(cli.inputs.len())
    } else {
        ProgressBar::hidden()
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let jobs = cli.jobs.max(1);
    let reports: Vec<FileReport> = stream::iter(cli.inputs.iter().cloned())
        .map(|input| {
            let config = config.clone();
            let cli = &cli;
            let bar = bar.clone();
            async move {
                bar.set_message(input.display().to_string());
                let report = process(cli, input, config).await;
                if !cli.json && !cli.quiet {
                    if bar.is_hidden() {
                        eprintln!("{}", summary_line(&report));
                    } else {
                        bar.println(summary_line(&report));
                    }
                }
                bar.inc(1);
                report
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;
    bar.finish_and_clear();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise report")?
        );
    }

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} inputs failed", reports.len());
    }
    if !cli.quiet && !cli.json {
        let split = reports
            .iter()
            .filter(|r| r.outcome.as_ref().is_some_and(SplitOutcome::did_split))
            .count();
        eprintln!(
            "{} {} inputs processed, {} split",
            green("✔"),
            bold(&reports.len().to_string()),
            split
        );
    }
    Ok(())
}

/// Run one input through the engine.
async fn process(cli: &Cli, input: PathBuf, config: SplitterConfig) -> FileReport {
    let mime_type = cli.mime.clone().unwrap_or_else(|| guess_mime(&input));
    let mut report = FileReport {
        input: input.clone(),
        mime_type: mime_type.clone(),
        outcome: None,
        plan: None,
        error: None,
        original_deleted: false,
    };

    if cli.dry_run {
        let path = input.clone();
        let inspected = tokio::task::spawn_blocking(move || {
            DocumentSplitter::new(config).inspect(&path, &mime_type)
        })
        .await;
        match inspected {
            Ok(Ok(plan)) => report.plan = Some(plan),
            Ok(Err(e)) => report.error = Some(e.to_string()),
            Err(e) => report.error = Some(format!("inspection task panicked: {e}")),
        }
        return report;
    }

    let mut request = SplitRequest::new(&input, mime_type, cli.source.into());
    if let Some(name) = &cli.override_name {
        request = request.with_override_filename(name);
    }

    match split_document_async(request, config).await {
        Ok(outcome) => {
            if cli.delete_original && outcome.did_split() {
                match std::fs::remove_file(&input) {
                    Ok(()) => report.original_deleted = true,
                    Err(e) => {
                        report.error = Some(format!("split, but cannot delete original: {e}"))
                    }
                }
            }
            report.outcome = Some(outcome);
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

/// Map CLI args to `SplitterConfig`.
fn build_config(cli: &Cli) -> Result<SplitterConfig> {
    let mut builder = SplitterConfig::builder()
        .enabled(!cli.disabled)
        .tiff_support(cli.tiff)
        .separator_string(cli.separator.clone())
        .enable_asn(cli.asn)
        .asn_prefix(cli.asn_prefix.clone())
        .backend(cli.backend.into())
        .dpi(cli.dpi)
        .max_pages(cli.max_pages)
        .upscale(cli.upscale);

    if let Some(dir) = &cli.consumption_dir {
        builder = builder.consumption_dir(dir);
    }
    if let Some(dir) = &cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(lib) = &cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }

    builder.build().context("Invalid configuration")
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn new_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  \
         [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}  {wide_msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
    bar.set_style(style);
    bar.set_prefix("Scanning");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn summary_line(report: &FileReport) -> String {
    let name = report.input.display().to_string();
    if let Some(err) = &report.error {
        return format!("  {} {}  {}", red("✗"), name, red(err));
    }
    if let Some(plan) = &report.plan {
        let points: Vec<String> = plan
            .split_map
            .iter()
            .map(|(page, keep)| format!("{page}{}", if keep { "+" } else { "-" }))
            .collect();
        return format!(
            "  {} {}  {} pages, {} barcodes, split points [{}]",
            dim("·"),
            name,
            plan.pages_scanned,
            plan.marks.len(),
            points.join(" ")
        );
    }
    match &report.outcome {
        Some(SplitOutcome::Split { documents }) => {
            let mut line = format!(
                "  {} {}  → {} documents",
                green("✓"),
                name,
                bold(&documents.len().to_string())
            );
            for doc in documents {
                line.push_str(&format!("\n      {}", dim(&doc.display().to_string())));
            }
            line
        }
        Some(SplitOutcome::NotSplit(reason)) => {
            format!("  {} {}  {}", dim("·"), name, dim(&format!("not split ({reason:?})")))
        }
        None => format!("  {} {}", dim("·"), name),
    }
}
