use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use citeverify_core::bibliography::DEFAULT_KEYWORDS;
use citeverify_core::{
    Cascade, CheckStats, CheckedReference, Config, ExtractionResult, GeminiClient, PdfBackend,
    ProgressEvent, RateLimiters, Reference, ReqwestFetcher, config_file,
    extract_structured_references, find_bibliography_section,
};
use citeverify_pdf_mupdf::MupdfBackend;
use citeverify_reporting::{ExportFormat, SummaryRow, export_results, write_summary_csv};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Citation verifier - check that the references of academic PDFs exist
#[derive(Parser, Debug)]
#[command(name = "citeverify", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the references of a single PDF
    Check {
        /// Path to the PDF to check
        file_path: PathBuf,

        #[command(flatten)]
        options: CheckOptions,

        /// Write the per-reference report to this file
        #[arg(long)]
        export: Option<PathBuf>,

        /// Report format (csv, json, markdown); inferred from --export when omitted
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Path to output log file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dry run: extract and print references without verifying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Check every PDF in a folder and write a summary CSV
    CheckFolder {
        /// Folder containing the PDFs
        dir: PathBuf,

        #[command(flatten)]
        options: CheckOptions,

        /// Summary CSV, rewritten after each file
        #[arg(long, default_value = "citeverify-summary.csv")]
        summary: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct CheckOptions {
    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Gemini API key
    #[arg(long)]
    gemini_key: Option<String>,

    /// Semantic Scholar API key
    #[arg(long)]
    s2_api_key: Option<String>,

    /// Contact email for the Crossref polite pool
    #[arg(long)]
    crossref_mailto: Option<String>,

    /// Comma-separated list of sources to disable
    #[arg(long, value_delimiter = ',')]
    disable_sources: Vec<String>,

    /// Number of references checked concurrently
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            file_path,
            options,
            export,
            format,
            output,
            dry_run,
        } => check(file_path, options, export, format, output, dry_run).await,
        Command::CheckFolder {
            dir,
            options,
            summary,
        } => check_folder(dir, options, summary).await,
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(options: &CheckOptions) -> Config {
    let mut config = Config::default();
    config_file::load_config().apply_to(&mut config);
    apply_overrides(&mut config, options, |name| std::env::var(name).ok());
    config
}

fn apply_overrides(
    config: &mut Config,
    options: &CheckOptions,
    env: impl Fn(&str) -> Option<String>,
) {
    let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")) {
        config.gemini_api_key = Some(key);
    }
    if let Some(key) = lookup("S2_API_KEY") {
        config.s2_api_key = Some(key);
    }
    if let Some(mailto) = lookup("CROSSREF_MAILTO") {
        config.crossref_mailto = Some(mailto);
    }

    if let Some(key) = &options.gemini_key {
        config.gemini_api_key = Some(key.clone());
    }
    if let Some(key) = &options.s2_api_key {
        config.s2_api_key = Some(key.clone());
    }
    if let Some(mailto) = &options.crossref_mailto {
        config.crossref_mailto = Some(mailto.clone());
    }
    if !options.disable_sources.is_empty() {
        config.disabled_sources = options.disable_sources.clone();
    }
    if let Some(n) = options.workers {
        config.num_workers = n.max(1);
    }

    config.rate_limiters = Arc::new(RateLimiters::new(
        config.crossref_mailto.is_some(),
        config.s2_api_key.is_some(),
    ));
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_from_extension(path: &Path) -> Option<ExportFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse().ok())
}

/// Cancel the returned token on Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });
    cancel
}

/// PDF text, bibliography section, then model-structured references.
async fn extract(
    path: &Path,
    model: &GeminiClient,
    config: &Config,
) -> anyhow::Result<ExtractionResult> {
    let text = MupdfBackend::new()
        .extract_text(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let section = find_bibliography_section(&text, &DEFAULT_KEYWORDS)?;
    tracing::debug!(chars = section.len(), "bibliography section located");
    Ok(extract_structured_references(section, model, &config.retry, &config.rate_limiters).await?)
}

/// Run the cascade over `refs` behind a progress bar on stderr.
async fn verify(
    refs: Vec<Reference>,
    cascade: Arc<Cascade>,
    config: &Config,
    color: ColorMode,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<CheckedReference>> {
    let bar = ProgressBar::new(refs.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/dim}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let progress = {
        let bar = bar.clone();
        move |event: ProgressEvent| {
            match &event {
                ProgressEvent::Checking { title, .. } => bar.set_message(title.clone()),
                ProgressEvent::Result { .. } => bar.inc(1),
                ProgressEvent::Cancelled { .. } => {}
            }
            if let Some(line) = output::format_progress(&event, color) {
                if bar.is_hidden() {
                    eprintln!("{}", line);
                } else {
                    bar.println(line);
                }
            }
        }
    };

    let results =
        citeverify_core::check_references(refs, cascade, config.num_workers, progress, cancel)
            .await;
    bar.finish_and_clear();
    Ok(results)
}

async fn check(
    file_path: PathBuf,
    options: CheckOptions,
    export: Option<PathBuf>,
    format: Option<ExportFormat>,
    output: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let config = resolve_config(&options);
    tracing::debug!(?config, "configuration resolved");

    let color = ColorMode(!options.no_color && output.is_none());
    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    let model = config.gemini_client(ReqwestFetcher::default_client())?;
    let file_name = display_name(&file_path);
    let extraction = extract(&file_path, &model, &config).await?;

    if dry_run {
        output::print_dry_run(
            &mut writer,
            &file_name,
            &extraction.references,
            &extraction.skip_stats,
            color,
        )?;
        return Ok(());
    }

    output::print_extraction_summary(
        &mut writer,
        &file_name,
        extraction.references.len(),
        &extraction.skip_stats,
        color,
    )?;

    if extraction.references.is_empty() {
        writeln!(writer, "No references to check.")?;
        return Ok(());
    }

    let cascade = Arc::new(Cascade::from_config(&config)?);
    let results = verify(
        extraction.references,
        cascade,
        &config,
        color,
        cancel_on_ctrl_c(),
    )
    .await?;

    let stats = CheckStats::from_results(&results);
    output::print_warning_report(&mut writer, &results, color)?;
    output::print_summary(&mut writer, &stats, &extraction.skip_stats, color)?;

    if let Some(path) = export {
        let format = format
            .or_else(|| format_from_extension(&path))
            .unwrap_or(ExportFormat::Csv);
        export_results(&file_name, &results, format, &path).map_err(anyhow::Error::msg)?;
        writeln!(
            writer,
            "{} report written to {}",
            format.label(),
            path.display()
        )?;
    }

    Ok(())
}

/// PDFs directly inside `dir`, sorted by name.
fn list_pdfs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

async fn check_folder(dir: PathBuf, options: CheckOptions, summary: PathBuf) -> anyhow::Result<()> {
    let pdfs = list_pdfs(&dir)?;
    let config = resolve_config(&options);
    let color = ColorMode(!options.no_color);
    let mut stdout = std::io::stdout();

    writeln!(stdout, "Found {} PDF files in {}", pdfs.len(), dir.display())?;
    if pdfs.is_empty() {
        return Ok(());
    }

    let model = config.gemini_client(ReqwestFetcher::default_client())?;
    let cascade = Arc::new(Cascade::from_config(&config)?);
    let cancel = cancel_on_ctrl_c();
    let mut rows = Vec::with_capacity(pdfs.len());

    for pdf in &pdfs {
        if cancel.is_cancelled() {
            break;
        }
        let name = display_name(pdf);
        writeln!(stdout, "Checking file: {}", name)?;

        let row = match extract(pdf, &model, &config).await {
            Ok(extraction) => {
                output::print_extraction_summary(
                    &mut stdout,
                    &name,
                    extraction.references.len(),
                    &extraction.skip_stats,
                    color,
                )?;
                let results = verify(
                    extraction.references,
                    Arc::clone(&cascade),
                    &config,
                    color,
                    cancel.clone(),
                )
                .await?;
                output::print_summary(
                    &mut stdout,
                    &CheckStats::from_results(&results),
                    &extraction.skip_stats,
                    color,
                )?;
                SummaryRow::from_results(&name, &results)
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %format!("{:#}", e), "could not process file");
                writeln!(stdout, "Error: {:#}", e)?;
                SummaryRow::failed(&name, &format!("{:#}", e))
            }
        };
        writeln!(stdout, "{}", "-".repeat(50))?;

        rows.push(row);
        write_summary_csv(&rows, &summary).map_err(anyhow::Error::msg)?;
    }

    writeln!(stdout, "Results saved to {}", summary.display())?;
    Ok(())
}
