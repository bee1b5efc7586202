//! dropzone - Copy files through a bounded-concurrency upload queue.
//!
//! Usage:
//!   dropzone upload <PATHS>... --dest DIR   Upload files into a directory
//!   dropzone check <PATHS>...               Validate files without uploading
//!   dropzone settings [--init]              Show or create the settings file
//!   dropzone --help                         Show help

mod settings;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use dropzone_core::{format_file_size, QueueConfig, SelectionConfig, SourceFile, UploadStats};
use dropzone_queue::{BatchReport, LocalCopyTransfer, QueueEvent, UploadQueue};
use dropzone_select::{supported_types_text, FileSelection};

use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "dropzone",
    version,
    about = "Copy files through a bounded-concurrency upload queue",
    long_about = "dropzone validates a set of files and uploads them with a limited number \
                  of transfers in flight, showing progress as it goes.\n\n\
                  Defaults come from the settings file (see `dropzone settings`); \
                  command-line flags override it. Press Ctrl-C to cancel all uploads."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files into a destination directory
    Upload {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Destination directory (created if missing)
        #[arg(short, long)]
        dest: PathBuf,

        /// Maximum number of uploads running at once
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,

        /// Delay after every copied chunk, in milliseconds
        #[arg(long, default_value = "0")]
        throttle_ms: u64,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate files against the selection rules without uploading
    Check {
        /// Files to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the settings file location and its effective contents
    Settings {
        /// Write the default settings if no file exists yet
        #[arg(long)]
        init: bool,
    },
}

/// Selection rules shared by `upload` and `check`.
#[derive(Args)]
struct SelectionArgs {
    /// Accepted file types (e.g., ".png,.jpg")
    #[arg(short, long, value_delimiter = ',')]
    accept: Vec<String>,

    /// Maximum number of files
    #[arg(long)]
    max_files: Option<usize>,

    /// Maximum size per file (e.g., "500KB", "10MB")
    #[arg(long)]
    max_size: Option<String>,
}

impl SelectionArgs {
    /// Layer these flags over the configured defaults.
    fn apply(&self, base: SelectionConfig) -> Result<SelectionConfig> {
        let max_file_size = match &self.max_size {
            Some(size) => Some(parse_size(size).with_context(|| format!("Invalid size: {size}"))?),
            None => base.max_file_size,
        };
        let accepted_file_types = if self.accept.is_empty() {
            base.accepted_file_types
        } else {
            self.accept.clone()
        };

        SelectionConfig::builder()
            .multiple(base.multiple)
            .accepted_file_types(accepted_file_types)
            .max_files(self.max_files.unwrap_or(base.max_files))
            .max_file_size(max_file_size)
            .build()
            .context("Invalid selection options")
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command {
        Command::Upload {
            paths,
            dest,
            max_concurrent,
            throttle_ms,
            selection,
            format,
        } => {
            let selection = selection.apply(settings.selection)?;
            let queue = match max_concurrent {
                Some(n) => QueueConfig::builder()
                    .max_concurrent(n)
                    .cancel_grace_ms(settings.queue.cancel_grace_ms)
                    .build()
                    .context("Invalid queue options")?,
                None => settings.queue,
            };
            run_upload(&paths, dest, selection, queue, throttle_ms, format).await?;
        }
        Command::Check {
            paths,
            selection,
            format,
        } => {
            run_check(&paths, selection.apply(settings.selection)?, format)?;
        }
        Command::Settings { init } => {
            run_settings(settings, init)?;
        }
    }

    Ok(())
}

/// Describe every path and validate them as one selection.
fn select_files(paths: &[PathBuf], config: SelectionConfig) -> Result<FileSelection> {
    let files = paths
        .iter()
        .map(|p| SourceFile::from_path(p).with_context(|| format!("Cannot read {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let mut selection = FileSelection::new(config);
    selection.add_files(files).context("Selection rejected")?;
    Ok(selection)
}

/// Upload the files and print the outcome.
async fn run_upload(
    paths: &[PathBuf],
    dest: PathBuf,
    selection: SelectionConfig,
    config: QueueConfig,
    throttle_ms: u64,
    format: OutputFormat,
) -> Result<()> {
    let mut selection = select_files(paths, selection)?;

    tokio::fs::create_dir_all(&dest)
        .await
        .with_context(|| format!("Cannot create {}", dest.display()))?;

    let transfer = LocalCopyTransfer::new(&dest).with_throttle(Duration::from_millis(throttle_ms));
    let queue = UploadQueue::new(config, transfer);
    let mut events = queue.subscribe();

    {
        let queue = queue.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                eprintln!("Cancelling uploads...");
                queue.cancel_all();
            }
        });
    }

    let files = selection.take();
    let count = files.len();
    let Some(handle) = queue.start(files) else {
        eprintln!("Nothing to upload.");
        return Ok(());
    };

    if matches!(format, OutputFormat::Text) {
        eprintln!("Uploading {} file(s) to {}...", count, dest.display());
    }

    let report = loop {
        match events.recv().await {
            Ok(QueueEvent::Progress(records)) => {
                if matches!(format, OutputFormat::Text) {
                    let stats = UploadStats::from_records(&records);
                    let title = stats.overall_title(true, queue.is_cancelling());
                    eprint!(
                        "\r {} ({}/{}, {}%)   ",
                        title,
                        stats.finished(),
                        stats.total,
                        stats.average_progress
                    );
                    let _ = std::io::stderr().flush();
                }
            }
            Ok(QueueEvent::Complete(report)) => break report,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress display lagged");
            }
            Err(RecvError::Closed) => bail!("Upload queue closed before completion"),
        }
    };
    handle.wait().await;

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    let stats = report.stats();
    if stats.failed > 0 || stats.cancelled > 0 {
        bail!("{} of {} uploads did not complete", stats.total - stats.completed, stats.total);
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    eprintln!();
    println!("{}", "─".repeat(60));
    for (record, result) in report.records.iter().zip(&report.results) {
        let detail = match result.data.as_ref().and_then(|d| d.get("path")) {
            Some(path) => path.as_str().unwrap_or_default().to_string(),
            None => record.status_message(),
        };
        println!(" {:<10} {:<30} {}", record.status, record.file_name, detail);
    }
    println!("{}", "─".repeat(60));
    println!(" {}", report.summary());
}

/// Validate files and print the selection summary.
fn run_check(paths: &[PathBuf], config: SelectionConfig, format: OutputFormat) -> Result<()> {
    let selection = select_files(paths, config)?;
    let stats = selection.stats();

    match format {
        OutputFormat::Text => {
            println!(
                " {} file(s), {} total",
                stats.count,
                format_file_size(stats.total_size)
            );
            println!(" Limit: {} file(s)", stats.max_files);
            if let Some(limit) = selection.config().max_file_size {
                println!(" Max size: {}", format_file_size(limit));
            }
            println!(" {}", supported_types_text(&selection.config().accepted_file_types));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Print the settings location and effective values.
fn run_settings(settings: Settings, init: bool) -> Result<()> {
    let Some(path) = Settings::config_path() else {
        bail!("No config directory on this platform");
    };

    if init && !path.exists() {
        settings.save().context("Failed to write settings")?;
        eprintln!("Wrote {}", path.display());
    }

    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

/// Parse a size string (e.g., "1KB", "10MB", "512").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let multiplier: u64 = match s[digits.len()..].trim_end_matches('B') {
        "" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        unit => bail!("Unknown size unit: {unit}"),
    };
    let num: f64 = digits.trim().parse()?;
    if num < 0.0 {
        bail!("Size cannot be negative");
    }
    Ok((num * multiplier as f64) as u64)
}
