//! Batch command - check every invoice document in a directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info};

use nfse_core::models::config::NfseConfig;
use nfse_core::pipeline::{BatchReport, DocumentOutcome, DocumentRecord, DocumentStatus};

use super::check::{check_file, format_record, plain, OutputFormat};
use crate::context::RunContext;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Directory of invoice files, or a glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory for per-document reports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each document
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also write a summary CSV to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Number of parallel workers (default from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Process every file, not only configured extensions
    #[arg(long)]
    all_files: bool,

    /// Only print the final report
    #[arg(short, long)]
    quiet: bool,

    /// Exit with an error status when any document fails
    #[arg(long)]
    fail_on_error: bool,
}

pub fn run(args: BatchArgs, ctx: &RunContext) -> anyhow::Result<()> {
    let start = Instant::now();

    let files = collect_files(&args.input, &ctx.config, args.all_files)?;

    if files.is_empty() {
        anyhow::bail!("No invoice files found in: {}", args.input);
    }

    println!(
        "{} Found {} files to check",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );
    if args.quiet {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let jobs = args.jobs.unwrap_or(ctx.config.batch.jobs).max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    debug!("Checking with {} workers", jobs);

    let processor = ctx.processor(true);
    let lookup = &*ctx.lookup;

    let records: Vec<DocumentRecord> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let record = check_file(path, &processor, lookup);
                progress.inc(1);
                record
            })
            .collect()
    });

    progress.finish_and_clear();

    let mut report: BatchReport = records.into_iter().collect();
    report.sort();

    for record in report.records() {
        let content = format_record(record, args.format)?;

        if let Some(output_dir) = &args.output_dir {
            let output_path = output_dir.join(output_name(&record.source_reference, args.format));
            fs::write(&output_path, plain(&content))?;
            debug!("Wrote output to {}", output_path.display());
        } else if !args.quiet {
            println!("{}", "--".repeat(40));
            println!("{}", content);
        }
    }

    if let Some(summary_path) = &args.summary {
        write_summary(summary_path, &report)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    print_report(&report, start);

    if args.fail_on_error && report.failure_count() > 0 {
        anyhow::bail!("{} documents failed", report.failure_count());
    }

    Ok(())
}

/// Files of a directory (non-file entries skipped), or matches of a glob pattern.
fn collect_files(input: &str, config: &NfseConfig, all_files: bool) -> anyhow::Result<Vec<PathBuf>> {
    let input_path = Path::new(input);

    let candidates: Vec<PathBuf> = if input_path.is_dir() {
        fs::read_dir(input_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect()
    } else {
        glob(input)?.filter_map(|r| r.ok()).collect()
    };

    let mut files: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|p| p.is_file())
        .filter(|p| {
            all_files
                || p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| config.accepts_extension(ext))
        })
        .collect();

    files.sort();
    info!("Collected {} files from {}", files.len(), input);
    Ok(files)
}

fn output_name(source_reference: &str, format: OutputFormat) -> String {
    let stem = Path::new(source_reference)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");

    let extension = match format {
        OutputFormat::Json => "json",
        OutputFormat::Text => "txt",
    };

    format!("{}.{}", stem, extension)
}

fn print_report(report: &BatchReport, start: Instant) {
    println!();
    println!(
        "{} Checked {} files in {:?}",
        style("✓").green(),
        report.len(),
        start.elapsed()
    );
    println!(
        "   {} validated, {} skipped, {} without identifiers, {} failed",
        style(report.validated_count()).green(),
        style(report.skipped_count()).yellow(),
        style(report.skipped_inputs().len()).yellow(),
        style(report.failure_count()).red()
    );

    println!();
    println!("Errors: {}", report.failure_count());
    for message in report.failure_messages() {
        println!("  ERROR: {}", message);
    }
}

fn write_summary(path: &Path, report: &BatchReport) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "file",
        "status",
        "provider",
        "customer",
        "issue_date",
        "gross",
        "net",
        "total_retained",
        "error",
    ])?;

    for record in report.records() {
        let (status, error) = match &record.status {
            DocumentStatus::Validated(true) => ("validated", ""),
            DocumentStatus::Validated(false) => ("net_mismatch", ""),
            DocumentStatus::Skipped(_) => ("skipped", ""),
            DocumentStatus::InvalidInput(cause) => ("invalid_input", cause.as_str()),
            DocumentStatus::Failed(cause) => ("error", cause.as_str()),
        };

        let fields: Vec<String> = match record.outcome.as_ref().map(DocumentOutcome::invoice) {
            Some(invoice) => vec![
                invoice.metadata.provider_tax_id.clone(),
                invoice.metadata.customer_tax_id.clone(),
                invoice.metadata.issue_date.to_string(),
                format!("{:.2}", invoice.values.gross_service_value),
                format!("{:.2}", invoice.values.net_value),
                format!("{:.2}", invoice.total_retained()),
            ],
            None => vec![String::new(); 6],
        };

        let mut row = vec![record.source_reference.as_str(), status];
        row.extend(fields.iter().map(String::as_str));
        row.push(error);
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
