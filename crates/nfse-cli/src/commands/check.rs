//! Check command - validate the withholdings of a single invoice document.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use rust_decimal::Decimal;
use tracing::{debug, info};

use nfse_core::models::tax_id::format_tax_id;
use nfse_core::pipeline::{DocumentOutcome, DocumentProcessor, DocumentRecord, DocumentStatus, SkipReason};
use nfse_core::regime::RegimeLookup;
use nfse_core::retention::{LoadedInvoice, RetentionKind, ValidationResult};
use nfse_core::NfseError;

use crate::context::RunContext;

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Invoice XML file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Only show match flags, not expected values
    #[arg(long)]
    simple: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text report
    Text,
    /// JSON output
    Json,
}

pub fn run(args: CheckArgs, ctx: &RunContext) -> anyhow::Result<()> {
    if !args.input.is_file() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Checking file: {}", args.input.display());

    let processor = ctx.processor(!args.simple);
    let record = check_file(&args.input, &processor, &*ctx.lookup);

    let output = format_record(&record, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, plain(&output))?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if let DocumentStatus::Failed(cause) = &record.status {
        anyhow::bail!("{}", cause);
    }

    Ok(())
}

/// Read and check one file, classifying the result.
pub fn check_file(path: &Path, processor: &DocumentProcessor, lookup: &dyn RegimeLookup) -> DocumentRecord {
    let source_reference = path.display().to_string();

    let result = fs::read(path)
        .map_err(NfseError::from)
        .and_then(|data| {
            let source = String::from_utf8_lossy(&data);
            processor.process(&source, &source_reference, lookup)
        });

    debug!("Checked {}", source_reference);
    DocumentRecord::from_result(source_reference, result)
}

pub fn format_record(record: &DocumentRecord, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(record)?,
        OutputFormat::Text => format_record_text(record),
    })
}

/// Report text with terminal styling removed, for writing to files.
pub fn plain(content: &str) -> String {
    console::strip_ansi_codes(content).into_owned()
}

pub fn format_record_text(record: &DocumentRecord) -> String {
    let mut output = String::new();

    if let Some(outcome) = &record.outcome {
        output.push_str(&format_invoice_header(outcome.invoice()));
    } else {
        output.push_str(&format!("File: {}\n", record.source_reference));
    }

    match (&record.status, &record.outcome) {
        (_, Some(DocumentOutcome::Validated { invoice, result })) => {
            output.push_str("\nWithholdings:\n");
            output.push_str(&format_validation(result));
            output.push_str(&format!("Retentions: {:.2}\n", invoice.total_retained()));
        }
        (DocumentStatus::Skipped(reason), _) => {
            let reason = match reason {
                SkipReason::Cancelled => "document was cancelled",
                SkipReason::NoRetentionsExpected => "no withholdings declared",
            };
            output.push_str(&format!("\nSkipped: {}\n", reason));
        }
        (DocumentStatus::InvalidInput(cause), _) => {
            output.push_str(&format!("\nSkipped: {}\n", cause));
        }
        (DocumentStatus::Failed(cause), _) => {
            output.push_str(&format!("\nERROR: {}\n", cause));
        }
        (DocumentStatus::Validated(_), _) => {}
    }

    output
}

fn format_invoice_header(invoice: &LoadedInvoice) -> String {
    let meta = &invoice.metadata;
    let values = &invoice.values;

    let mut output = String::new();
    output.push_str(&format!(
        "File: {} / Provider: {} / Customer: {}\n",
        meta.source_reference,
        format_tax_id(&meta.provider_tax_id),
        format_tax_id(&meta.customer_tax_id)
    ));
    output.push_str(&format!("Issued: {}\n", meta.issue_date));
    output.push_str(&format!(
        "Gross: {:.2}  Net: {:.2}  IRPJ: {:.2}  CSLL: {:.2}  PIS: {:.2}  COFINS: {:.2}\n",
        values.gross_service_value,
        values.net_value,
        values.irpj,
        values.csll,
        values.pis,
        values.cofins
    ));
    output
}

fn format_validation(result: &ValidationResult) -> String {
    let mut output = String::new();

    for kind in result.kinds() {
        let flag = if result.matched(kind).unwrap_or(false) {
            style("ok").green().to_string()
        } else {
            style("MISMATCH").red().to_string()
        };

        match result.expected(kind) {
            Some(expected) => output.push_str(&format!(
                "  {:<10} expected {:>12}  {}\n",
                kind.as_str(),
                format_amount(expected),
                flag
            )),
            None => output.push_str(&format!("  {:<10} {}\n", kind.as_str(), flag)),
        }
    }

    if result.matched(RetentionKind::NetValue) == Some(false) {
        output.push_str("  net value does not match gross minus withholdings\n");
    }

    output
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
