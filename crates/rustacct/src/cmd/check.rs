//! Implementation of rustacct-check.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use rustacct_loader::load_ledger;
use rustacct_validate::{validate, ValidationError};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// JSON output for tooling integration
    Json,
}

/// A diagnostic message in JSON format.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// Id of the offending voucher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_id: Option<String>,
    /// Date of the offending voucher
    pub date: Option<NaiveDate>,
    /// Error code (e.g., "E3001")
    pub code: String,
    /// Error message
    pub message: String,
    /// Optional context information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&ValidationError> for JsonDiagnostic {
    fn from(error: &ValidationError) -> Self {
        Self {
            voucher_id: error.voucher_id.clone(),
            date: error.date,
            code: error.code.code().to_string(),
            message: error.message.clone(),
            context: error.context.clone(),
        }
    }
}

/// JSON output structure for all diagnostics.
#[derive(Debug, Serialize)]
pub struct JsonOutput {
    /// List of diagnostics
    pub diagnostics: Vec<JsonDiagnostic>,
    /// Number of vouchers checked
    pub voucher_count: usize,
    /// Total error count
    pub error_count: usize,
}

/// Check every voucher of a ledger file.
#[derive(Parser, Debug)]
#[command(name = "rustacct-check")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The ledger file to check (a JSON array of vouchers)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Show verbose output including timing information
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output (just use exit code)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format (text or json)
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    pub format: OutputFormat,
}

fn describe(error: &ValidationError) -> String {
    let id = error.voucher_id.as_deref().unwrap_or("<no id>");
    let date = error
        .date
        .map_or_else(|| "[null]".to_string(), |d| d.to_string());
    match &error.context {
        Some(context) => format!("{date} {id}: {error} ({context})"),
        None => format!("{date} {id}: {error}"),
    }
}

/// Check `args.file`, writing diagnostics to `out`.
///
/// Exits with 1 when any voucher is invalid.
pub fn run<W: Write>(args: &Args, out: &mut W) -> Result<ExitCode> {
    let start = std::time::Instant::now();
    let vouchers = load_ledger(&args.file)?;
    let errors = validate(&vouchers);
    tracing::debug!(
        vouchers = vouchers.len(),
        errors = errors.len(),
        elapsed = ?start.elapsed(),
        "check complete"
    );

    if !args.quiet {
        match args.format {
            OutputFormat::Json => {
                let output = JsonOutput {
                    diagnostics: errors.iter().map(JsonDiagnostic::from).collect(),
                    voucher_count: vouchers.len(),
                    error_count: errors.len(),
                };
                serde_json::to_writer_pretty(&mut *out, &output)
                    .context("failed to write JSON output")?;
                writeln!(out)?;
            }
            OutputFormat::Text => {
                for error in &errors {
                    writeln!(out, "{}", describe(error))?;
                }
                if errors.is_empty() {
                    writeln!(out, "{} vouchers, no errors", vouchers.len())?;
                } else {
                    writeln!(out, "{} vouchers, {} errors", vouchers.len(), errors.len())?;
                }
                if args.verbose {
                    writeln!(out, "checked in {:.2?}", start.elapsed())?;
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

/// Main entry point for the check command.
pub fn main() -> ExitCode {
    let args = Args::parse();
    if args.verbose {
        super::init_verbose_logging();
    }

    let mut stdout = io::stdout().lock();
    match run(&args, &mut stdout) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
