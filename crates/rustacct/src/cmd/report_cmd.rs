//! rustacct-report - Run subtotal reports over a ledger.
//!
//! # Usage
//!
//! ```bash
//! rustacct-report -c options.json -l ledger.json -t meals --by month,content
//! rustacct-report -c options.json -l ledger.json -q '{"op": "atom", "title": 1002}' \
//!     --by currency --consolidate --as-of 2024-12-31
//! rustacct-report -c options.json -l ledger.json -t cash --mode every-day \
//!     --start 2024-01-01 --end 2024-01-31
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use rustacct_core::DateFilter;
use rustacct_loader::{load, LoadResult};
use rustacct_query::{
    compile, consolidate, format_consolidated, format_text, run as run_subtotal, to_json_string,
    Aggregation, GroupBy, QueryExpr, ResolvedQuery, SubtotalSpec,
};
use rustacct_store::MemoryLedger;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// A grouping level on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    /// Currency code
    Currency,
    /// Account code
    Title,
    /// Sub-account code
    SubTitle,
    /// Content text
    Content,
    /// Detail remark
    Remark,
    /// Owner
    User,
    /// Voucher kind
    Kind,
    /// Voucher date
    Day,
    /// ISO week
    Week,
    /// Calendar month
    Month,
    /// Calendar year
    Year,
}

impl From<Level> for GroupBy {
    fn from(level: Level) -> Self {
        match level {
            Level::Currency => Self::Currency,
            Level::Title => Self::Title,
            Level::SubTitle => Self::SubTitle,
            Level::Content => Self::Content,
            Level::Remark => Self::Remark,
            Level::User => Self::User,
            Level::Kind => Self::Kind,
            Level::Day => Self::Day,
            Level::Week => Self::Week,
            Level::Month => Self::Month,
            Level::Year => Self::Year,
        }
    }
}

/// Aggregation mode on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Sum of amounts
    #[default]
    Sum,
    /// Number of matched details
    Count,
    /// Sum, hiding buckets that net to zero
    NonZero,
    /// Running balance for every day of the range
    EveryDay,
}

impl From<Mode> for Aggregation {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sum => Self::Sum,
            Mode::Count => Self::Count,
            Mode::NonZero => Self::NonZero,
            Mode::EveryDay => Self::EveryDay,
        }
    }
}

/// Run a subtotal report over a ledger.
#[derive(Parser, Debug)]
#[command(name = "rustacct-report")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The options file (currencies, templates, prices)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// The ledger file (a JSON array of vouchers)
    #[arg(short, long, value_name = "FILE")]
    pub ledger: PathBuf,

    /// Name of the query template to run
    #[arg(short, long, required_unless_present = "query", conflicts_with = "query")]
    pub template: Option<String>,

    /// Inline query expression, as JSON
    #[arg(short, long)]
    pub query: Option<String>,

    /// Scale every amount by this factor
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    pub coefficient: Decimal,

    /// Grouping levels, outermost first
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub by: Vec<Level>,

    /// Aggregation mode
    #[arg(short, long, value_enum, default_value = "sum")]
    pub mode: Mode,

    /// First date of the report range
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last date of the report range
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Also count undated vouchers in a bounded range
    #[arg(long)]
    pub include_undated: bool,

    /// Sort buckets by key instead of first appearance
    #[arg(long)]
    pub sorted: bool,

    /// Convert into a single currency (requires `--by currency`)
    #[arg(long)]
    pub consolidate: bool,

    /// Currency to convert into; defaults to the configured reporting currency
    #[arg(long, value_name = "CUR")]
    pub reporting: Option<String>,

    /// Date for rate lookups of undated buckets; defaults to --end, then today
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Show verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// The report range given by `--start`, `--end` and `--include-undated`.
    pub fn range(&self) -> Option<DateFilter> {
        let range = match (self.start, self.end) {
            (Some(start), Some(end)) => DateFilter::between(start, end),
            (Some(start), None) => DateFilter::since(start),
            (None, Some(end)) => DateFilter::until(end),
            (None, None) => return None,
        };
        Some(if self.include_undated {
            range.with_nullable()
        } else {
            range
        })
    }

    /// The subtotal to compute.
    pub fn subtotal_spec(&self) -> SubtotalSpec {
        let mut spec = SubtotalSpec::new(self.by.iter().copied().map(GroupBy::from).collect())
            .with_aggregation(self.mode.into());
        if let Some(range) = self.range() {
            spec = spec.with_range(range);
        }
        if self.sorted {
            spec = spec.sorted();
        }
        spec
    }
}

fn resolve_query(args: &Args, spec: &SubtotalSpec, loaded: &LoadResult) -> Result<ResolvedQuery> {
    if let Some(name) = &args.template {
        return loaded
            .templates
            .resolve(name, args.coefficient, spec.contributing_range())
            .with_context(|| format!("failed to resolve template '{name}'"));
    }
    let text = args.query.as_deref().unwrap_or("{\"op\": \"atom\"}");
    let expr: QueryExpr = serde_json::from_str(text).context("invalid query expression")?;
    let tree = compile(&expr).context("invalid query expression")?;
    Ok(ResolvedQuery::from_tree(tree).scaled(args.coefficient))
}

/// Run the report described by `args`, writing it to `out`.
pub fn run<W: Write>(args: &Args, out: &mut W) -> Result<()> {
    let loaded = load(&args.config, &args.ledger)?;
    let reporting = args
        .reporting
        .clone()
        .unwrap_or_else(|| loaded.options.reporting_currency().to_string());
    let spec = args.subtotal_spec();
    let query = resolve_query(args, &spec, &loaded)?;
    let store = MemoryLedger::from_vouchers(loaded.vouchers)
        .with_context(|| format!("ledger {} has invalid vouchers", args.ledger.display()))?;

    let result = run_subtotal(&store, &query, &spec)?;

    if !args.consolidate {
        if args.json {
            writeln!(out, "{}", to_json_string(&result.root)?)?;
        } else {
            write!(out, "{}", format_text(&result.root))?;
        }
        return Ok(());
    }

    let as_of = args
        .as_of
        .or(args.end)
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let consolidated = consolidate(result, &reporting, &loaded.rates, as_of)?;
    if !consolidated.is_complete() {
        tracing::warn!(
            missing = consolidated.unconverted.len(),
            currency = %reporting,
            "report is only partly converted"
        );
    }
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&consolidated)?)?;
    } else {
        write!(out, "{}", format_consolidated(&consolidated))?;
    }
    Ok(())
}

/// Main entry point for the report command.
pub fn main() -> ExitCode {
    let args = Args::parse();
    if args.verbose {
        super::init_verbose_logging();
    }

    let mut stdout = io::stdout().lock();
    match run(&args, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
