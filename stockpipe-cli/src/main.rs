//! Stockpipe CLI — daily run, ad-hoc validation, and staging inspection.
//!
//! Commands:
//! - `run` — extract recent prices from Yahoo Finance, validate, reshape, stage as Parquet
//! - `validate` — run the twelve checks over a price CSV and print the report
//! - `staging list` — list staged Parquet files

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use stockpipe_core::reference::{load_companies, symbols};
use stockpipe_core::staging::{stage_all, LocalStager, Stager, Table};
use stockpipe_core::{
    transform, validate_prices, Extractor, PipelineConfig, RawPriceRecord, ThreadSleeper,
    ValidationReport, YahooSource,
};
use tracing::{error, info, warn, Level};

/// Exit code of `validate` when any check fails.
const EXIT_VALIDATION_FAILED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "stockpipe",
    about = "Stockpipe — daily S&P 500 price ETL"
)]
struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, validate, transform, and stage one daily run.
    Run {
        /// Path to the pipeline TOML config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Constituents listing CSV.
        #[arg(long)]
        companies: PathBuf,

        /// Run date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        today: Option<String>,
    },
    /// Validate a price CSV and print the twelve verdicts.
    Validate {
        /// CSV with symbol,date,open,high,low,close,volume[,extracted_at].
        #[arg(long)]
        prices: PathBuf,

        /// Print the report as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Staging area commands.
    Staging {
        #[command(subcommand)]
        action: StagingAction,
    },
}

#[derive(Subcommand)]
enum StagingAction {
    /// List staged Parquet files.
    List {
        /// Only this table: dim_sector, dim_company, fact_daily_prices.
        #[arg(long)]
        table: Option<String>,

        /// Path to the pipeline TOML config.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            companies,
            today,
        } => run_pipeline(config.as_deref(), &companies, today.as_deref()),
        Commands::Validate { prices, json } => run_validate(&prices, json),
        Commands::Staging { action } => match action {
            StagingAction::List { table, config } => {
                run_staging_list(config.as_deref(), table.as_deref())
            }
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_pipeline(config_path: Option<&Path>, companies_path: &Path, today: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let today = today
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--today must be YYYY-MM-DD")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let companies = load_companies(companies_path)?;
    info!(companies = companies.len(), %today, "loaded constituents");

    let source = YahooSource::new()?;
    let sleeper = ThreadSleeper;
    let extractor = Extractor::new(&source, &sleeper, &config.extract);
    let extraction = extractor.extract_recent(&symbols(&companies), today);

    for (symbol, err) in &extraction.failures {
        warn!(%symbol, error = %err, "symbol skipped");
    }

    let schema = transform(&companies, &extraction.records)?;

    let stager = LocalStager::from_config(&config.staging);
    let staged = stage_all(&stager, &schema, today)?;

    println!();
    println!("=== Run {today} ===");
    println!(
        "Symbols:        {}/{} extracted",
        extraction.succeeded(),
        extraction.symbols_requested
    );
    println!("Raw records:    {}", extraction.records.len());
    println!("Sectors:        {}", schema.sectors.len());
    println!("Companies:      {}", schema.companies.len());
    println!("Price facts:    {}", schema.prices.len());
    println!(
        "Validation:     {}/{} checks passed",
        schema.report.passed_count(),
        schema.report.verdicts.len()
    );
    for file in &staged {
        println!("Staged:         {}", file.path.display());
    }
    println!();

    Ok(())
}

/// One row of an ad-hoc price CSV; `extracted_at` defaults to load time.
#[derive(Debug, Deserialize)]
struct PriceCsvRow {
    symbol: Option<String>,
    date: Option<String>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    extracted_at: Option<DateTime<Utc>>,
}

fn load_price_csv(path: &Path) -> Result<Vec<RawPriceRecord>> {
    let loaded_at = Utc::now();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;

    rdr.deserialize::<PriceCsvRow>()
        .enumerate()
        .map(|(i, row)| {
            let row = row.with_context(|| format!("row {}", i + 2))?;
            Ok(RawPriceRecord {
                symbol: row.symbol.filter(|s| !s.is_empty()),
                date: row.date.filter(|d| !d.is_empty()),
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                extracted_at: row.extracted_at.unwrap_or(loaded_at),
            })
        })
        .collect()
}

fn run_validate(path: &Path, json: bool) -> Result<()> {
    let records = load_price_csv(path)?;
    let report = validate_prices(&records);
    if json {
        println!("{}", report_json(&report)?);
    } else {
        print_report(records.len(), &report);
    }

    if !report.all_passed {
        error!(failed = report.failures().count(), "validation failed");
        std::process::exit(EXIT_VALIDATION_FAILED);
    }
    Ok(())
}

fn report_json(report: &ValidationReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn print_report(records: usize, report: &ValidationReport) {
    println!();
    println!("=== Validation ({records} records) ===");
    println!("{:<22} {:<6} {:>10}  Message", "Check", "Result", "Observed");
    println!("{}", "-".repeat(72));
    for v in &report.verdicts {
        println!(
            "{:<22} {:<6} {:>10}  {}",
            v.check.as_str(),
            if v.passed { "PASS" } else { "FAIL" },
            v.observed,
            v.message
        );
    }
    println!();
    println!(
        "{}/{} checks passed",
        report.passed_count(),
        report.verdicts.len()
    );
}

fn run_staging_list(config_path: Option<&Path>, table: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let table = table.map(str::parse::<Table>).transpose()?;
    let stager = LocalStager::from_config(&config.staging);

    let files = stager.list(table)?;
    if files.is_empty() {
        println!("Nothing staged under {}", stager.staging_dir().display());
        return Ok(());
    }
    for file in &files {
        println!("{}", file.display());
    }
    println!();
    println!("{} file(s)", files.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpipe_core::CheckName;

    #[test]
    fn json_report_lists_every_check_in_order() {
        let report = validate_prices(&[]);
        let value: serde_json::Value = serde_json::from_str(&report_json(&report).unwrap()).unwrap();

        assert_eq!(value["all_passed"], false);
        let checks: Vec<&str> = value["verdicts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["check"].as_str().unwrap())
            .collect();
        let expected: Vec<&str> = CheckName::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(checks, expected);
        assert_eq!(value["verdicts"][0]["observed"], 0);
    }

    #[test]
    fn price_csv_blank_keys_become_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(
            &path,
            "symbol,date,open,high,low,close,volume,extracted_at\n\
             AAPL,2024-01-02,187.15,188.44,183.89,185.64,82488700,2024-01-03T00:00:00Z\n\
             ,2024-01-02,1.0,1.0,1.0,1.0,1,\n",
        )
        .unwrap();

        let records = load_price_csv(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol.as_deref(), Some("AAPL"));
        assert_eq!(records[1].symbol, None);

        let report = validate_prices(&records);
        assert!(!report.verdict(CheckName::NoNullSymbols).unwrap().passed);
    }
}
