//! Star-schema reshaping: sector and company dimensions plus the daily price fact.
//!
//! Surrogate keys are assigned 1..N in input order. Joins are explicit key
//! lookups; a missing match produces a `None` foreign key rather than an error
//! or a dropped row.
//!
//! Cleaning only removes the defect classes it knows how to repair: missing
//! keys, duplicate (symbol, date) pairs, non-positive prices and negative
//! volume. OHLC-relationship breaks, extreme prices, bad symbol formats and
//! excess precision are reported by validation and flow into the fact table
//! unchanged. A date that fails to parse does too, as a null fact date.

use crate::record::{RawCompanyRecord, RawPriceRecord};
use crate::validation::{parse_trade_date, validate_prices_at, ValidationReport};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, warn};

/// Decimal places kept on fact-table prices.
pub const PRICE_DECIMALS: i32 = 4;

/// Structural problems that make a batch unusable. These fail the run.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("price record {index} has no symbol")]
    MissingSymbol { index: usize },

    #[error("price record {index} has no date")]
    MissingDate { index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRow {
    pub sector_id: u32,
    pub sector: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRow {
    pub company_id: u32,
    pub symbol: String,
    pub company_name: String,
    pub sector_id: Option<u32>,
    pub sub_industry: String,
    pub headquarters: String,
    pub date_added: Option<NaiveDate>,
    pub cik: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFactRow {
    pub price_id: u32,
    pub company_id: Option<u32>,
    /// `None` when the raw date did not parse.
    pub date: Option<NaiveDate>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub extracted_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
}

/// The three normalized tables of one run plus the validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarSchema {
    pub sectors: Vec<SectorRow>,
    pub companies: Vec<CompanyRow>,
    pub prices: Vec<PriceFactRow>,
    pub report: ValidationReport,
}

/// Validate, clean when needed, and reshape one run's data.
pub fn transform(
    companies: &[RawCompanyRecord],
    prices: &[RawPriceRecord],
) -> Result<StarSchema, TransformError> {
    transform_at(companies, prices, Utc::now())
}

/// Same as [`transform`] with every embedded timestamp set to `now`.
pub fn transform_at(
    companies: &[RawCompanyRecord],
    prices: &[RawPriceRecord],
    now: DateTime<Utc>,
) -> Result<StarSchema, TransformError> {
    info!(
        companies = companies.len(),
        prices = prices.len(),
        "starting transformation"
    );

    let report = validate_prices_at(prices, now);

    let cleaned;
    let usable: &[RawPriceRecord] = if report.all_passed {
        prices
    } else {
        warn!(
            failed = report.failures().count(),
            "validation failed, proceeding with cleaned records only"
        );
        cleaned = clean_prices(prices);
        info!(
            dropped = prices.len() - cleaned.len(),
            kept = cleaned.len(),
            "cleaning pass complete"
        );
        &cleaned
    };

    let sectors = build_sectors(companies, now);
    info!(rows = sectors.len(), "built dim_sector");

    let company_rows = build_companies(companies, &sectors, now);
    info!(rows = company_rows.len(), "built dim_company");

    let facts = build_price_facts(usable, &company_rows, now)?;
    info!(rows = facts.len(), "built fact_daily_prices");

    Ok(StarSchema {
        sectors,
        companies: company_rows,
        prices: facts,
        report,
    })
}

/// Remove records with missing keys, later duplicates, non-positive prices
/// or negative volume. Applying it to its own output removes nothing.
///
/// Duplicates are resolved before the price filter, so when the first of two
/// rows sharing a key has a bad price, both rows are gone.
pub fn clean_prices(records: &[RawPriceRecord]) -> Vec<RawPriceRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|r| r.symbol.is_some() && r.date.is_some())
        .filter(|r| seen.insert(r.key()))
        .filter(|r| r.prices().iter().all(|&p| p > 0.0))
        .filter(|r| r.volume >= 0)
        .cloned()
        .collect()
}

/// Distinct sectors in first-seen order, keyed from 1.
pub fn build_sectors(companies: &[RawCompanyRecord], now: DateTime<Utc>) -> Vec<SectorRow> {
    let mut seen = HashSet::new();
    companies
        .iter()
        .filter(|c| seen.insert(c.sector.as_str()))
        .zip(1u32..)
        .map(|(c, sector_id)| SectorRow {
            sector_id,
            sector: c.sector.clone(),
            created_at: now,
        })
        .collect()
}

/// One row per company in input order, linked to its sector.
pub fn build_companies(
    companies: &[RawCompanyRecord],
    sectors: &[SectorRow],
    now: DateTime<Utc>,
) -> Vec<CompanyRow> {
    let sector_ids: HashMap<&str, u32> = sectors
        .iter()
        .map(|s| (s.sector.as_str(), s.sector_id))
        .collect();

    companies
        .iter()
        .zip(1u32..)
        .map(|(c, company_id)| CompanyRow {
            company_id,
            symbol: c.symbol.clone(),
            company_name: c.company_name.clone(),
            sector_id: sector_ids.get(c.sector.as_str()).copied(),
            sub_industry: c.sub_industry.clone(),
            headquarters: c.headquarters.clone(),
            date_added: c.date_added,
            cik: c.cik.clone(),
            created_at: now,
            updated_at: now,
        })
        .collect()
}

/// One fact row per price record, linked to its company by symbol.
///
/// When the dimension lists a symbol twice, the first row wins. A record
/// whose date does not parse keeps its row with a null date.
pub fn build_price_facts(
    records: &[RawPriceRecord],
    companies: &[CompanyRow],
    now: DateTime<Utc>,
) -> Result<Vec<PriceFactRow>, TransformError> {
    let mut company_ids: HashMap<&str, u32> = HashMap::with_capacity(companies.len());
    for c in companies {
        company_ids.entry(c.symbol.as_str()).or_insert(c.company_id);
    }

    records
        .iter()
        .zip(1u32..)
        .enumerate()
        .map(|(index, (r, price_id))| -> Result<PriceFactRow, TransformError> {
            let symbol = r
                .symbol
                .as_deref()
                .ok_or(TransformError::MissingSymbol { index })?;
            let raw_date = r
                .date
                .as_deref()
                .ok_or(TransformError::MissingDate { index })?;
            let date = parse_trade_date(raw_date).ok();
            if date.is_none() {
                warn!(index, symbol, date = raw_date, "unparseable date, fact date left null");
            }

            Ok(PriceFactRow {
                price_id,
                company_id: company_ids.get(symbol).copied(),
                date,
                open: round_price(r.open),
                high: round_price(r.high),
                low: round_price(r.low),
                close: round_price(r.close),
                volume: r.volume,
                extracted_at: r.extracted_at,
                loaded_at: now,
            })
        })
        .collect()
}

/// Round to four decimal places, halves away from zero.
pub fn round_price(value: f64) -> f64 {
    let scale = 10f64.powi(PRICE_DECIMALS);
    (value * scale).round() / scale
}
