//! Company reference data — the S&P 500 constituents listing.
//!
//! The listing is read from CSV with the column headers of the public
//! constituents table (`Symbol`, `Security`, `GICS Sector`, ...). Class-share
//! symbols are normalized to the dash form used by price sources
//! (`BRK.B` → `BRK-B`).

use crate::record::RawCompanyRecord;
use crate::record::DATE_FORMAT;
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("read reference listing {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed reference row: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: invalid date added '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: empty symbol")]
    EmptySymbol { row: usize },
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Security")]
    security: String,
    #[serde(rename = "GICS Sector")]
    sector: String,
    #[serde(rename = "GICS Sub-Industry")]
    sub_industry: String,
    #[serde(rename = "Headquarters Location")]
    headquarters: String,
    #[serde(rename = "Date added")]
    date_added: Option<String>,
    #[serde(rename = "CIK")]
    cik: Option<String>,
}

/// Load the constituents listing from a CSV file.
pub fn load_companies(path: &Path) -> Result<Vec<RawCompanyRecord>, ReferenceError> {
    let file = std::fs::File::open(path).map_err(|source| ReferenceError::Read {
        path: path.display().to_string(),
        source,
    })?;
    companies_from_reader(file)
}

/// Parse the constituents listing, preserving row order.
///
/// Missing required columns fail the whole load: they mean the listing's
/// contract changed, not that a row is dirty.
pub fn companies_from_reader<R: Read>(reader: R) -> Result<Vec<RawCompanyRecord>, ReferenceError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    rdr.deserialize::<ListingRow>()
        .enumerate()
        .map(|(i, row)| {
            let row = row?;
            // header is line 1
            let line = i + 2;
            if row.symbol.is_empty() {
                return Err(ReferenceError::EmptySymbol { row: line });
            }
            let date_added = non_empty(row.date_added)
                .map(|value| {
                    NaiveDate::parse_from_str(&value, DATE_FORMAT)
                        .map_err(|_| ReferenceError::InvalidDate { row: line, value })
                })
                .transpose()?;

            Ok(RawCompanyRecord {
                symbol: normalize_symbol(&row.symbol),
                company_name: row.security,
                sector: row.sector,
                sub_industry: row.sub_industry,
                headquarters: row.headquarters,
                date_added,
                cik: non_empty(row.cik),
            })
        })
        .collect()
}

/// Dash form of a class-share symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

/// Symbols to extract, in listing order.
pub fn symbols(companies: &[RawCompanyRecord]) -> Vec<&str> {
    companies.iter().map(|c| c.symbol.as_str()).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
