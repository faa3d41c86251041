//! Data-quality gate for raw price batches.
//!
//! Twelve independent checks run over every batch in a fixed order. Each
//! check reports the figure it measured (usually a count of offending values)
//! so the report is diagnostic rather than a bare pass/fail. Checks never
//! short-circuit: an empty batch still yields twelve verdicts.
//!
//! Price checks count individual price values, so a record with two negative
//! prices contributes two to `positive_prices`. Record-level checks
//! (OHLC relationship, duplicates, symbol format) count records.

use crate::record::{RawPriceRecord, DATE_FORMAT};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info};

/// Maximum number of decimal digits accepted on any price value.
pub const MAX_PRICE_DECIMALS: usize = 6;

/// Lowest price considered plausible.
pub const MIN_REASONABLE_PRICE: f64 = 0.01;

/// Highest price considered plausible.
pub const MAX_REASONABLE_PRICE: f64 = 100_000.0;

/// Highest daily volume considered plausible.
pub const MAX_REASONABLE_VOLUME: i64 = 1_000_000_000_000;

/// Names of the validation rules, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    NotEmpty,
    NoNullSymbols,
    NoNullDates,
    PositivePrices,
    PositiveVolume,
    OhlcRelationship,
    DateFormat,
    NoDuplicates,
    SymbolFormat,
    PricePrecision,
    ReasonablePrices,
    VolumeRange,
}

impl CheckName {
    /// Every rule, in the order the engine runs them.
    pub const ALL: [CheckName; 12] = [
        CheckName::NotEmpty,
        CheckName::NoNullSymbols,
        CheckName::NoNullDates,
        CheckName::PositivePrices,
        CheckName::PositiveVolume,
        CheckName::OhlcRelationship,
        CheckName::DateFormat,
        CheckName::NoDuplicates,
        CheckName::SymbolFormat,
        CheckName::PricePrecision,
        CheckName::ReasonablePrices,
        CheckName::VolumeRange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::NotEmpty => "not_empty",
            CheckName::NoNullSymbols => "no_null_symbols",
            CheckName::NoNullDates => "no_null_dates",
            CheckName::PositivePrices => "positive_prices",
            CheckName::PositiveVolume => "positive_volume",
            CheckName::OhlcRelationship => "ohlc_relationship",
            CheckName::DateFormat => "date_format",
            CheckName::NoDuplicates => "no_duplicates",
            CheckName::SymbolFormat => "symbol_format",
            CheckName::PricePrecision => "price_precision",
            CheckName::ReasonablePrices => "reasonable_prices",
            CheckName::VolumeRange => "volume_range",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rule over one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub check: CheckName,
    pub passed: bool,
    /// The figure the rule measured: offending count for most rules, the
    /// record count for `not_empty`, the maximum decimal digits for
    /// `price_precision`.
    pub observed: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered verdicts for a batch plus the aggregate flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub all_passed: bool,
    pub verdicts: Vec<Verdict>,
}

impl ValidationReport {
    /// Look up the verdict for a rule.
    pub fn verdict(&self, check: CheckName) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.check == check)
    }

    /// Verdicts that did not pass, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed).count()
    }
}

/// Parse a trade date in `YYYY-MM-DD` form.
pub fn parse_trade_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
}

/// True when the symbol only uses `[A-Z0-9-.]`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

/// Number of digits after the decimal point in the shortest round-trip
/// rendering of `value`. Non-finite values have none.
pub fn decimal_places(value: f64) -> usize {
    if !value.is_finite() {
        return 0;
    }
    value
        .to_string()
        .split_once('.')
        .map_or(0, |(_, frac)| frac.len())
}

/// Run every rule over the batch, stamping verdicts with the current time.
pub fn validate_prices(records: &[RawPriceRecord]) -> ValidationReport {
    validate_prices_at(records, Utc::now())
}

/// Run every rule over the batch with a fixed verdict timestamp.
pub fn validate_prices_at(records: &[RawPriceRecord], now: DateTime<Utc>) -> ValidationReport {
    let verdicts: Vec<Verdict> = CheckName::ALL
        .iter()
        .map(|&check| {
            let outcome = run_check(check, records);
            if outcome.passed {
                info!(check = %check, "PASSED: {}", outcome.message);
            } else {
                error!(check = %check, observed = outcome.observed, "FAILED: {}", outcome.message);
            }
            Verdict {
                check,
                passed: outcome.passed,
                observed: outcome.observed,
                message: outcome.message,
                timestamp: now,
            }
        })
        .collect();

    ValidationReport {
        all_passed: verdicts.iter().all(|v| v.passed),
        verdicts,
    }
}

struct Outcome {
    passed: bool,
    observed: usize,
    message: String,
}

impl Outcome {
    /// Outcome for rules that fail when any offender is found.
    fn offenders(count: usize, message: String) -> Self {
        Self {
            passed: count == 0,
            observed: count,
            message,
        }
    }
}

fn run_check(check: CheckName, records: &[RawPriceRecord]) -> Outcome {
    match check {
        CheckName::NotEmpty => check_not_empty(records),
        CheckName::NoNullSymbols => {
            let n = records.iter().filter(|r| r.symbol.is_none()).count();
            Outcome::offenders(n, format!("Found {n} null symbols"))
        }
        CheckName::NoNullDates => {
            let n = records.iter().filter(|r| r.date.is_none()).count();
            Outcome::offenders(n, format!("Found {n} null dates"))
        }
        CheckName::PositivePrices => {
            let n = count_prices(records, |p| p < 0.0);
            Outcome::offenders(n, format!("Found {n} negative prices"))
        }
        CheckName::PositiveVolume => {
            let n = records.iter().filter(|r| r.volume < 0).count();
            Outcome::offenders(n, format!("Found {n} negative volumes"))
        }
        CheckName::OhlcRelationship => {
            let n = records.iter().filter(|r| breaks_ohlc(r)).count();
            Outcome::offenders(n, format!("Found {n} invalid OHLC relationships"))
        }
        CheckName::DateFormat => check_date_format(records),
        CheckName::NoDuplicates => {
            let n = count_duplicates(records);
            Outcome::offenders(n, format!("Found {n} duplicate records"))
        }
        CheckName::SymbolFormat => {
            let n = records
                .iter()
                .filter(|r| !r.symbol.as_deref().is_some_and(is_valid_symbol))
                .count();
            Outcome::offenders(n, format!("Found {n} invalid symbol formats"))
        }
        CheckName::PricePrecision => check_price_precision(records),
        CheckName::ReasonablePrices => {
            let n = count_prices(records, |p| {
                p > MAX_REASONABLE_PRICE || p < MIN_REASONABLE_PRICE
            });
            Outcome::offenders(n, format!("Found {n} extreme prices"))
        }
        CheckName::VolumeRange => {
            let n = records
                .iter()
                .filter(|r| r.volume > MAX_REASONABLE_VOLUME)
                .count();
            Outcome::offenders(n, format!("Found {n} extreme volumes"))
        }
    }
}

fn check_not_empty(records: &[RawPriceRecord]) -> Outcome {
    Outcome {
        passed: !records.is_empty(),
        observed: records.len(),
        message: format!("price_data has {} records", records.len()),
    }
}

/// Missing dates are the concern of `no_null_dates`; only present values are parsed here.
fn check_date_format(records: &[RawPriceRecord]) -> Outcome {
    let bad: Vec<&str> = records
        .iter()
        .filter_map(|r| r.date.as_deref())
        .filter(|d| parse_trade_date(d).is_err())
        .collect();

    let message = match bad.first() {
        None => "All dates are valid (0 invalid)".to_string(),
        Some(first) => format!("Found {} invalid dates, first: '{first}'", bad.len()),
    };
    Outcome::offenders(bad.len(), message)
}

fn check_price_precision(records: &[RawPriceRecord]) -> Outcome {
    let max = records
        .iter()
        .flat_map(|r| r.prices())
        .map(decimal_places)
        .max()
        .unwrap_or(0);
    Outcome {
        passed: max <= MAX_PRICE_DECIMALS,
        observed: max,
        message: format!("Max decimal places: {max}"),
    }
}

fn count_prices(records: &[RawPriceRecord], pred: impl Fn(f64) -> bool) -> usize {
    records
        .iter()
        .flat_map(|r| r.prices())
        .filter(|&p| pred(p))
        .count()
}

fn breaks_ohlc(r: &RawPriceRecord) -> bool {
    r.high < r.low || r.high < r.open || r.high < r.close || r.low > r.open || r.low > r.close
}

/// Records repeating an earlier (symbol, date) key. Missing keys compare equal.
fn count_duplicates(records: &[RawPriceRecord]) -> usize {
    let mut seen = HashSet::with_capacity(records.len());
    records.iter().filter(|r| !seen.insert(r.key())).count()
}
