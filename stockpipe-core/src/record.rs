//! Raw input records: company reference rows and extracted daily prices.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Format used for trade dates on raw price records.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One constituent from the external reference listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCompanyRecord {
    pub symbol: String,
    pub company_name: String,
    pub sector: String,
    pub sub_industry: String,
    pub headquarters: String,
    pub date_added: Option<NaiveDate>,
    pub cik: Option<String>,
}

/// A daily OHLCV observation as fetched, before validation.
///
/// Symbol and date are optional and the date is kept as text: a batch handed
/// in by another collaborator may carry missing keys or malformed dates, and
/// the validation engine has to be able to see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRecord {
    pub symbol: Option<String>,
    pub date: Option<String>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub extracted_at: DateTime<Utc>,
}

impl RawPriceRecord {
    /// Build a record for a known symbol and trading day.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: &str,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            date: Some(date.format(DATE_FORMAT).to_string()),
            open,
            high,
            low,
            close,
            volume,
            extracted_at,
        }
    }

    /// The four price points in open, high, low, close order.
    pub fn prices(&self) -> [f64; 4] {
        [self.open, self.high, self.low, self.close]
    }

    /// Natural key of the observation.
    pub fn key(&self) -> (Option<&str>, Option<&str>) {
        (self.symbol.as_deref(), self.date.as_deref())
    }
}
