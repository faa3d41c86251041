//! Upstream price sources and their error types.
//!
//! A `PriceSource` makes exactly one attempt per call. Retry, backoff and
//! batching belong to the extractor, so sources stay trivial to mock.

pub mod yahoo;

pub use yahoo::YahooSource;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daily OHLCV bar as returned by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Transient failures from an upstream source. All of them are retryable.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} for {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },
}

/// A source of daily prices for one symbol over `[start, end)`.
pub trait PriceSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily bars. An empty vector is a valid answer (no trading history
    /// in the window), not an error.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SourceBar>, SourceError>;
}
