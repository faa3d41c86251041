//! Retrying extractor — batched per-symbol fetches with exponential backoff.
//!
//! Symbols are fetched sequentially in fixed-size batches with a pause between
//! batches. Each symbol gets up to `max_attempts` tries; after failed attempt
//! `n` (0-based) the extractor sleeps `base_delay * 2^n` before trying again.
//! A symbol that exhausts its attempts contributes zero records and is listed
//! in `Extraction::failures`; it never aborts the batch.
//!
//! All waiting goes through the `Sleeper` trait so tests run without wall-clock
//! delays.

use crate::config::ExtractConfig;
use crate::record::RawPriceRecord;
use crate::source::{PriceSource, SourceError};
use chrono::{Duration as DateSpan, NaiveDate, Utc};
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, info, warn};

/// Blocking delay used between retries and batches.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the calling thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.retry_delay_secs),
        )
    }

    /// Wait after failed attempt `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or attempts run out, returning the last error.
    ///
    /// `op` receives the 0-based attempt number. No wait follows the final
    /// failed attempt.
    pub fn run<T, E: Display>(
        &self,
        label: &str,
        sleeper: &dyn Sleeper,
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        target: "stockpipe::retry",
                        label,
                        attempt = attempt + 1,
                        "attempt failed: {e}. Retrying in {}s",
                        delay.as_secs_f64()
                    );
                    sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Result of one extraction run.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Records in symbol order; each symbol's records are contiguous.
    pub records: Vec<RawPriceRecord>,
    /// Symbols that exhausted their retries, with the last error.
    pub failures: Vec<(String, SourceError)>,
    pub symbols_requested: usize,
}

impl Extraction {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.symbols_requested - self.failures.len()
    }
}

/// Fetches price records for many symbols from one source.
pub struct Extractor<'a> {
    source: &'a dyn PriceSource,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    batch_size: usize,
    batch_pause: Duration,
    days_back: u32,
}

impl<'a> Extractor<'a> {
    pub fn new(
        source: &'a dyn PriceSource,
        sleeper: &'a dyn Sleeper,
        config: &ExtractConfig,
    ) -> Self {
        Self {
            source,
            sleeper,
            policy: RetryPolicy::from_config(config),
            batch_size: config.batch_size.max(1),
            batch_pause: Duration::from_secs(config.batch_pause_secs),
            days_back: config.days_back,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Window `[today - days_back, today)`.
    pub fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - DateSpan::days(i64::from(self.days_back)), today)
    }

    /// Extract the configured trailing window ending before `today`.
    pub fn extract_recent(&self, symbols: &[&str], today: NaiveDate) -> Extraction {
        let (start, end) = self.window(today);
        self.extract(symbols, start, end)
    }

    /// Extract daily records for every symbol over `[start, end)`.
    pub fn extract(&self, symbols: &[&str], start: NaiveDate, end: NaiveDate) -> Extraction {
        let mut extraction = Extraction {
            symbols_requested: symbols.len(),
            ..Extraction::default()
        };

        let batch_count = symbols.len().div_ceil(self.batch_size);
        for (i, batch) in symbols.chunks(self.batch_size).enumerate() {
            if i > 0 {
                self.sleeper.sleep(self.batch_pause);
            }
            info!(
                batch = i + 1,
                of = batch_count,
                symbols = batch.len(),
                source = self.source.name(),
                "processing batch"
            );

            for &symbol in batch {
                match self.fetch_symbol(symbol, start, end) {
                    Ok(records) => extraction.records.extend(records),
                    Err(e) => {
                        error!(symbol, "all retries exhausted: {e}");
                        extraction.failures.push((symbol.to_string(), e));
                    }
                }
            }
        }

        info!(
            records = extraction.records.len(),
            symbols = symbols.len(),
            failed = extraction.failures.len(),
            "extraction complete"
        );
        extraction
    }

    fn fetch_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPriceRecord>, SourceError> {
        let bars = self
            .policy
            .run(symbol, self.sleeper, |_| self.source.fetch(symbol, start, end))?;
        let extracted_at = Utc::now();

        if bars.is_empty() {
            warn!(symbol, "no data returned");
        }

        Ok(bars
            .into_iter()
            .map(|b| {
                RawPriceRecord::new(
                    symbol,
                    b.date,
                    b.open,
                    b.high,
                    b.low,
                    b.close,
                    b.volume,
                    extracted_at,
                )
            })
            .collect())
    }
}
