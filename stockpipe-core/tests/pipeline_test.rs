//! End-to-end tests: reference listing → extraction → transform → staging.
//!
//! The upstream source is a scripted stand-in, so these run offline and
//! without wall-clock waits.

use chrono::NaiveDate;
use polars::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use stockpipe_core::reference::{companies_from_reader, symbols};
use stockpipe_core::staging::{stage_all, LocalStager, Stager, Table};
use stockpipe_core::validation::CheckName;
use stockpipe_core::{
    transform, ExtractConfig, Extractor, PriceSource, Sleeper, SourceBar, SourceError,
};

const LISTING: &str = "\
Symbol,Security,GICS Sector,GICS Sub-Industry,Headquarters Location,Date added,CIK
AAPL,Apple Inc.,Information Technology,Technology Hardware,\"Cupertino, California\",1982-11-30,0000320193
XOM,ExxonMobil,Energy,Integrated Oil & Gas,\"Spring, Texas\",1957-03-04,0000034088
MSFT,Microsoft,Information Technology,Systems Software,\"Redmond, Washington\",1994-06-01,0000789019
BRK.B,Berkshire Hathaway,Financials,Multi-Sector Holdings,\"Omaha, Nebraska\",2010-02-16,0001067983
";

#[derive(Default)]
struct NoSleep {
    slept: RefCell<Vec<Duration>>,
}

impl Sleeper for NoSleep {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Serves fixed bars per symbol; symbols in `broken` always fail.
struct FixtureSource {
    bars: HashMap<&'static str, Vec<SourceBar>>,
    broken: Vec<&'static str>,
}

impl PriceSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<SourceBar>, SourceError> {
        if self.broken.iter().any(|b| *b == symbol) {
            return Err(SourceError::HttpStatus {
                status: 502,
                symbol: symbol.to_string(),
            });
        }
        Ok(self.bars.get(symbol).cloned().unwrap_or_default())
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn bar(d: u32, open: f64, high: f64, low: f64, close: f64, volume: i64) -> SourceBar {
    SourceBar {
        date: day(d),
        open,
        high,
        low,
        close,
        volume,
    }
}

fn fixture_source() -> FixtureSource {
    let mut bars = HashMap::new();
    bars.insert(
        "AAPL",
        vec![
            bar(2, 187.15, 188.44, 183.89, 185.639999, 82_488_700),
            bar(3, 184.22, 185.88, 183.43, 184.25, 58_414_500),
        ],
    );
    bars.insert("XOM", vec![bar(2, 100.0, 101.5, 99.2, 100.9, 17_000_000)]);
    // Not in the listing (e.g. dropped from the index)
    bars.insert("GONE", vec![bar(2, 10.0, 11.0, 9.0, 10.5, 1_000)]);
    FixtureSource {
        bars,
        broken: vec!["MSFT"],
    }
}

fn config() -> ExtractConfig {
    ExtractConfig {
        batch_size: 2,
        max_retries: 3,
        retry_delay_secs: 5,
        days_back: 7,
        batch_pause_secs: 1,
    }
}

#[test]
fn full_run_stages_three_tables_and_report() {
    let companies = companies_from_reader(LISTING.as_bytes()).unwrap();
    let source = fixture_source();
    let sleeper = NoSleep::default();
    let extractor = Extractor::new(&source, &sleeper, &config());

    let mut universe = symbols(&companies);
    universe.push("GONE");
    let extraction = extractor.extract_recent(&universe, day(9));

    // MSFT fails three times, BRK-B has no history
    assert_eq!(extraction.failures.len(), 1);
    assert_eq!(extraction.failures[0].0, "MSFT");
    assert_eq!(extraction.records.len(), 4);
    // pause, MSFT backoff, pause
    assert_eq!(
        *sleeper.slept.borrow(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(1),
        ]
    );

    let schema = transform(&companies, &extraction.records).unwrap();
    assert!(schema.report.all_passed);
    assert_eq!(schema.sectors.len(), 3);
    assert_eq!(schema.companies.len(), 4);
    assert_eq!(schema.companies[3].symbol, "BRK-B");
    assert_eq!(schema.prices.len(), 4);
    assert_eq!(schema.prices[0].close, 185.64);
    assert_eq!(schema.prices[3].company_id, None);

    let dir = tempfile::tempdir().unwrap();
    let stager = LocalStager::new(dir.path(), "staging/");
    let staged = stage_all(&stager, &schema, day(9)).unwrap();
    assert_eq!(staged.len(), 3);
    assert_eq!(stager.list(None).unwrap().len(), 3);
    assert!(stager.report_path(day(9)).exists());

    let fact = ParquetReader::new(
        std::fs::File::open(stager.table_path(Table::FactDailyPrices, day(9))).unwrap(),
    )
    .finish()
    .unwrap();
    assert_eq!(fact.height(), 4);
    assert_eq!(fact.column("company_id").unwrap().null_count(), 1);
}

#[test]
fn retry_waits_are_exponential_then_batches_pause() {
    let source = fixture_source();
    let sleeper = NoSleep::default();
    let extractor = Extractor::new(&source, &sleeper, &config());

    // batch 1: AAPL, MSFT (fails 3x) | batch 2: XOM
    extractor.extract(&["AAPL", "MSFT", "XOM"], day(1), day(9));

    assert_eq!(
        *sleeper.slept.borrow(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(1),
        ]
    );
}

#[test]
fn dirty_batch_is_cleaned_but_policy_gaps_flow_through() {
    let companies = companies_from_reader(LISTING.as_bytes()).unwrap();
    let mut bars = HashMap::new();
    bars.insert(
        "AAPL",
        vec![
            bar(2, -1.0, 188.44, 183.89, 185.64, 100),
            bar(3, 184.22, 180.0, 190.0, 184.25, 100), // low > high
            bar(4, 184.22, 185.88, 183.43, 184.25, -5),
        ],
    );
    let source = FixtureSource {
        bars,
        broken: vec![],
    };
    let sleeper = NoSleep::default();
    let extractor = Extractor::new(&source, &sleeper, &config());
    let extraction = extractor.extract(&["AAPL"], day(1), day(9));

    let schema = transform(&companies, &extraction.records).unwrap();
    assert!(!schema.report.all_passed);
    assert_eq!(
        schema
            .report
            .verdict(CheckName::PositivePrices)
            .unwrap()
            .observed,
        1
    );
    assert_eq!(schema.prices.len(), 1);
    assert_eq!(schema.prices[0].date, Some(day(3)));
    assert_eq!(schema.prices[0].low, 190.0);
}
