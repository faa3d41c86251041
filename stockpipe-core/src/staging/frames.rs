//! Row → DataFrame conversion for staging.
//!
//! Dates become Polars `Date`, timestamps `Datetime(ms, UTC-naive)`, and
//! nullable foreign keys stay nullable.

use crate::transform::{CompanyRow, PriceFactRow, SectorRow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use polars::prelude::*;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn date_column(name: &str, days: Vec<Option<i32>>) -> PolarsResult<Column> {
    Column::new(name.into(), days).cast(&DataType::Date)
}

fn timestamp_column(name: &str, stamps: impl Iterator<Item = DateTime<Utc>>) -> PolarsResult<Column> {
    let millis: Vec<i64> = stamps.map(|t| t.timestamp_millis()).collect();
    Column::new(name.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

pub fn sectors_frame(rows: &[SectorRow]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            "sector_id".into(),
            rows.iter().map(|r| r.sector_id).collect::<Vec<u32>>(),
        ),
        Column::new(
            "sector".into(),
            rows.iter().map(|r| r.sector.as_str()).collect::<Vec<&str>>(),
        ),
        timestamp_column("created_at", rows.iter().map(|r| r.created_at))?,
    ])
}

pub fn companies_frame(rows: &[CompanyRow]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            "company_id".into(),
            rows.iter().map(|r| r.company_id).collect::<Vec<u32>>(),
        ),
        Column::new(
            "symbol".into(),
            rows.iter().map(|r| r.symbol.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            "company_name".into(),
            rows.iter()
                .map(|r| r.company_name.as_str())
                .collect::<Vec<&str>>(),
        ),
        Column::new(
            "sector_id".into(),
            rows.iter().map(|r| r.sector_id).collect::<Vec<Option<u32>>>(),
        ),
        Column::new(
            "sub_industry".into(),
            rows.iter()
                .map(|r| r.sub_industry.as_str())
                .collect::<Vec<&str>>(),
        ),
        Column::new(
            "headquarters".into(),
            rows.iter()
                .map(|r| r.headquarters.as_str())
                .collect::<Vec<&str>>(),
        ),
        date_column(
            "date_added",
            rows.iter().map(|r| r.date_added.map(epoch_days)).collect(),
        )?,
        Column::new(
            "cik".into(),
            rows.iter().map(|r| r.cik.as_deref()).collect::<Vec<Option<&str>>>(),
        ),
        timestamp_column("created_at", rows.iter().map(|r| r.created_at))?,
        timestamp_column("updated_at", rows.iter().map(|r| r.updated_at))?,
    ])
}

pub fn prices_frame(rows: &[PriceFactRow]) -> PolarsResult<DataFrame> {
    let prices = |f: fn(&PriceFactRow) -> f64| rows.iter().map(f).collect::<Vec<f64>>();

    DataFrame::new(vec![
        Column::new(
            "price_id".into(),
            rows.iter().map(|r| r.price_id).collect::<Vec<u32>>(),
        ),
        Column::new(
            "company_id".into(),
            rows.iter().map(|r| r.company_id).collect::<Vec<Option<u32>>>(),
        ),
        date_column(
            "date",
            rows.iter().map(|r| r.date.map(epoch_days)).collect(),
        )?,
        Column::new("open".into(), prices(|r| r.open)),
        Column::new("high".into(), prices(|r| r.high)),
        Column::new("low".into(), prices(|r| r.low)),
        Column::new("close".into(), prices(|r| r.close)),
        Column::new(
            "volume".into(),
            rows.iter().map(|r| r.volume).collect::<Vec<i64>>(),
        ),
        timestamp_column("extracted_at", rows.iter().map(|r| r.extracted_at))?,
        timestamp_column("loaded_at", rows.iter().map(|r| r.loaded_at))?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_offset_is_correct() {
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
    }

    #[test]
    fn price_frame_keeps_null_keys_and_dates() {
        let now = Utc::now();
        let rows = vec![
            PriceFactRow {
                price_id: 1,
                company_id: Some(1),
                date: NaiveDate::from_ymd_opt(2024, 1, 2),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10,
                extracted_at: now,
                loaded_at: now,
            },
            PriceFactRow {
                price_id: 2,
                company_id: None,
                date: None,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10,
                extracted_at: now,
                loaded_at: now,
            },
        ];
        let df = prices_frame(&rows).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 10);
        assert_eq!(df.column("company_id").unwrap().null_count(), 1);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("date").unwrap().null_count(), 1);
    }

    #[test]
    fn empty_tables_still_have_schema() {
        let df = sectors_frame(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 3);
        let df = companies_frame(&[]).unwrap();
        assert_eq!(df.width(), 10);
    }
}
