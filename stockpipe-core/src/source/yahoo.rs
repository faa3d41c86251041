//! Yahoo Finance price source.
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API with a blocking client.
//! One HTTP request per call; the extractor decides whether to try again.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes, which surface as `ResponseFormatChanged`.

use super::{PriceSource, SourceBar, SourceError};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<i64>>,
}

/// Yahoo Finance chart API source.
pub struct YahooSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://query2.finance.yahoo.com";

    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Point the source at another host (a proxy or a local stub).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::NetworkUnreachable(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Chart API URL for `[start, end)`.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        format!(
            "{}/v8/finance/chart/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url
        )
    }

    /// Parse a chart response into bars inside `[start, end)`.
    fn parse_response(
        symbol: &str,
        resp: ChartResponse,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SourceBar>, SourceError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                SourceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => SourceError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("result array is empty".into()))?;

        // No timestamps means no trading days in the window.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    SourceError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            if date < start || date >= end {
                continue;
            }

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Holidays and halted sessions come back as all-null rows.
            // Partially null rows are skipped too, never filled.
            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
                (open, high, low, close, volume)
            else {
                if [open, high, low, close].iter().any(Option::is_some) || volume.is_some() {
                    warn!(symbol, %date, "skipping partially null bar");
                }
                continue;
            };

            bars.push(SourceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        Ok(bars)
    }
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SourceBar>, SourceError> {
        let url = self.chart_url(symbol, start, end);
        debug!(%url, "requesting chart");

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(e.to_string())
            } else {
                SourceError::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(SourceError::RateLimited { retry_after_secs });
        }
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        // Yahoo answers unknown symbols with 404 and a chart error body
        let chart: ChartResponse = resp.json().map_err(|e| {
            SourceError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(symbol, chart, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(json: &str) -> Result<Vec<SourceBar>, SourceError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooSource::parse_response("AAPL", resp, day(2024, 1, 1), day(2024, 1, 10))
    }

    #[test]
    fn parses_bars_and_skips_null_rows() {
        // 2024-01-02, 2024-01-03 (null row), 2024-01-04
        let json = r#"{"chart":{"result":[{"timestamp":[1704206400,1704292800,1704379200],
            "indicators":{"quote":[{"open":[187.15,null,182.15],"high":[188.44,null,183.09],
            "low":[183.89,null,180.88],"close":[185.64,null,181.91],
            "volume":[82488700,null,71983600]}]}}],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, day(2024, 1, 2));
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[1].date, day(2024, 1, 4));
        assert_eq!(bars[1].volume, 71_983_600);
    }

    #[test]
    fn partially_null_rows_are_skipped() {
        // 2024-01-02 missing close, 2024-01-03 missing volume, 2024-01-04 complete
        let json = r#"{"chart":{"result":[{"timestamp":[1704206400,1704292800,1704379200],
            "indicators":{"quote":[{"open":[187.15,184.22,182.15],"high":[188.44,185.88,183.09],
            "low":[183.89,183.43,180.88],"close":[null,184.25,181.91],
            "volume":[82488700,null,71983600]}]}}],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, day(2024, 1, 4));
        assert_eq!((bars[0].close, bars[0].volume), (181.91, 71_983_600));
    }

    #[test]
    fn missing_timestamps_is_an_empty_result() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{"open":[],"high":[],
            "low":[],"close":[],"volume":[]}]}}],"error":null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found",
            "description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse(json),
            Err(SourceError::SymbolNotFound { symbol }) if symbol == "AAPL"
        ));
    }

    #[test]
    fn other_chart_errors_are_format_changes() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"x"}}}"#;
        assert!(matches!(
            parse(json),
            Err(SourceError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn bars_outside_window_are_dropped() {
        // 2023-12-29 and 2024-01-10 fall outside [2024-01-01, 2024-01-10)
        let json = r#"{"chart":{"result":[{"timestamp":[1703851200,1704206400,1704895200],
            "indicators":{"quote":[{"open":[1.0,2.0,3.0],"high":[1.0,2.0,3.0],
            "low":[1.0,2.0,3.0],"close":[1.0,2.0,3.0],"volume":[1,2,3]}]}}],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, day(2024, 1, 2));
    }

    #[test]
    fn chart_url_uses_exclusive_end() {
        let source = YahooSource::with_base_url("http://localhost:9").unwrap();
        let url = source.chart_url("MSFT", day(2024, 1, 1), day(2024, 1, 2));
        assert_eq!(
            url,
            "http://localhost:9/v8/finance/chart/MSFT?period1=1704067200&period2=1704153600&interval=1d"
        );
    }
}
