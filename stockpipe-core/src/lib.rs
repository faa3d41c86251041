//! Stockpipe Core — daily S&P 500 price extraction, validation, and star-schema reshaping.
//!
//! This crate contains the pipeline's algorithmic core:
//! - Raw company and price record types
//! - Retrying extractor with exponential backoff over a pluggable price source
//! - Twelve-rule validation engine producing a diagnostic report
//! - Transformer building sector/company dimensions and the daily price fact
//!
//! Around the core sit thin collaborators: TOML configuration, the company
//! reference CSV loader, and Parquet staging with Hive-style partitions.

pub mod config;
pub mod extract;
pub mod record;
pub mod reference;
pub mod source;
pub mod staging;
pub mod transform;
pub mod validation;

pub use config::{ConfigError, ExtractConfig, PipelineConfig, StagingConfig};
pub use extract::{Extraction, Extractor, RetryPolicy, Sleeper, ThreadSleeper};
pub use record::{RawCompanyRecord, RawPriceRecord};
pub use source::{PriceSource, SourceBar, SourceError, YahooSource};
pub use transform::{transform, transform_at, StarSchema, TransformError};
pub use validation::{validate_prices, CheckName, ValidationReport, Verdict};
