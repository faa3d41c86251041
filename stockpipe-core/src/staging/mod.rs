//! Staging of a run's tables as Parquet with Hive-style date partitions.
//!
//! Layout: `{root}/{prefix}{table}/date={YYYY-MM-DD}/{table}_{YYYY-MM-DD}.parquet`
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - `meta.json` sidecar per partition (row count, BLAKE3 hash, staged_at)
//! - The validation report is staged as JSON under `validation_report/`
//!
//! Warehouse ingestion picks files up from here; this module only writes and
//! lists them.

pub mod frames;

use crate::config::StagingConfig;
use crate::transform::StarSchema;
use crate::validation::ValidationReport;
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Name of the staged validation report dataset.
pub const REPORT_DATASET: &str = "validation_report";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("serialize {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The three staged tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    DimSector,
    DimCompany,
    FactDailyPrices,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::DimSector, Table::DimCompany, Table::FactDailyPrices];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::DimSector => "dim_sector",
            Table::DimCompany => "dim_company",
            Table::FactDailyPrices => "fact_daily_prices",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = StagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StagingError::UnknownTable(s.to_string()))
    }
}

/// Sidecar written next to each staged Parquet file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedMeta {
    pub table: String,
    pub partition_date: NaiveDate,
    pub rows: usize,
    pub data_hash: String,
    pub staged_at: DateTime<Utc>,
}

/// A file written by a stager.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub meta: StagedMeta,
}

/// Destination for a run's output datasets.
pub trait Stager {
    /// Write one table for a partition date, replacing any earlier file.
    fn stage(
        &self,
        table: Table,
        df: &mut DataFrame,
        partition: NaiveDate,
    ) -> Result<StagedFile, StagingError>;

    /// Write the validation report for a partition date.
    fn stage_report(
        &self,
        report: &ValidationReport,
        partition: NaiveDate,
    ) -> Result<PathBuf, StagingError>;

    /// Staged Parquet files, sorted; all tables when `table` is `None`.
    fn list(&self, table: Option<Table>) -> Result<Vec<PathBuf>, StagingError>;
}

/// Stager writing to a local directory tree.
pub struct LocalStager {
    root: PathBuf,
    prefix: String,
}

impl LocalStager {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(&config.root, &config.prefix)
    }

    /// `{root}/{prefix}` — everything this stager writes lives below it.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(&self.prefix)
    }

    fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(format!("{}{dataset}", self.prefix))
    }

    fn partition_dir(&self, dataset: &str, partition: NaiveDate) -> PathBuf {
        self.dataset_dir(dataset).join(format!("date={partition}"))
    }

    /// Key of a staged table file.
    pub fn table_path(&self, table: Table, partition: NaiveDate) -> PathBuf {
        self.partition_dir(table.as_str(), partition)
            .join(format!("{table}_{partition}.parquet"))
    }

    pub fn report_path(&self, partition: NaiveDate) -> PathBuf {
        self.partition_dir(REPORT_DATASET, partition)
            .join(format!("{REPORT_DATASET}_{partition}.json"))
    }
}

impl Stager for LocalStager {
    fn stage(
        &self,
        table: Table,
        df: &mut DataFrame,
        partition: NaiveDate,
    ) -> Result<StagedFile, StagingError> {
        let path = self.table_path(table, partition);
        let dir = self.partition_dir(table.as_str(), partition);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(df, &tmp_path)?;
        if let Err(source) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StagingError::Io { path, source });
        }

        let bytes = fs::read(&path).map_err(io_err(&path))?;
        let meta = StagedMeta {
            table: table.to_string(),
            partition_date: partition,
            rows: df.height(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
            staged_at: Utc::now(),
        };
        let meta_path = dir.join("meta.json");
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
            .map_err(io_err(&meta_path))?;

        info!(table = %table, rows = meta.rows, path = %path.display(), "staged table");
        Ok(StagedFile { path, meta })
    }

    fn stage_report(
        &self,
        report: &ValidationReport,
        partition: NaiveDate,
    ) -> Result<PathBuf, StagingError> {
        let path = self.report_path(partition);
        let dir = self.partition_dir(REPORT_DATASET, partition);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        fs::write(&path, serde_json::to_string_pretty(report)?).map_err(io_err(&path))?;
        info!(path = %path.display(), all_passed = report.all_passed, "staged validation report");
        Ok(path)
    }

    fn list(&self, table: Option<Table>) -> Result<Vec<PathBuf>, StagingError> {
        let base = match table {
            Some(t) => self.dataset_dir(t.as_str()),
            None => self.staging_dir(),
        };
        let mut files = Vec::new();
        if base.exists() {
            collect_parquet(&base, &mut files)?;
        }
        files.sort();
        Ok(files)
    }
}

/// Stage the three tables and the report of a run under one partition date.
pub fn stage_all(
    stager: &dyn Stager,
    schema: &StarSchema,
    partition: NaiveDate,
) -> Result<Vec<StagedFile>, StagingError> {
    let parquet_err = |e: PolarsError| StagingError::Parquet(format!("dataframe creation: {e}"));

    let mut frames = [
        (Table::DimSector, frames::sectors_frame(&schema.sectors).map_err(parquet_err)?),
        (Table::DimCompany, frames::companies_frame(&schema.companies).map_err(parquet_err)?),
        (Table::FactDailyPrices, frames::prices_frame(&schema.prices).map_err(parquet_err)?),
    ];

    let mut staged = Vec::with_capacity(frames.len());
    for (table, df) in frames.iter_mut() {
        staged.push(stager.stage(*table, df, partition)?);
    }
    stager.stage_report(&schema.report, partition)?;

    info!(tables = staged.len(), %partition, "staging complete");
    Ok(staged)
}

fn collect_parquet(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StagingError> {
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        if path.is_dir() {
            collect_parquet(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            out.push(path);
        }
    }
    Ok(())
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StagingError> {
    let file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| StagingError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}
