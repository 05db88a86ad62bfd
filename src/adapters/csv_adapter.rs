//! CSV directory data adapter. One `<ticker>.csv` per ticker with columns
//! `date,open,high,low,close,volume`.

use crate::domain::error::WalkforwardError;
use crate::domain::price::PriceRecord;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    fn read_file(&self, ticker: &str, path: &Path) -> Result<Vec<PriceRecord>, WalkforwardError> {
        let mut rdr = csv::Reader::from_path(path).map_err(|e| WalkforwardError::Database {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let mut records = Vec::new();
        for row in rdr.deserialize::<CsvRow>() {
            let row = row.map_err(|e| WalkforwardError::Database {
                reason: format!("{}: {e}", path.display()),
            })?;
            let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d").map_err(|e| {
                WalkforwardError::Database {
                    reason: format!("{}: invalid date '{}': {e}", path.display(), row.date),
                }
            })?;
            records.push(PriceRecord::new(
                ticker, date, row.open, row.high, row.low, row.close, row.volume,
            )?);
        }
        records.sort_by_key(PriceRecord::date);
        Ok(records)
    }

    fn ticker_files(&self) -> Result<Vec<(String, PathBuf)>, WalkforwardError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| WalkforwardError::Database {
            reason: format!("failed to read directory {}: {e}", self.base_path.display()),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WalkforwardError::Database {
                reason: format!("directory entry error: {e}"),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.push((stem.to_string(), path.clone()));
            }
        }
        files.sort();
        Ok(files)
    }
}

impl MarketDataPort for CsvAdapter {
    fn dates(&self) -> Result<Vec<NaiveDate>, WalkforwardError> {
        let mut dates = BTreeSet::new();
        for (ticker, path) in self.ticker_files()? {
            dates.extend(self.read_file(&ticker, &path)?.iter().map(PriceRecord::date));
        }
        Ok(dates.into_iter().collect())
    }

    fn fetch_records(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, WalkforwardError> {
        let records = self.read_file(ticker, &self.csv_path(ticker))?;
        Ok(records
            .into_iter()
            .filter(|r| r.date() >= start && r.date() <= end)
            .collect())
    }

    fn list_tickers(&self) -> Result<Vec<String>, WalkforwardError> {
        Ok(self
            .ticker_files()?
            .into_iter()
            .map(|(ticker, _)| ticker)
            .collect())
    }

    fn data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, WalkforwardError> {
        let path = self.csv_path(ticker);
        if !path.exists() {
            return Ok(None);
        }
        let records = self.read_file(ticker, &path)?;
        Ok(match (records.first(), records.last()) {
            (Some(first), Some(last)) => Some((first.date(), last.date(), records.len())),
            _ => None,
        })
    }
}
