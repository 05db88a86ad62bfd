#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use walkforward::domain::error::WalkforwardError;
use walkforward::domain::forecast::ForecastModel;
pub use walkforward::domain::price::PriceRecord;
use walkforward::ports::data_port::MarketDataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceRecord>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_records(mut self, ticker: &str, records: Vec<PriceRecord>) -> Self {
        self.data.insert(ticker.to_string(), records);
        self
    }

    pub fn with_prices(self, ticker: &str, prices: &[f64]) -> Self {
        let records = make_records(ticker, prices);
        self.with_records(ticker, records)
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    fn check(&self, ticker: &str) -> Result<(), WalkforwardError> {
        match self.errors.get(ticker) {
            Some(reason) => Err(WalkforwardError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl MarketDataPort for MockDataPort {
    fn dates(&self) -> Result<Vec<NaiveDate>, WalkforwardError> {
        let mut dates: Vec<NaiveDate> = self
            .data
            .values()
            .flat_map(|records| records.iter().map(|r| r.date()))
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    fn fetch_records(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, WalkforwardError> {
        self.check(ticker)?;
        Ok(self
            .data
            .get(ticker)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.date() >= start && r.date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self) -> Result<Vec<String>, WalkforwardError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, WalkforwardError> {
        self.check(ticker)?;
        match self.data.get(ticker) {
            Some(records) if !records.is_empty() => {
                let min = records.iter().map(|r| r.date()).min().unwrap();
                let max = records.iter().map(|r| r.date()).max().unwrap();
                Ok(Some((min, max, records.len())))
            }
            _ => Ok(None),
        }
    }
}

/// A model whose fit always fails.
pub struct FailingModel;

impl ForecastModel for FailingModel {
    fn name(&self) -> String {
        "failing".to_string()
    }

    fn fit(&mut self, _history: &[f64]) -> Result<(), WalkforwardError> {
        Err(WalkforwardError::ModelFitFailure {
            model: "failing".to_string(),
            reason: "always fails".to_string(),
        })
    }

    fn observe(&mut self, _history: &[f64]) -> Result<(), WalkforwardError> {
        Ok(())
    }

    fn predict(&self) -> Result<f64, WalkforwardError> {
        Err(WalkforwardError::ModelFitFailure {
            model: "failing".to_string(),
            reason: "not fitted".to_string(),
        })
    }
}

/// First calendar day used by every fixture.
pub fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, 2).unwrap()
}

/// Fixture date `day` days after [`base_date`].
pub fn date(day: usize) -> NaiveDate {
    base_date().checked_add_days(Days::new(day as u64)).unwrap()
}

/// A record whose high, low and close all equal `price`.
pub fn make_record(ticker: &str, day: usize, price: f64) -> PriceRecord {
    PriceRecord::new(ticker, date(day), price, price, price, price, 1_000).unwrap()
}

pub fn make_records(ticker: &str, prices: &[f64]) -> Vec<PriceRecord> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| make_record(ticker, i, p))
        .collect()
}

pub fn constant_prices(n: usize, price: f64) -> Vec<f64> {
    vec![price; n]
}

pub fn linear_prices(n: usize, start: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Rises by 1 a day from 100, then falls to `crash_to` on `crash_day` and
/// rises by 1 a day from there.
pub fn crash_prices(n: usize, crash_day: usize, crash_to: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            if i < crash_day {
                100.0 + i as f64
            } else {
                crash_to + (i - crash_day) as f64
            }
        })
        .collect()
}

/// Deterministic oscillation around an upward drift.
pub fn wavy_prices(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.3 * t + 6.0 * (t / 3.0).sin()
        })
        .collect()
}

/// Renders records as the CSV layout the file adapter reads.
pub fn records_csv(records: &[PriceRecord]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for r in records {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            r.date(),
            r.open(),
            r.high(),
            r.low(),
            r.close(),
            r.volume()
        ));
    }
    out
}
