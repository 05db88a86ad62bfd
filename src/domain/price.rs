//! Daily price records.
//!
//! Raw rows from a data store are parsed into a [`PriceRecord`] once; the
//! record is immutable afterwards.

use chrono::NaiveDate;

use super::error::WalkforwardError;

/// Which value of a daily record the simulation trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceField {
    /// (high + low) / 2
    #[default]
    Average,
    Close,
}

impl PriceField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "average" | "avg" | "mid" => Some(PriceField::Average),
            "close" => Some(PriceField::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    ticker: String,
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

impl PriceRecord {
    /// Validates and builds a record. Prices must be positive and finite,
    /// `low <= high`, and volume non-negative.
    pub fn new(
        ticker: &str,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Result<Self, WalkforwardError> {
        let invalid = |reason: String| WalkforwardError::Database {
            reason: format!("{ticker} {date}: {reason}"),
        };

        for (name, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{name} must be a positive price, got {value}")));
            }
        }
        if low > high {
            return Err(invalid(format!("low ({low}) above high ({high})")));
        }
        if volume < 0 {
            return Err(invalid(format!("negative volume {volume}")));
        }

        Ok(PriceRecord {
            ticker: ticker.to_string(),
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn volume(&self) -> i64 {
        self.volume
    }

    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Average => (self.high + self.low) / 2.0,
            PriceField::Close => self.close,
        }
    }
}
