//! Trading calendar and per-ticker price series.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::error::WalkforwardError;

/// Ordered, duplicate-free sequence of trading dates addressable by day index.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Builds a calendar from dates that must already be strictly increasing.
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self, WalkforwardError> {
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(WalkforwardError::InvalidCalendar {
                reason: format!("{} is not after {}", w[1], w[0]),
            });
        }
        Ok(TradingCalendar { dates })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date_at(&self, day: usize) -> Option<NaiveDate> {
        self.dates.get(day).copied()
    }

    pub fn index_of(&self, date: NaiveDate) -> Result<usize, WalkforwardError> {
        self.dates
            .binary_search(&date)
            .map_err(|_| WalkforwardError::DateNotFound { date })
    }

    pub fn range(&self, start: usize, stop: usize) -> &[NaiveDate] {
        let stop = stop.min(self.dates.len());
        let start = start.min(stop);
        &self.dates[start..stop]
    }
}

/// Positive prices for one ticker keyed by date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    prices: BTreeMap<NaiveDate, f64>,
}

impl PriceSeries {
    pub fn new<I>(ticker: &str, points: I) -> Result<Self, WalkforwardError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut prices = BTreeMap::new();
        for (date, price) in points {
            if !price.is_finite() || price <= 0.0 {
                return Err(WalkforwardError::Database {
                    reason: format!("{ticker} {date}: price must be positive, got {price}"),
                });
            }
            prices.insert(date, price);
        }
        Ok(PriceSeries {
            ticker: ticker.to_string(),
            prices,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn price_on(&self, date: NaiveDate) -> Result<f64, WalkforwardError> {
        self.prices
            .get(&date)
            .copied()
            .ok_or_else(|| WalkforwardError::PriceNotFound {
                ticker: self.ticker.clone(),
                date,
            })
    }

    /// Every price this ticker has strictly before `date`, oldest first.
    /// Days before the ticker was listed are simply absent.
    pub fn history_before(&self, date: NaiveDate) -> Vec<f64> {
        self.prices.range(..date).map(|(_, &p)| p).collect()
    }

    /// As [`history_before`](Self::history_before), including `date` itself.
    pub fn history_through(&self, date: NaiveDate) -> Vec<f64> {
        self.prices.range(..=date).map(|(_, &p)| p).collect()
    }

    /// Prices for every calendar day in `[start, stop)`, in calendar order.
    pub fn aligned(
        &self,
        calendar: &TradingCalendar,
        start: usize,
        stop: usize,
    ) -> Result<Vec<f64>, WalkforwardError> {
        calendar
            .range(start, stop)
            .iter()
            .map(|&date| self.price_on(date))
            .collect()
    }
}
