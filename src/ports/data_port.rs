//! Market data access port.

use crate::domain::error::WalkforwardError;
use crate::domain::price::{PriceField, PriceRecord};
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Every distinct trading date in the collection, ascending.
    fn dates(&self) -> Result<Vec<NaiveDate>, WalkforwardError>;

    /// Records for `ticker` with `start <= date <= end`, ascending by date.
    fn fetch_records(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, WalkforwardError>;

    fn list_tickers(&self) -> Result<Vec<String>, WalkforwardError>;

    /// First date, last date and row count for `ticker`, if it has any data.
    fn data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, WalkforwardError>;

    fn price_on_date(
        &self,
        ticker: &str,
        date: NaiveDate,
        field: PriceField,
    ) -> Result<f64, WalkforwardError> {
        self.fetch_records(ticker, date, date)?
            .first()
            .map(|r| r.price(field))
            .ok_or_else(|| WalkforwardError::PriceNotFound {
                ticker: ticker.to_string(),
                date,
            })
    }

    fn price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        field: PriceField,
    ) -> Result<Vec<(NaiveDate, f64)>, WalkforwardError> {
        Ok(self
            .fetch_records(ticker, start, end)?
            .iter()
            .map(|r| (r.date(), r.price(field)))
            .collect())
    }
}
