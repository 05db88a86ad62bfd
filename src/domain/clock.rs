//! Simulation clock. The only component that advances the current day.

use chrono::NaiveDate;

use super::calendar::{PriceSeries, TradingCalendar};
use super::error::WalkforwardError;
use super::ledger::Ledger;
use super::strategy::StrategyEngine;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    calendar: TradingCalendar,
    start_day: usize,
    stop_day: usize,
    day: usize,
    current_date: NaiveDate,
}

impl SimulationClock {
    /// Clock over calendar days `[start_day, stop_day)`.
    pub fn new(
        calendar: TradingCalendar,
        start_day: usize,
        stop_day: usize,
    ) -> Result<Self, WalkforwardError> {
        if stop_day > calendar.len() || start_day >= stop_day {
            return Err(WalkforwardError::InvalidCalendar {
                reason: format!(
                    "run [{start_day}, {stop_day}) does not fit a calendar of {} days",
                    calendar.len()
                ),
            });
        }
        let current_date = calendar
            .date_at(start_day)
            .ok_or(WalkforwardError::CalendarExhausted {
                day: start_day,
                bound: stop_day,
            })?;
        Ok(SimulationClock {
            calendar,
            start_day,
            stop_day,
            day: start_day,
            current_date,
        })
    }

    pub fn day(&self) -> usize {
        self.day
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn start_day(&self) -> usize {
        self.start_day
    }

    pub fn stop_day(&self) -> usize {
        self.stop_day
    }

    pub fn is_last_day(&self) -> bool {
        self.day + 1 == self.stop_day
    }

    /// Moves to the next trading day and tells the strategy.
    pub fn advance_day(&mut self, strategy: &mut StrategyEngine) -> Result<(), WalkforwardError> {
        let next = self.day + 1;
        let date = if next < self.stop_day {
            self.calendar.date_at(next)
        } else {
            None
        };
        let date = date.ok_or(WalkforwardError::CalendarExhausted {
            day: next,
            bound: self.stop_day,
        })?;

        self.day = next;
        self.current_date = date;
        strategy.sync_date(next, date);
        Ok(())
    }

    /// Marks open positions at today's price and appends today's total assets.
    pub fn update_total_assets(
        &self,
        ledger: &mut Ledger,
        series: &PriceSeries,
    ) -> Result<f64, WalkforwardError> {
        let price = ledger.check_price(series, self.current_date)?;
        let invested = ledger.mark_positions(price);
        Ok(ledger.update_assets(self.current_date, invested))
    }
}
