//! Strategy engine: turns the forecast into orders against the ledger.

use chrono::NaiveDate;

use super::calendar::{PriceSeries, TradingCalendar};
use super::error::WalkforwardError;
use super::forecast::ForecastModel;
use super::ledger::{Ledger, Signal};
use super::position::{Direction, ExitReason, PositionSpec};

/// Per-position parameters and entry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub trigger_pct: f64,
    pub hold_time: usize,
    pub return_window: usize,
    pub allow_shorting: bool,
    pub close_on_reversal: bool,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            trigger_pct: 0.03,
            hold_time: 5,
            return_window: 5,
            allow_shorting: true,
            close_on_reversal: true,
        }
    }
}

pub struct StrategyEngine {
    model: Box<dyn ForecastModel>,
    calendar: TradingCalendar,
    series: PriceSeries,
    params: StrategyParams,
    current_day: usize,
    current_date: NaiveDate,
}

impl StrategyEngine {
    pub fn new(
        model: Box<dyn ForecastModel>,
        calendar: TradingCalendar,
        series: PriceSeries,
        params: StrategyParams,
        start_day: usize,
    ) -> Result<Self, WalkforwardError> {
        let current_date =
            calendar
                .date_at(start_day)
                .ok_or(WalkforwardError::CalendarExhausted {
                    day: start_day,
                    bound: calendar.len(),
                })?;
        Ok(StrategyEngine {
            model,
            calendar,
            series,
            params,
            current_day: start_day,
            current_date,
        })
    }

    pub fn model_name(&self) -> String {
        self.model.name()
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn current_day(&self) -> usize {
        self.current_day
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    /// Moves the cursor. Only the simulation clock calls this.
    pub(crate) fn sync_date(&mut self, day: usize, date: NaiveDate) {
        self.current_day = day;
        self.current_date = date;
    }

    /// Trains the model on every price the ticker has strictly before `day`.
    pub fn fit_model(&mut self, day: usize) -> Result<(), WalkforwardError> {
        let date = self
            .calendar
            .date_at(day)
            .ok_or(WalkforwardError::CalendarExhausted {
                day,
                bound: self.calendar.len(),
            })?;
        let window = self.series.history_before(date);
        tracing::debug!(model = %self.model.name(), observations = window.len(), "fitting model");
        self.model.fit(&window)
    }

    /// `(price[day] - price[day - window]) / price[day - window]`.
    pub fn arithmetic_returns(&self, window: usize, day: usize) -> Result<f64, WalkforwardError> {
        if window == 0 || day < window || day > self.current_day {
            return Err(WalkforwardError::InsufficientHistory { window, day });
        }
        let then = self.price_at(day - window)?;
        let now = self.price_at(day)?;
        Ok((now - then) / then)
    }

    /// Model's expected return from today's price to tomorrow's.
    pub fn forecast_return(&mut self) -> Result<f64, WalkforwardError> {
        let today = self.price_at(self.current_day)?;
        let history = self.series.history_through(self.current_date);
        self.model.observe(&history)?;
        let forecast = self.model.predict()?;
        Ok((forecast - today) / today)
    }

    /// Forecast return confirmed by trailing momentum. When the trailing
    /// return does not share the forecast's sign the result is 0.
    pub fn evaluate(&mut self) -> Result<f64, WalkforwardError> {
        let trailing = self.arithmetic_returns(self.params.return_window, self.current_day)?;
        let forecast = self.forecast_return()?;
        tracing::trace!(day = self.current_day, trailing, forecast, "evaluated");
        if trailing * forecast > 0.0 {
            Ok(forecast)
        } else {
            Ok(0.0)
        }
    }

    /// Closes positions that oppose `signal`. Returns how many were closed.
    pub fn close_reversed(
        &self,
        ledger: &mut Ledger,
        signal: Signal,
        price: f64,
    ) -> Result<usize, WalkforwardError> {
        let Some(direction) = signal.direction() else {
            return Ok(0);
        };
        if !self.params.close_on_reversal {
            return Ok(0);
        }
        let ids = ledger.open_ids(Some(direction.opposite()));
        for &id in &ids {
            ledger.sell(
                id,
                price,
                self.current_date,
                self.current_day,
                ExitReason::Reversal,
            )?;
        }
        Ok(ids.len())
    }

    /// Opens a position for `signal` on `date` sized at `share_pct` of liquid
    /// capital. Returns `None` when there is nothing to do: a hold, a sell
    /// with shorting disabled, or a position already open in that direction.
    ///
    /// The stop-loss budget is a portfolio-wide floor enforced by the caller;
    /// it is only reported here.
    pub fn make_position(
        &self,
        ledger: &mut Ledger,
        signal: Signal,
        date: NaiveDate,
        stop_loss_budget: f64,
        share_pct: f64,
    ) -> Result<Option<u64>, WalkforwardError> {
        let Some(direction) = signal.direction() else {
            return Ok(None);
        };
        if direction == Direction::Short && !self.params.allow_shorting {
            return Ok(None);
        }
        if ledger.has_open(direction) {
            return Ok(None);
        }

        let entry_day = self.calendar.index_of(date)?;
        if entry_day > self.current_day {
            return Err(WalkforwardError::DateNotFound { date });
        }
        let price = ledger.check_price(&self.series, date)?;
        let available = ledger.liquid_capital();
        let shares = (share_pct * available / price + 1e-9).floor();
        if shares < 1.0 {
            return Err(WalkforwardError::InsufficientCapital {
                required: price,
                available,
            });
        }

        let id = ledger.open_position(PositionSpec {
            ticker: ledger.ticker().to_string(),
            direction,
            entry_date: date,
            entry_day,
            entry_price: price,
            shares: shares as u64,
            hold_time: self.params.hold_time,
            trigger_pct: self.params.trigger_pct,
        })?;

        if ledger.liquid_capital() < stop_loss_budget {
            tracing::debug!(
                liquid = ledger.liquid_capital(),
                stop_loss_budget,
                "liquid capital below stop-loss budget"
            );
        }
        Ok(Some(id))
    }

    fn price_at(&self, day: usize) -> Result<f64, WalkforwardError> {
        let date = self
            .calendar
            .date_at(day)
            .ok_or(WalkforwardError::InsufficientHistory { window: 0, day })?;
        self.series.price_on(date)
    }
}
