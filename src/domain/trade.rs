//! Walk-forward run over a calendar window.
//!
//! Each trading day, in order:
//! 1. close every open position whose trigger fired or whose hold expired,
//! 2. evaluate the forecast and derive a signal,
//! 3. on a non-hold signal close reversed positions and open a new one,
//! 4. mark positions and append the day's total assets,
//! 5. advance the clock unless this is the last day.

use chrono::NaiveDate;

use super::calendar::{PriceSeries, TradingCalendar};
use super::clock::SimulationClock;
use super::error::WalkforwardError;
use super::forecast::ForecastModel;
use super::ledger::{Ledger, Signal};
use super::metrics::{Metrics, RunResult};
use super::position::ExitPrecedence;
use super::price::PriceField;
use super::strategy::{StrategyEngine, StrategyParams};
use crate::ports::data_port::MarketDataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeConfig {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub stop_date: NaiveDate,
    pub starting_capital: f64,
    /// Fraction of starting capital the run may lose before it stops opening
    /// positions.
    pub loss_fraction: f64,
    pub share_pct: f64,
    pub signal_threshold: f64,
    pub exit_precedence: ExitPrecedence,
    pub price_field: PriceField,
    pub risk_free_rate: f64,
    pub strategy: StrategyParams,
}

impl TradeConfig {
    pub fn new(ticker: &str, start_date: NaiveDate, stop_date: NaiveDate) -> Self {
        TradeConfig {
            ticker: ticker.to_string(),
            start_date,
            stop_date,
            starting_capital: 5000.0,
            loss_fraction: 0.30,
            share_pct: 1.0,
            signal_threshold: 0.0,
            exit_precedence: ExitPrecedence::default(),
            price_field: PriceField::default(),
            risk_free_rate: 0.0,
            strategy: StrategyParams::default(),
        }
    }

    /// Total assets below this halt new entries.
    pub fn stop_loss_budget(&self) -> f64 {
        (1.0 - self.loss_fraction) * self.starting_capital
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub result: RunResult,
    pub metrics: Metrics,
    pub ledger: Ledger,
    pub model: String,
    /// Calendar dates of the simulated window, one per history entry.
    pub dates: Vec<NaiveDate>,
    /// Buy-and-hold value of the starting capital on each of `dates`.
    pub buy_and_hold: Vec<f64>,
    /// First day total assets fell below the stop-loss budget.
    pub halted_on: Option<NaiveDate>,
}

pub fn run_trade(
    data: &dyn MarketDataPort,
    config: &TradeConfig,
    model: Box<dyn ForecastModel>,
) -> Result<TradeOutcome, WalkforwardError> {
    let calendar = TradingCalendar::new(data.dates()?)?;
    let start_day = calendar.index_of(config.start_date)?;
    let stop_day = calendar.index_of(config.stop_date)?;
    if start_day >= stop_day {
        return Err(WalkforwardError::invalid(
            "backtest",
            "start_date",
            format!(
                "{} must be before stop_date {}",
                config.start_date, config.stop_date
            ),
        ));
    }

    let first_date = calendar
        .date_at(0)
        .ok_or_else(|| WalkforwardError::InvalidCalendar {
            reason: "empty calendar".into(),
        })?;
    let points = data.price_series(
        &config.ticker,
        first_date,
        config.stop_date,
        config.price_field,
    )?;
    let series = PriceSeries::new(&config.ticker, points)?;
    // Training uses whatever history the ticker has; the run window must be fully priced.
    let prices = series.aligned(&calendar, start_day, stop_day)?;

    tracing::info!(
        ticker = %config.ticker,
        model = %model.name(),
        start = %config.start_date,
        stop = %config.stop_date,
        days = stop_day - start_day,
        "starting run"
    );

    let mut strategy = StrategyEngine::new(
        model,
        calendar.clone(),
        series.clone(),
        config.strategy.clone(),
        start_day,
    )?;
    strategy.fit_model(start_day)?;

    let mut clock = SimulationClock::new(calendar.clone(), start_day, stop_day)?;
    let mut investor = Ledger::new(
        &config.ticker,
        config.starting_capital,
        config.signal_threshold,
    );
    let budget = config.stop_loss_budget();
    let mut halted_on = None;

    loop {
        let day = clock.day();
        let date = clock.current_date();
        let price = investor.check_price(strategy.series(), date)?;

        for id in investor.open_ids(None) {
            let reason = investor
                .position(id)
                .and_then(|p| p.exit_reason(price, day, config.exit_precedence));
            if let Some(reason) = reason {
                investor.sell(id, price, date, day, reason)?;
            }
        }

        let forecast = strategy.evaluate()?;
        let signal = investor.signal(forecast);
        if signal != Signal::Hold {
            strategy.close_reversed(&mut investor, signal, price)?;
            if halted_on.is_none() {
                match strategy.make_position(
                    &mut investor,
                    signal,
                    date,
                    budget,
                    config.share_pct,
                ) {
                    Ok(_) => {}
                    Err(WalkforwardError::InsufficientCapital {
                        required,
                        available,
                    }) => {
                        tracing::warn!(%date, required, available, "skipping entry");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let total = clock.update_total_assets(&mut investor, strategy.series())?;
        tracing::debug!(day, %date, price, forecast, ?signal, total, "day complete");

        if halted_on.is_none() && total < budget {
            tracing::warn!(%date, total, budget, "stop-loss budget breached; no new entries");
            halted_on = Some(date);
        }

        if clock.is_last_day() {
            break;
        }
        clock.advance_day(&mut strategy)?;
    }

    let totals = investor.total_asset_history();
    let result = RunResult::new(
        config.strategy.trigger_pct,
        config.share_pct,
        config.starting_capital,
        &totals,
        &prices,
    );
    let metrics = Metrics::compute(&investor, config.risk_free_rate);
    let buy_and_hold = match prices.first() {
        Some(&first) => prices
            .iter()
            .map(|p| config.starting_capital * p / first)
            .collect(),
        None => Vec::new(),
    };

    tracing::info!(
        return_pct = result.return_pct,
        possible_pct = result.possible_pct,
        mdd = result.mdd,
        trades = metrics.trades.total(),
        "run complete"
    );

    Ok(TradeOutcome {
        result,
        metrics,
        model: strategy.model_name(),
        ledger: investor,
        dates: calendar.range(start_day, stop_day).to_vec(),
        buy_and_hold,
        halted_on,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_loss_budget_from_loss_fraction() {
        let start = NaiveDate::from_ymd_opt(2017, 1, 5).unwrap();
        let stop = NaiveDate::from_ymd_opt(2018, 2, 5).unwrap();
        let config = TradeConfig::new("aapl", start, stop);
        assert!((config.stop_loss_budget() - 3500.0).abs() < 1e-9);
    }

    #[test]
    fn defaults_match_command_line_defaults() {
        let start = NaiveDate::from_ymd_opt(2017, 1, 5).unwrap();
        let config = TradeConfig::new("aapl", start, start);
        assert!((config.starting_capital - 5000.0).abs() < f64::EPSILON);
        assert!((config.strategy.trigger_pct - 0.03).abs() < f64::EPSILON);
        assert!((config.share_pct - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.price_field, PriceField::Average);
    }
}
