//! Investor ledger: liquid capital, open positions and the daily asset history.

use chrono::NaiveDate;

use super::calendar::PriceSeries;
use super::error::WalkforwardError;
use super::position::{ClosedTrade, Direction, ExitReason, Position, PositionSpec};

/// Slack allowed when comparing a position's cost with liquid capital.
const CAPITAL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Maps a forecast return onto a trade decision. Returns strictly above
    /// `threshold` buy, strictly below `-threshold` sell, anything else holds.
    pub fn from_return(forecast_return: f64, threshold: f64) -> Self {
        if !forecast_return.is_finite() {
            Signal::Hold
        } else if forecast_return > threshold {
            Signal::Buy
        } else if forecast_return < -threshold {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Buy => Some(Direction::Long),
            Signal::Sell => Some(Direction::Short),
            Signal::Hold => None,
        }
    }
}

/// One end-of-day snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPoint {
    pub date: NaiveDate,
    pub liquid_capital: f64,
    pub invested: f64,
    pub total_assets: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    ticker: String,
    starting_capital: f64,
    signal_threshold: f64,
    liquid_capital: f64,
    open_positions: Vec<Position>,
    closed_trades: Vec<ClosedTrade>,
    history: Vec<AssetPoint>,
    next_id: u64,
}

impl Ledger {
    pub fn new(ticker: &str, starting_capital: f64, signal_threshold: f64) -> Self {
        Ledger {
            ticker: ticker.to_string(),
            starting_capital,
            signal_threshold,
            liquid_capital: starting_capital,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            history: Vec::new(),
            next_id: 1,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn starting_capital(&self) -> f64 {
        self.starting_capital
    }

    pub fn liquid_capital(&self) -> f64 {
        self.liquid_capital
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn history(&self) -> &[AssetPoint] {
        &self.history
    }

    pub fn capital_history(&self) -> Vec<f64> {
        self.history.iter().map(|p| p.liquid_capital).collect()
    }

    pub fn total_asset_history(&self) -> Vec<f64> {
        self.history.iter().map(|p| p.total_assets).collect()
    }

    /// Last recorded total, or the starting capital before the first day.
    pub fn total_assets(&self) -> f64 {
        self.history
            .last()
            .map_or(self.starting_capital, |p| p.total_assets)
    }

    /// Sum of the cached values of open positions.
    pub fn invested(&self) -> f64 {
        self.open_positions.iter().map(Position::current_value).sum()
    }

    pub fn has_open(&self, direction: Direction) -> bool {
        self.open_positions
            .iter()
            .any(|p| p.direction() == direction)
    }

    pub fn open_ids(&self, direction: Option<Direction>) -> Vec<u64> {
        self.open_positions
            .iter()
            .filter(|p| direction.is_none_or(|d| p.direction() == d))
            .map(Position::id)
            .collect()
    }

    pub fn position(&self, id: u64) -> Option<&Position> {
        self.open_positions.iter().find(|p| p.id() == id)
    }

    /// Today's price for this ledger's ticker.
    pub fn check_price(
        &self,
        series: &PriceSeries,
        date: NaiveDate,
    ) -> Result<f64, WalkforwardError> {
        if series.ticker() != self.ticker {
            return Err(WalkforwardError::PriceNotFound {
                ticker: self.ticker.clone(),
                date,
            });
        }
        series.price_on(date)
    }

    pub fn signal(&self, forecast_return: f64) -> Signal {
        Signal::from_return(forecast_return, self.signal_threshold)
    }

    /// Debits the position's cost and records it as open.
    pub fn open_position(&mut self, spec: PositionSpec) -> Result<u64, WalkforwardError> {
        let position = Position::open(self.next_id, spec)?;
        let cost = position.cost();
        if cost > self.liquid_capital + CAPITAL_TOLERANCE {
            return Err(WalkforwardError::InsufficientCapital {
                required: cost,
                available: self.liquid_capital,
            });
        }

        let id = position.id();
        self.next_id += 1;
        self.liquid_capital = (self.liquid_capital - cost).max(0.0);
        tracing::debug!(
            id,
            direction = ?position.direction(),
            shares = position.shares(),
            price = position.entry_price(),
            "opened position"
        );
        self.open_positions.push(position);
        Ok(id)
    }

    /// Closes an open position and credits its proceeds.
    pub fn sell(
        &mut self,
        id: u64,
        price: f64,
        date: NaiveDate,
        day: usize,
        reason: ExitReason,
    ) -> Result<ClosedTrade, WalkforwardError> {
        let idx = self
            .open_positions
            .iter()
            .position(|p| p.id() == id)
            .ok_or(WalkforwardError::InvalidStateTransition { id })?;

        let trade = self.open_positions[idx].sell(price, date, day, reason)?;
        self.open_positions.remove(idx);
        self.liquid_capital += trade.proceeds;
        tracing::debug!(id, ?reason, pnl = trade.pnl, "closed position");
        self.closed_trades.push(trade.clone());
        Ok(trade)
    }

    /// Re-values every open position at `price`; returns the invested total.
    pub(crate) fn mark_positions(&mut self, price: f64) -> f64 {
        self.open_positions
            .iter_mut()
            .map(|p| p.mark(price))
            .sum()
    }

    /// Appends one end-of-day snapshot from the marked value of open
    /// positions. Only the simulation clock calls this.
    pub(crate) fn update_assets(&mut self, date: NaiveDate, invested: f64) -> f64 {
        let total_assets = self.liquid_capital + invested;
        self.history.push(AssetPoint {
            date,
            liquid_capital: self.liquid_capital,
            invested,
            total_assets,
        });
        total_assets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 1, day).unwrap()
    }

    fn spec(direction: Direction, price: f64, shares: u64) -> PositionSpec {
        PositionSpec {
            ticker: "aapl".into(),
            direction,
            entry_date: date(5),
            entry_day: 3,
            entry_price: price,
            shares,
            hold_time: 5,
            trigger_pct: 0.03,
        }
    }

    #[test]
    fn new_ledger() {
        let ledger = Ledger::new("aapl", 5000.0, 0.0);
        assert!((ledger.liquid_capital() - 5000.0).abs() < f64::EPSILON);
        assert!((ledger.total_assets() - 5000.0).abs() < f64::EPSILON);
        assert!(ledger.open_positions().is_empty());
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn signal_thresholds() {
        let ledger = Ledger::new("aapl", 5000.0, 0.01);
        assert_eq!(ledger.signal(0.02), Signal::Buy);
        assert_eq!(ledger.signal(-0.02), Signal::Sell);
        assert_eq!(ledger.signal(0.01), Signal::Hold);
        assert_eq!(ledger.signal(0.0), Signal::Hold);
        assert_eq!(ledger.signal(f64::NAN), Signal::Hold);
    }

    #[test]
    fn zero_threshold_holds_only_on_zero() {
        assert_eq!(Signal::from_return(1e-9, 0.0), Signal::Buy);
        assert_eq!(Signal::from_return(-1e-9, 0.0), Signal::Sell);
        assert_eq!(Signal::from_return(0.0, 0.0), Signal::Hold);
    }

    #[test]
    fn open_position_debits_cost() {
        let mut ledger = Ledger::new("aapl", 5000.0, 0.0);
        let id = ledger.open_position(spec(Direction::Long, 50.0, 100)).unwrap();
        assert_eq!(id, 1);
        assert!(ledger.liquid_capital().abs() < f64::EPSILON);
        assert!((ledger.invested() - 5000.0).abs() < 1e-9);
        assert!(ledger.has_open(Direction::Long));
        assert!(!ledger.has_open(Direction::Short));
    }

    #[test]
    fn open_position_rejects_overdraft() {
        let mut ledger = Ledger::new("aapl", 1000.0, 0.0);
        match ledger.open_position(spec(Direction::Long, 50.0, 100)) {
            Err(WalkforwardError::InsufficientCapital {
                required,
                available,
            }) => {
                assert!((required - 5000.0).abs() < 1e-9);
                assert!((available - 1000.0).abs() < 1e-9);
            }
            other => panic!("expected InsufficientCapital, got {other:?}"),
        }
        assert!((ledger.liquid_capital() - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_credits_proceeds_and_records_trade() {
        let mut ledger = Ledger::new("aapl", 5000.0, 0.0);
        let id = ledger.open_position(spec(Direction::Long, 50.0, 100)).unwrap();
        let trade = ledger
            .sell(id, 52.0, date(9), 5, ExitReason::HoldTime)
            .unwrap();

        assert!((trade.pnl - 200.0).abs() < 1e-9);
        assert!((ledger.liquid_capital() - 5200.0).abs() < 1e-9);
        assert!(ledger.open_positions().is_empty());
        assert_eq!(ledger.closed_trades().len(), 1);
    }

    #[test]
    fn selling_twice_is_rejected() {
        let mut ledger = Ledger::new("aapl", 5000.0, 0.0);
        let id = ledger.open_position(spec(Direction::Long, 50.0, 10)).unwrap();
        ledger.sell(id, 50.0, date(9), 5, ExitReason::Trigger).unwrap();

        let again = ledger.sell(id, 50.0, date(9), 5, ExitReason::Trigger);
        assert!(matches!(
            again,
            Err(WalkforwardError::InvalidStateTransition { id: 1 })
        ));
        assert_eq!(ledger.closed_trades().len(), 1);
    }

    #[test]
    fn mark_and_update_assets_conserve_value() {
        let mut ledger = Ledger::new("aapl", 5000.0, 0.0);
        ledger.open_position(spec(Direction::Long, 50.0, 40)).unwrap();
        ledger.open_position(spec(Direction::Short, 50.0, 20)).unwrap();

        let invested = ledger.mark_positions(55.0);
        // long 40 * 55, short 20 * (100 - 55)
        assert!((invested - 3100.0).abs() < 1e-9);

        let total = ledger.update_assets(date(6), invested);
        assert!((total - 4100.0).abs() < 1e-9);
        let point = &ledger.history()[0];
        assert!((point.total_assets - 4100.0).abs() < 1e-9);
        assert!((point.invested - 3100.0).abs() < 1e-9);
        assert_eq!(ledger.capital_history(), vec![2000.0]);
    }

    #[test]
    fn open_ids_filter_by_direction() {
        let mut ledger = Ledger::new("aapl", 5000.0, 0.0);
        ledger.open_position(spec(Direction::Long, 10.0, 10)).unwrap();
        ledger.open_position(spec(Direction::Short, 10.0, 10)).unwrap();
        assert_eq!(ledger.open_ids(None), vec![1, 2]);
        assert_eq!(ledger.open_ids(Some(Direction::Short)), vec![2]);
    }

    #[test]
    fn check_price_rejects_other_ticker() {
        let ledger = Ledger::new("aapl", 5000.0, 0.0);
        let series = PriceSeries::new("vz", vec![(date(5), 47.0)]).unwrap();
        assert!(ledger.check_price(&series, date(5)).is_err());

        let series = PriceSeries::new("aapl", vec![(date(5), 116.0)]).unwrap();
        assert!((ledger.check_price(&series, date(5)).unwrap() - 116.0).abs() < f64::EPSILON);
    }
}
