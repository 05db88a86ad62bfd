//! Position lifecycle: a position is opened once and closed at most once.

use chrono::NaiveDate;

use super::error::WalkforwardError;

/// Relative tolerance applied to the trigger comparison so that a move of
/// exactly `trigger_pct` fires despite rounding in the division.
const TRIGGER_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Price moved at least `trigger_pct` away from entry.
    Trigger,
    /// `hold_time` trading days elapsed.
    HoldTime,
    /// A signal in the opposite direction fired.
    Reversal,
}

/// Which forced exit is reported when both fire on the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPrecedence {
    #[default]
    TriggerFirst,
    HoldTimeFirst,
}

impl ExitPrecedence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trigger" | "trigger_first" => Some(ExitPrecedence::TriggerFirst),
            "hold_time" | "holdtime" | "hold_time_first" => Some(ExitPrecedence::HoldTimeFirst),
            _ => None,
        }
    }
}

/// Validated fields for opening a position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSpec {
    pub ticker: String,
    pub direction: Direction,
    pub entry_date: NaiveDate,
    pub entry_day: usize,
    pub entry_price: f64,
    pub shares: u64,
    pub hold_time: usize,
    pub trigger_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    id: u64,
    ticker: String,
    direction: Direction,
    entry_date: NaiveDate,
    entry_day: usize,
    entry_price: f64,
    shares: u64,
    hold_time: usize,
    trigger_pct: f64,
    status: PositionStatus,
    current_value: f64,
}

impl Position {
    pub fn open(id: u64, spec: PositionSpec) -> Result<Self, WalkforwardError> {
        if !spec.entry_price.is_finite() || spec.entry_price <= 0.0 {
            return Err(WalkforwardError::Database {
                reason: format!(
                    "{} {}: entry price must be positive, got {}",
                    spec.ticker, spec.entry_date, spec.entry_price
                ),
            });
        }
        let current_value = spec.shares as f64 * spec.entry_price;
        Ok(Position {
            id,
            ticker: spec.ticker,
            direction: spec.direction,
            entry_date: spec.entry_date,
            entry_day: spec.entry_day,
            entry_price: spec.entry_price,
            shares: spec.shares,
            hold_time: spec.hold_time,
            trigger_pct: spec.trigger_pct,
            status: PositionStatus::Open,
            current_value,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    pub fn entry_day(&self) -> usize {
        self.entry_day
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn shares(&self) -> u64 {
        self.shares
    }

    pub fn hold_time(&self) -> usize {
        self.hold_time
    }

    pub fn trigger_pct(&self) -> f64 {
        self.trigger_pct
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Cash debited when the position was opened.
    pub fn cost(&self) -> f64 {
        self.shares as f64 * self.entry_price
    }

    /// Value most recently computed by [`Position::mark`].
    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    /// Direction-adjusted value at `price`. A short holds its entry cost in
    /// escrow and gains what the price loses.
    pub fn value_at(&self, price: f64) -> f64 {
        let shares = self.shares as f64;
        match self.direction {
            Direction::Long => shares * price,
            Direction::Short => shares * (2.0 * self.entry_price - price),
        }
    }

    /// Re-values the position at today's price and caches the result.
    pub fn mark(&mut self, price: f64) -> f64 {
        self.current_value = self.value_at(price);
        self.current_value
    }

    /// True when `|price - entry| / entry >= trigger_pct`, in either direction.
    pub fn at_trigger_point(&self, price: f64) -> bool {
        let moved = (price - self.entry_price).abs() / self.entry_price;
        moved + TRIGGER_TOLERANCE >= self.trigger_pct
    }

    /// True once `hold_time` trading days have passed since entry.
    pub fn hold_expired(&self, day: usize) -> bool {
        day >= self.entry_day + self.hold_time
    }

    pub fn exit_reason(
        &self,
        price: f64,
        day: usize,
        precedence: ExitPrecedence,
    ) -> Option<ExitReason> {
        let trigger = self.at_trigger_point(price);
        let expired = self.hold_expired(day);
        match (trigger, expired, precedence) {
            (true, true, ExitPrecedence::HoldTimeFirst) => Some(ExitReason::HoldTime),
            (true, _, _) => Some(ExitReason::Trigger),
            (false, true, _) => Some(ExitReason::HoldTime),
            (false, false, _) => None,
        }
    }

    /// Closes the position at `price`. Fails if it is already closed.
    pub fn sell(
        &mut self,
        price: f64,
        exit_date: NaiveDate,
        exit_day: usize,
        reason: ExitReason,
    ) -> Result<ClosedTrade, WalkforwardError> {
        if self.status == PositionStatus::Closed {
            return Err(WalkforwardError::InvalidStateTransition { id: self.id });
        }

        let proceeds = self.value_at(price);
        self.status = PositionStatus::Closed;
        self.current_value = 0.0;

        Ok(ClosedTrade {
            id: self.id,
            ticker: self.ticker.clone(),
            direction: self.direction,
            shares: self.shares,
            entry_price: self.entry_price,
            exit_price: price,
            entry_date: self.entry_date,
            exit_date,
            holding_days: exit_day.saturating_sub(self.entry_day),
            proceeds,
            pnl: proceeds - self.cost(),
            reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub id: u64,
    pub ticker: String,
    pub direction: Direction,
    pub shares: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub holding_days: usize,
    pub proceeds: f64,
    pub pnl: f64,
    pub reason: ExitReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 1, 5).unwrap()
    }

    fn spec(direction: Direction) -> PositionSpec {
        PositionSpec {
            ticker: "aapl".into(),
            direction,
            entry_date: entry_date(),
            entry_day: 10,
            entry_price: 100.0,
            shares: 50,
            hold_time: 5,
            trigger_pct: 0.03,
        }
    }

    fn long() -> Position {
        Position::open(1, spec(Direction::Long)).unwrap()
    }

    fn short() -> Position {
        Position::open(2, spec(Direction::Short)).unwrap()
    }

    #[test]
    fn open_starts_at_cost() {
        let pos = long();
        assert!(pos.is_open());
        assert!((pos.cost() - 5000.0).abs() < f64::EPSILON);
        assert!((pos.current_value() - 5000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn open_rejects_bad_price() {
        let mut bad = spec(Direction::Long);
        bad.entry_price = 0.0;
        match Position::open(1, bad) {
            Err(WalkforwardError::Database { reason }) => {
                assert!(reason.contains("entry price must be positive"));
            }
            other => panic!("expected Database error, got {other:?}"),
        }
    }

    #[test]
    fn trigger_point_three_percent() {
        let pos = long();
        assert!(pos.at_trigger_point(97.0));
        assert!(pos.at_trigger_point(103.0));
        assert!(pos.at_trigger_point(90.0));
        assert!(pos.at_trigger_point(110.0));
        assert!(!pos.at_trigger_point(98.5));
        assert!(!pos.at_trigger_point(102.9));
    }

    #[test]
    fn trigger_is_symmetric_for_shorts() {
        let pos = short();
        assert!(pos.at_trigger_point(97.0));
        assert!(pos.at_trigger_point(103.0));
        assert!(!pos.at_trigger_point(101.0));
    }

    #[test]
    fn hold_expires_after_hold_time_days() {
        let pos = long();
        assert!(!pos.hold_expired(14));
        assert!(pos.hold_expired(15));
        assert!(pos.hold_expired(16));
    }

    #[test]
    fn long_value_tracks_price() {
        let mut pos = long();
        assert!((pos.mark(110.0) - 5500.0).abs() < 1e-9);
        assert!((pos.current_value() - 5500.0).abs() < 1e-9);
        assert!((pos.value_at(90.0) - pos.cost() + 500.0).abs() < 1e-9);
    }

    #[test]
    fn short_value_moves_inversely() {
        let mut pos = short();
        assert!((pos.mark(90.0) - 5500.0).abs() < 1e-9);
        assert!((pos.value_at(110.0) - pos.cost() + 500.0).abs() < 1e-9);
        assert!((pos.value_at(100.0) - pos.cost()).abs() < 1e-9);
    }

    #[test]
    fn exit_reason_prefers_trigger_by_default() {
        let pos = long();
        assert_eq!(
            pos.exit_reason(97.0, 15, ExitPrecedence::TriggerFirst),
            Some(ExitReason::Trigger)
        );
        assert_eq!(
            pos.exit_reason(97.0, 15, ExitPrecedence::HoldTimeFirst),
            Some(ExitReason::HoldTime)
        );
        assert_eq!(
            pos.exit_reason(100.0, 15, ExitPrecedence::TriggerFirst),
            Some(ExitReason::HoldTime)
        );
        assert_eq!(
            pos.exit_reason(97.0, 11, ExitPrecedence::HoldTimeFirst),
            Some(ExitReason::Trigger)
        );
        assert_eq!(pos.exit_reason(100.0, 11, ExitPrecedence::TriggerFirst), None);
    }

    #[test]
    fn sell_closes_once() {
        let mut pos = long();
        let exit = NaiveDate::from_ymd_opt(2017, 1, 12).unwrap();
        let trade = pos.sell(104.0, exit, 15, ExitReason::Trigger).unwrap();

        assert_eq!(pos.status(), PositionStatus::Closed);
        assert!((trade.proceeds - 5200.0).abs() < 1e-9);
        assert!((trade.pnl - 200.0).abs() < 1e-9);
        assert_eq!(trade.holding_days, 5);
        assert_eq!(trade.reason, ExitReason::Trigger);

        match pos.sell(104.0, exit, 15, ExitReason::HoldTime) {
            Err(WalkforwardError::InvalidStateTransition { id }) => assert_eq!(id, 1),
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }
    }

    #[test]
    fn short_sell_realizes_inverse_pnl() {
        let mut pos = short();
        let trade = pos
            .sell(95.0, entry_date(), 12, ExitReason::Reversal)
            .unwrap();
        assert!((trade.pnl - 250.0).abs() < 1e-9);
        assert!((trade.proceeds - 5250.0).abs() < 1e-9);
    }

    #[test]
    fn exit_precedence_parse() {
        assert_eq!(ExitPrecedence::parse("trigger"), Some(ExitPrecedence::TriggerFirst));
        assert_eq!(ExitPrecedence::parse("HOLD_TIME"), Some(ExitPrecedence::HoldTimeFirst));
        assert_eq!(ExitPrecedence::parse("random"), None);
    }
}
