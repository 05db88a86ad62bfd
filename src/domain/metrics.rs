//! Run result and performance statistics.

use std::fmt;

use super::ledger::Ledger;
use super::position::ClosedTrade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Headline figures of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Trigger percentage the run used.
    pub p: f64,
    pub share_pct: f64,
    /// Maximum drawdown as a fraction in `[0, 1]`.
    pub mdd: f64,
    /// Strategy return in whole percent.
    pub return_pct: f64,
    /// Buy-and-hold return in percent, one decimal.
    pub possible_pct: f64,
}

impl RunResult {
    pub fn new(
        p: f64,
        share_pct: f64,
        starting_capital: f64,
        total_assets: &[f64],
        prices: &[f64],
    ) -> Self {
        let return_pct = match total_assets.last() {
            Some(last) if starting_capital > 0.0 => {
                ((last - starting_capital) / starting_capital * 100.0).round()
            }
            _ => 0.0,
        };
        RunResult {
            p,
            share_pct,
            mdd: max_drawdown(total_assets),
            return_pct,
            possible_pct: buy_and_hold_pct(prices),
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p={} sharePer={} MDD={:.4} return={}% possible={:.1}%",
            self.p, self.share_pct, self.mdd, self.return_pct, self.possible_pct
        )
    }
}

/// `max over t of (peak_so_far - value_t) / peak_so_far`, clamped to `[0, 1]`.
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown(values).0
}

/// Percent change from first to last price, rounded to one decimal.
pub fn buy_and_hold_pct(prices: &[f64]) -> f64 {
    match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => {
            ((last - first) / first * 1000.0).round() / 10.0
        }
        _ => 0.0,
    }
}

/// Max drawdown and the longest run of days spent below a prior peak.
fn drawdown(values: &[f64]) -> (f64, usize) {
    let Some(&first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut underwater = 0usize;
    let mut longest = 0usize;

    for &v in values {
        if v >= peak {
            peak = v;
            underwater = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - v) / peak);
            underwater += 1;
            longest = longest.max(underwater);
        }
    }

    (max_dd.clamp(0.0, 1.0), longest)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeStats {
    pub won: usize,
    pub lost: usize,
    pub breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Mean holding period in trading days.
    pub avg_holding_days: f64,
}

impl TradeStats {
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats::default();
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut holding_days = 0usize;

        for trade in trades {
            if trade.pnl > 0.0 {
                stats.won += 1;
                total_wins += trade.pnl;
                stats.largest_win = stats.largest_win.max(trade.pnl);
            } else if trade.pnl < 0.0 {
                stats.lost += 1;
                total_losses += trade.pnl.abs();
                stats.largest_loss = stats.largest_loss.max(trade.pnl.abs());
            } else {
                stats.breakeven += 1;
            }
            holding_days += trade.holding_days;
        }

        let count = trades.len();
        if count > 0 {
            stats.win_rate = stats.won as f64 / count as f64;
            stats.avg_holding_days = holding_days as f64 / count as f64;
        }
        stats.profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        if stats.won > 0 {
            stats.avg_win = total_wins / stats.won as f64;
        }
        if stats.lost > 0 {
            stats.avg_loss = total_losses / stats.lost as f64;
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.won + self.lost + self.breakeven
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest stretch, in trading days, below a previous peak.
    pub max_drawdown_duration: usize,
    pub trades: TradeStats,
}

impl Metrics {
    pub fn compute(ledger: &Ledger, risk_free_rate: f64) -> Self {
        let totals = ledger.total_asset_history();
        let initial = ledger.starting_capital();
        let final_total = totals.last().copied().unwrap_or(initial);

        let total_return = if initial > 0.0 {
            (final_total - initial) / initial
        } else {
            0.0
        };

        let years = totals.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = drawdown(&totals);
        let (sharpe_ratio, sortino_ratio) =
            risk_adjusted(&totals, risk_free_rate / TRADING_DAYS_PER_YEAR);

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            trades: TradeStats::from_trades(ledger.closed_trades()),
        }
    }
}

fn risk_adjusted(values: &[f64], daily_rf: f64) -> (f64, f64) {
    let returns: Vec<f64> = values
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let excess = mean - daily_rf;
    let annualize = TRADING_DAYS_PER_YEAR.sqrt();

    let sharpe = if stddev > 0.0 {
        excess / stddev * annualize
    } else {
        0.0
    };

    let downside = (returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    let sortino = if downside > 0.0 {
        excess / downside * annualize
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{Direction, ExitReason};
    use chrono::NaiveDate;

    fn trade(pnl: f64, holding_days: usize) -> ClosedTrade {
        let date = NaiveDate::from_ymd_opt(2017, 1, 5).unwrap();
        ClosedTrade {
            id: 1,
            ticker: "aapl".into(),
            direction: Direction::Long,
            shares: 10,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 10.0,
            entry_date: date,
            exit_date: date,
            holding_days,
            proceeds: 1000.0 + pnl,
            pnl,
            reason: ExitReason::HoldTime,
        }
    }

    #[test]
    fn drawdown_from_running_peak() {
        let dd = max_drawdown(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        assert!((dd - 30.0 / 110.0).abs() < 1e-12);
    }

    #[test]
    fn drawdown_of_monotone_rise_is_zero() {
        assert!(max_drawdown(&[1.0, 2.0, 3.0]).abs() < f64::EPSILON);
        assert!(max_drawdown(&[]).abs() < f64::EPSILON);
        assert!(max_drawdown(&[5000.0; 4]).abs() < f64::EPSILON);
    }

    #[test]
    fn drawdown_is_clamped() {
        let dd = max_drawdown(&[100.0, -50.0]);
        assert!((dd - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn drawdown_duration_counts_days_underwater() {
        let (_, duration) = drawdown(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]);
        assert_eq!(duration, 4);
    }

    #[test]
    fn buy_and_hold_one_decimal() {
        assert!((buy_and_hold_pct(&[100.0, 90.0, 112.34]) - 12.3).abs() < 1e-9);
        assert!(buy_and_hold_pct(&[50.0; 3]).abs() < f64::EPSILON);
        assert!(buy_and_hold_pct(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn run_result_rounds_return() {
        let result = RunResult::new(0.03, 1.0, 5000.0, &[5000.0, 5100.0, 5224.0], &[10.0, 11.0]);
        assert!((result.return_pct - 4.0).abs() < f64::EPSILON);
        assert!((result.possible_pct - 10.0).abs() < 1e-9);
        assert!(result.mdd.abs() < f64::EPSILON);
    }

    #[test]
    fn run_result_empty_history() {
        let result = RunResult::new(0.03, 1.0, 5000.0, &[], &[]);
        assert!(result.return_pct.abs() < f64::EPSILON);
        assert!(result.possible_pct.abs() < f64::EPSILON);
    }

    #[test]
    fn run_result_display() {
        let result = RunResult {
            p: 0.03,
            share_pct: 1.0,
            mdd: 0.125,
            return_pct: -4.0,
            possible_pct: 8.5,
        };
        assert_eq!(
            result.to_string(),
            "p=0.03 sharePer=1 MDD=0.1250 return=-4% possible=8.5%"
        );
    }

    #[test]
    fn trade_stats_counts_and_averages() {
        let stats = TradeStats::from_trades(&[
            trade(100.0, 5),
            trade(-60.0, 3),
            trade(200.0, 4),
            trade(-40.0, 2),
            trade(0.0, 1),
        ]);
        assert_eq!((stats.won, stats.lost, stats.breakeven), (2, 2, 1));
        assert_eq!(stats.total(), 5);
        assert!((stats.win_rate - 0.4).abs() < 1e-12);
        assert!((stats.profit_factor - 3.0).abs() < 1e-12);
        assert!((stats.avg_win - 150.0).abs() < 1e-12);
        assert!((stats.avg_loss - 50.0).abs() < 1e-12);
        assert!((stats.largest_win - 200.0).abs() < 1e-12);
        assert!((stats.largest_loss - 60.0).abs() < 1e-12);
        assert!((stats.avg_holding_days - 3.0).abs() < 1e-12);
    }

    #[test]
    fn trade_stats_only_wins() {
        let stats = TradeStats::from_trades(&[trade(10.0, 1)]);
        assert!(stats.profit_factor.is_infinite());
    }

    #[test]
    fn metrics_from_ledger() {
        let ledger = Ledger::new("aapl", 5000.0, 0.0);
        let metrics = Metrics::compute(&ledger, 0.0);
        assert!(metrics.total_return.abs() < f64::EPSILON);
        assert_eq!(metrics.trades.total(), 0);
        assert!(metrics.sharpe_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let values: Vec<f64> = (0..50).map(|i| 100.0 * (1.0 + 0.001 * i as f64)).collect();
        let (sharpe, sortino) = risk_adjusted(&values, 0.0);
        assert!(sharpe > 0.0);
        assert!(sortino.abs() < f64::EPSILON);
    }
}
