//! Configuration validation.
//!
//! Rejects invalid values before any market data is loaded. Missing keys fall
//! back to the same defaults the command builds its run from.

use crate::domain::error::WalkforwardError;
use crate::domain::forecast::ModelKind;
use crate::domain::position::ExitPrecedence;
use crate::domain::price::PriceField;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DEFAULT_START_DATE: &str = "2017-01-05";
pub const DEFAULT_STOP_DATE: &str = "2018-02-05";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    validate_starting_capital(config)?;
    validate_fraction(config, "loss_fraction", 0.30, false)?;
    validate_fraction(config, "share_pct", 1.0, true)?;
    validate_trigger_pct(config)?;
    validate_at_least_one(config, "backtest", "hold_time", 5)?;
    validate_at_least_one(config, "backtest", "return_window", 5)?;
    validate_signal_threshold(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_enum(config, "backtest", "exit_precedence", |s| {
        ExitPrecedence::parse(s).is_some()
    })?;
    validate_enum(config, "backtest", "price_field", |s| {
        PriceField::parse(s).is_some()
    })?;
    Ok(())
}

pub fn validate_model_config(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    validate_enum(config, "model", "kind", |s| ModelKind::parse(s).is_some())?;
    if config.get_int("model", "ma_order", 0) != 0 {
        return Err(WalkforwardError::invalid(
            "model",
            "ma_order",
            "only ma_order = 0 is supported",
        ));
    }
    for key in ["ar_order", "diff_order"] {
        if config.get_int("model", key, 1) < 0 {
            return Err(WalkforwardError::invalid("model", key, format!("{key} must be non-negative")));
        }
    }
    validate_at_least_one(config, "model", "epochs", 10)?;
    validate_at_least_one(config, "model", "width", 4)?;
    validate_at_least_one(config, "model", "lookback", 1)?;
    let rate = config.get_double("model", "learning_rate", 0.05);
    if !(rate > 0.0 && rate.is_finite()) {
        return Err(WalkforwardError::invalid(
            "model",
            "learning_rate",
            "learning_rate must be positive",
        ));
    }
    if config.get_int("model", "seed", 7) < 0 {
        return Err(WalkforwardError::invalid("model", "seed", "seed must be non-negative"));
    }
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim().to_lowercase().as_str() {
        "csv" => {
            config.require_string("data", "path")?;
        }
        "sqlite" => {
            config.require_string("sqlite", "path")?;
            if config.get_int("sqlite", "pool_size", 4) < 1 {
                return Err(WalkforwardError::invalid(
                    "sqlite",
                    "pool_size",
                    "pool_size must be at least 1",
                ));
            }
        }
        other => {
            return Err(WalkforwardError::invalid(
                "data",
                "source",
                format!("unknown source '{other}', expected csv or sqlite"),
            ));
        }
    }
    Ok(())
}

fn validate_starting_capital(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    let value = config.get_double("backtest", "starting_capital", 5000.0);
    if !(value > 0.0 && value.is_finite()) {
        return Err(WalkforwardError::invalid(
            "backtest",
            "starting_capital",
            "starting_capital must be positive",
        ));
    }
    Ok(())
}

/// `0 < value < 1`, or `0 < value <= 1` when `inclusive_one`.
fn validate_fraction(
    config: &dyn ConfigPort,
    key: &str,
    default: f64,
    inclusive_one: bool,
) -> Result<(), WalkforwardError> {
    let value = config.get_double("backtest", key, default);
    let below_one = if inclusive_one { value <= 1.0 } else { value < 1.0 };
    if !(value > 0.0 && below_one) {
        let bound = if inclusive_one { "(0, 1]" } else { "(0, 1)" };
        return Err(WalkforwardError::invalid(
            "backtest",
            key,
            format!("{key} must be in {bound}"),
        ));
    }
    Ok(())
}

fn validate_trigger_pct(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    let value = config.get_double("backtest", "trigger_pct", 0.03);
    if !(value > 0.0 && value.is_finite()) {
        return Err(WalkforwardError::invalid(
            "backtest",
            "trigger_pct",
            "trigger_pct must be positive",
        ));
    }
    Ok(())
}

fn validate_at_least_one(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), WalkforwardError> {
    if config.get_int(section, key, default) < 1 {
        return Err(WalkforwardError::invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(())
}

fn validate_signal_threshold(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    let value = config.get_double("backtest", "signal_threshold", 0.0);
    if !(value >= 0.0 && value.is_finite()) {
        return Err(WalkforwardError::invalid(
            "backtest",
            "signal_threshold",
            "signal_threshold must be non-negative",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(WalkforwardError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), WalkforwardError> {
    let start = config_date(config, "start_date", DEFAULT_START_DATE)?;
    let stop = config_date(config, "stop_date", DEFAULT_STOP_DATE)?;
    if start >= stop {
        return Err(WalkforwardError::invalid(
            "backtest",
            "start_date",
            "start_date must be before stop_date",
        ));
    }
    Ok(())
}

/// Reads an ISO date from `[backtest]`, falling back to `default`.
pub fn config_date(
    config: &dyn ConfigPort,
    key: &str,
    default: &str,
) -> Result<NaiveDate, WalkforwardError> {
    let raw = config
        .get_string("backtest", key)
        .unwrap_or_else(|| default.to_string());
    parse_date(&raw, key)
}

pub fn parse_date(value: &str, key: &str) -> Result<NaiveDate, WalkforwardError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        WalkforwardError::invalid(
            "backtest",
            key,
            format!("invalid {key} format, expected YYYY-MM-DD"),
        )
    })
}

fn validate_enum(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    known: impl Fn(&str) -> bool,
) -> Result<(), WalkforwardError> {
    match config.get_string(section, key) {
        Some(value) if !known(&value) => Err(WalkforwardError::invalid(
            section,
            key,
            format!("unrecognised value '{value}'"),
        )),
        _ => Ok(()),
    }
}
