//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for walkforward.
#[derive(Debug, thiserror::Error)]
pub enum WalkforwardError {
    #[error("calendar exhausted: cannot advance past day {day} (bound {bound})")]
    CalendarExhausted { day: usize, bound: usize },

    #[error("date {date} not found in trading calendar")]
    DateNotFound { date: NaiveDate },

    #[error("no price for {ticker} on {date}")]
    PriceNotFound { ticker: String, date: NaiveDate },

    #[error("insufficient history: window of {window} days requested at day {day}")]
    InsufficientHistory { window: usize, day: usize },

    #[error("insufficient capital: position costs {required:.2}, {available:.2} available")]
    InsufficientCapital { required: f64, available: f64 },

    #[error("invalid state transition: position {id} is already closed")]
    InvalidStateTransition { id: u64 },

    #[error("{model} model failed to fit: {reason}")]
    ModelFitFailure { model: String, reason: String },

    #[error("invalid calendar: {reason}")]
    InvalidCalendar { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WalkforwardError {
    pub(crate) fn fit_failure(model: &str, reason: impl Into<String>) -> Self {
        WalkforwardError::ModelFitFailure {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        WalkforwardError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error family.
    pub fn exit_status(&self) -> u8 {
        match self {
            WalkforwardError::Io(_) => 1,
            WalkforwardError::ConfigParse { .. }
            | WalkforwardError::ConfigMissing { .. }
            | WalkforwardError::ConfigInvalid { .. } => 2,
            WalkforwardError::Database { .. } | WalkforwardError::DatabaseQuery { .. } => 3,
            WalkforwardError::DateNotFound { .. }
            | WalkforwardError::PriceNotFound { .. }
            | WalkforwardError::InsufficientHistory { .. }
            | WalkforwardError::InvalidCalendar { .. } => 4,
            WalkforwardError::ModelFitFailure { .. } => 5,
            WalkforwardError::CalendarExhausted { .. }
            | WalkforwardError::InvalidStateTransition { .. }
            | WalkforwardError::InsufficientCapital { .. } => 6,
        }
    }
}

impl From<&WalkforwardError> for std::process::ExitCode {
    fn from(err: &WalkforwardError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = WalkforwardError::PriceNotFound {
            ticker: "aapl".into(),
            date: NaiveDate::from_ymd_opt(2017, 1, 5).unwrap(),
        };
        assert_eq!(err.to_string(), "no price for aapl on 2017-01-05");

        let err = WalkforwardError::fit_failure("ARIMA(1,1,0)", "singular design matrix");
        assert_eq!(
            err.to_string(),
            "ARIMA(1,1,0) model failed to fit: singular design matrix"
        );
    }

    #[test]
    fn exit_codes_group_by_family() {
        let config = WalkforwardError::invalid("backtest", "share_pct", "must be in (0, 1]");
        assert_eq!(config.exit_status(), 2);

        let coverage = WalkforwardError::DateNotFound {
            date: NaiveDate::from_ymd_opt(2018, 2, 5).unwrap(),
        };
        assert_eq!(coverage.exit_status(), 4);

        let fit = WalkforwardError::fit_failure("neural", "loss diverged");
        assert_eq!(fit.exit_status(), 5);

        let breach = WalkforwardError::InvalidStateTransition { id: 3 };
        assert_eq!(breach.exit_status(), 6);

        let io = WalkforwardError::from(std::io::Error::other("disk full"));
        assert_eq!(io.exit_status(), 1);
    }
}
