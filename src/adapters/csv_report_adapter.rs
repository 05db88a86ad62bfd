//! CSV report adapter: one row per simulated day.

use crate::domain::error::WalkforwardError;
use crate::domain::trade::TradeOutcome;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ReportRow {
    date: String,
    total_assets: f64,
    liquid_capital: f64,
    invested: f64,
    buy_and_hold: f64,
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    fn csv_err(e: csv::Error) -> WalkforwardError {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => WalkforwardError::Io(io),
            other => WalkforwardError::Io(std::io::Error::other(format!("{other:?}"))),
        }
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, outcome: &TradeOutcome, output_path: &Path) -> Result<(), WalkforwardError> {
        let mut writer = csv::Writer::from_path(output_path).map_err(Self::csv_err)?;

        for (i, point) in outcome.ledger.history().iter().enumerate() {
            writer
                .serialize(ReportRow {
                    date: point.date.format("%Y-%m-%d").to_string(),
                    total_assets: point.total_assets,
                    liquid_capital: point.liquid_capital,
                    invested: point.invested,
                    buy_and_hold: outcome.buy_and_hold.get(i).copied().unwrap_or_default(),
                })
                .map_err(Self::csv_err)?;
        }

        writer.flush()?;
        tracing::info!(path = %output_path.display(), rows = outcome.ledger.history().len(), "report written");
        Ok(())
    }
}
