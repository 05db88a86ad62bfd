//! Report output port trait.

use std::path::Path;

use crate::domain::error::WalkforwardError;
use crate::domain::trade::TradeOutcome;

/// Sink for the per-day asset history of a finished run.
pub trait ReportPort {
    fn write(&self, outcome: &TradeOutcome, output_path: &Path) -> Result<(), WalkforwardError>;
}
