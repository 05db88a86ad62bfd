//! One-step-ahead price forecasters.
//!
//! A model is fitted on a training window, then fed the growing price history
//! one day at a time. [`ForecastModel::predict`] returns the next day's price.

pub mod arima;
pub mod neural;

pub use arima::ArimaModel;
pub use neural::NeuralModel;

use super::error::WalkforwardError;

pub trait ForecastModel {
    fn name(&self) -> String;

    /// Trains on `window`, discarding any previous fit.
    fn fit(&mut self, window: &[f64]) -> Result<(), WalkforwardError>;

    /// Supplies the history up to and including the current day.
    fn observe(&mut self, history: &[f64]) -> Result<(), WalkforwardError>;

    /// Forecast of the price one day after the last observed value.
    fn predict(&self) -> Result<f64, WalkforwardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Arima,
    Neural,
}

impl ModelKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "arima" | "statistical" => Some(ModelKind::Arima),
            "neural" | "lstm" | "sequence" => Some(ModelKind::Neural),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub ar_order: usize,
    pub diff_order: usize,
    pub epochs: usize,
    pub width: usize,
    pub lookback: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            kind: ModelKind::Arima,
            ar_order: 1,
            diff_order: 1,
            epochs: 10,
            width: 4,
            lookback: 1,
            learning_rate: 0.05,
            seed: 7,
        }
    }
}

pub fn build_model(config: &ModelConfig) -> Box<dyn ForecastModel> {
    match config.kind {
        ModelKind::Arima => Box::new(ArimaModel::new(config.ar_order, config.diff_order)),
        ModelKind::Neural => Box::new(NeuralModel::new(
            config.lookback,
            config.width,
            config.epochs,
            config.learning_rate,
            config.seed,
        )),
    }
}
