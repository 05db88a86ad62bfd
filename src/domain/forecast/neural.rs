//! Small feed-forward sequence regressor.
//!
//! One tanh hidden layer maps the last `lookback` min-max scaled prices onto
//! the next scaled price. The network is trained once, by full-batch gradient
//! descent, on the window passed to [`ForecastModel::fit`]; later calls to
//! [`ForecastModel::observe`] only slide the input window forward.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ForecastModel;
use crate::domain::error::WalkforwardError;

#[derive(Debug, Clone, PartialEq)]
pub struct NeuralModel {
    lookback: usize,
    width: usize,
    epochs: usize,
    learning_rate: f64,
    seed: u64,
    trained: Option<Trained>,
    window: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Trained {
    net: Network,
    scaler: MinMax,
    final_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MinMax {
    min: f64,
    range: f64,
}

impl MinMax {
    fn from_data(data: &[f64]) -> Self {
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        MinMax {
            min,
            range: max - min,
        }
    }

    fn scale(&self, v: f64) -> f64 {
        if self.range > 0.0 {
            (v - self.min) / self.range
        } else {
            0.0
        }
    }

    fn unscale(&self, v: f64) -> f64 {
        self.min + v * self.range
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Network {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array1<f64>,
    b2: f64,
}

impl Network {
    fn new(lookback: usize, width: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / lookback as f64).sqrt();
        let w1 = Array2::from_shape_fn((width, lookback), |_| rng.gen_range(-limit..limit));
        let limit = (1.0 / width as f64).sqrt();
        let w2 = Array1::from_shape_fn(width, |_| rng.gen_range(-limit..limit));
        Network {
            w1,
            b1: Array1::zeros(width),
            w2,
            b2: 0.0,
        }
    }

    fn hidden(&self, x: &Array2<f64>) -> Array2<f64> {
        (x.dot(&self.w1.t()) + &self.b1).mapv(f64::tanh)
    }

    fn forward(&self, x: &Array2<f64>) -> Array1<f64> {
        self.hidden(x).dot(&self.w2) + self.b2
    }

    /// One gradient step on mean squared error; returns the pre-step loss.
    fn step(&mut self, x: &Array2<f64>, y: &Array1<f64>, learning_rate: f64) -> f64 {
        let n = y.len() as f64;
        let hidden = self.hidden(x);
        let out = hidden.dot(&self.w2) + self.b2;
        let err = &out - y;
        let loss = err.mapv(|e| e * e).sum() / n;

        let grad_out = err * (2.0 / n);
        let grad_w2 = hidden.t().dot(&grad_out);
        let grad_b2 = grad_out.sum();

        let dh = &grad_out.view().insert_axis(Axis(1)) * &self.w2.view().insert_axis(Axis(0));
        let dh = dh * &hidden.mapv(|h| 1.0 - h * h);
        let grad_w1 = dh.t().dot(x);
        let grad_b1 = dh.sum_axis(Axis(0));

        self.w1.scaled_add(-learning_rate, &grad_w1);
        self.b1.scaled_add(-learning_rate, &grad_b1);
        self.w2.scaled_add(-learning_rate, &grad_w2);
        self.b2 -= learning_rate * grad_b2;

        loss
    }
}

impl NeuralModel {
    pub fn new(lookback: usize, width: usize, epochs: usize, learning_rate: f64, seed: u64) -> Self {
        NeuralModel {
            lookback,
            width,
            epochs,
            learning_rate,
            seed,
            trained: None,
            window: Vec::new(),
        }
    }

    /// Mean squared error (in scaled units) after the last epoch.
    pub fn final_loss(&self) -> Option<f64> {
        self.trained.as_ref().map(|t| t.final_loss)
    }

    fn samples(&self, scaled: &[f64]) -> (Array2<f64>, Array1<f64>) {
        let rows = scaled.len() - self.lookback;
        let x = Array2::from_shape_fn((rows, self.lookback), |(r, c)| scaled[r + c]);
        let y = Array1::from_shape_fn(rows, |r| scaled[r + self.lookback]);
        (x, y)
    }

    fn remember(&mut self, history: &[f64]) -> Result<(), WalkforwardError> {
        if history.len() < self.lookback {
            return Err(WalkforwardError::fit_failure(
                &self.name(),
                format!(
                    "history of {} values is shorter than lookback {}",
                    history.len(),
                    self.lookback
                ),
            ));
        }
        self.window = history[history.len() - self.lookback..].to_vec();
        Ok(())
    }
}

impl ForecastModel for NeuralModel {
    fn name(&self) -> String {
        format!("neural(lookback={}, width={})", self.lookback, self.width)
    }

    fn fit(&mut self, window: &[f64]) -> Result<(), WalkforwardError> {
        let name = self.name();
        if self.lookback == 0 || self.width == 0 {
            return Err(WalkforwardError::fit_failure(&name, "lookback and width must be positive"));
        }
        if window.len() < self.lookback + 1 {
            return Err(WalkforwardError::fit_failure(
                &name,
                format!(
                    "{} observations, need at least {}",
                    window.len(),
                    self.lookback + 1
                ),
            ));
        }
        if window.iter().any(|v| !v.is_finite()) {
            return Err(WalkforwardError::fit_failure(&name, "non-finite input"));
        }

        let scaler = MinMax::from_data(window);
        let scaled: Vec<f64> = window.iter().map(|&v| scaler.scale(v)).collect();
        let (x, y) = self.samples(&scaled);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut net = Network::new(self.lookback, self.width, &mut rng);
        let mut loss = f64::NAN;
        for epoch in 0..self.epochs {
            loss = net.step(&x, &y, self.learning_rate);
            if !loss.is_finite() {
                return Err(WalkforwardError::fit_failure(
                    &name,
                    format!("loss diverged at epoch {epoch}"),
                ));
            }
        }
        tracing::debug!(model = %name, epochs = self.epochs, loss, "trained");

        self.trained = Some(Trained {
            net,
            scaler,
            final_loss: loss,
        });
        self.remember(window)
    }

    fn observe(&mut self, history: &[f64]) -> Result<(), WalkforwardError> {
        self.remember(history)
    }

    fn predict(&self) -> Result<f64, WalkforwardError> {
        let trained = self
            .trained
            .as_ref()
            .ok_or_else(|| WalkforwardError::fit_failure(&self.name(), "predict before fit"))?;

        let input = Array2::from_shape_fn((1, self.lookback), |(_, c)| {
            trained.scaler.scale(self.window[c])
        });
        let out = trained.net.forward(&input)[0];
        let forecast = trained.scaler.unscale(out);
        if !forecast.is_finite() {
            return Err(WalkforwardError::fit_failure(&self.name(), "non-finite forecast"));
        }
        Ok(forecast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|t| 100.0 + t as f64).collect()
    }

    #[test]
    fn training_reduces_loss() {
        let data = ramp(60);
        let mut short = NeuralModel::new(2, 4, 1, 0.1, 7);
        short.fit(&data).unwrap();
        let mut long = NeuralModel::new(2, 4, 300, 0.1, 7);
        long.fit(&data).unwrap();
        assert!(long.final_loss().unwrap() < short.final_loss().unwrap());
    }

    #[test]
    fn same_seed_same_forecast() {
        let data = ramp(30);
        let mut a = NeuralModel::new(1, 4, 10, 0.05, 11);
        let mut b = NeuralModel::new(1, 4, 10, 0.05, 11);
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();
        assert!((a.predict().unwrap() - b.predict().unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn constant_series_forecasts_itself() {
        let data = vec![42.0; 20];
        let mut model = NeuralModel::new(1, 4, 10, 0.05, 7);
        model.fit(&data).unwrap();
        assert!((model.predict().unwrap() - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn window_too_short() {
        let mut model = NeuralModel::new(3, 4, 10, 0.05, 7);
        let err = model.fit(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, WalkforwardError::ModelFitFailure { .. }));
    }

    #[test]
    fn divergent_training_fails() {
        let data = ramp(30);
        let mut model = NeuralModel::new(1, 4, 50, 1e200, 7);
        assert!(model.fit(&data).is_err());
    }

    #[test]
    fn observe_slides_window_without_retraining() {
        let data = ramp(30);
        let mut model = NeuralModel::new(1, 4, 20, 0.05, 7);
        model.fit(&data[..20]).unwrap();
        let loss = model.final_loss();
        let before = model.predict().unwrap();

        model.observe(&data).unwrap();
        assert_eq!(model.final_loss(), loss);
        assert!((model.predict().unwrap() - before).abs() > 0.0);
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = NeuralModel::new(1, 4, 10, 0.05, 7);
        assert!(model.predict().is_err());
    }
}
