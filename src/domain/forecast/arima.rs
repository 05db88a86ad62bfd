//! ARIMA(p, d, 0) estimated by ordinary least squares on the differenced series.

use nalgebra::{DMatrix, DVector};

use super::ForecastModel;
use crate::domain::error::WalkforwardError;

/// Singular values below this are treated as zero by the least-squares solve.
const SVD_EPS: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct ArimaModel {
    ar_order: usize,
    diff_order: usize,
    fitted: Option<ArimaFit>,
}

#[derive(Debug, Clone, PartialEq)]
struct ArimaFit {
    constant: f64,
    ar_coeffs: Vec<f64>,
    forecast: f64,
}

impl ArimaModel {
    pub fn new(ar_order: usize, diff_order: usize) -> Self {
        ArimaModel {
            ar_order,
            diff_order,
            fitted: None,
        }
    }

    /// Fewest observations a fit accepts.
    pub fn min_observations(&self) -> usize {
        self.ar_order + self.diff_order + 3
    }

    pub fn constant(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.constant)
    }

    pub fn ar_coeffs(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.ar_coeffs.as_slice())
    }

    fn estimate(&self, data: &[f64]) -> Result<ArimaFit, WalkforwardError> {
        let name = self.name();
        if data.len() < self.min_observations() {
            return Err(WalkforwardError::fit_failure(
                &name,
                format!(
                    "{} observations, need at least {}",
                    data.len(),
                    self.min_observations()
                ),
            ));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(WalkforwardError::fit_failure(&name, "non-finite input"));
        }

        // Last value at every differencing level, for integrating the forecast.
        let mut levels = Vec::with_capacity(self.diff_order);
        let mut series = data.to_vec();
        for _ in 0..self.diff_order {
            levels.push(series[series.len() - 1]);
            series = difference(&series);
        }

        let (constant, ar_coeffs) = estimate_ar(&series, self.ar_order)
            .ok_or_else(|| WalkforwardError::fit_failure(&name, "least-squares solve failed"))?;
        if !constant.is_finite() || ar_coeffs.iter().any(|c| !c.is_finite()) {
            return Err(WalkforwardError::fit_failure(&name, "non-finite coefficients"));
        }

        let n = series.len();
        let mut next = constant;
        for (lag, coeff) in ar_coeffs.iter().enumerate() {
            next += coeff * series[n - 1 - lag];
        }
        for level in levels.iter().rev() {
            next += level;
        }

        if !next.is_finite() {
            return Err(WalkforwardError::fit_failure(&name, "non-finite forecast"));
        }

        Ok(ArimaFit {
            constant,
            ar_coeffs,
            forecast: next,
        })
    }
}

impl ForecastModel for ArimaModel {
    fn name(&self) -> String {
        format!("ARIMA({},{},0)", self.ar_order, self.diff_order)
    }

    fn fit(&mut self, window: &[f64]) -> Result<(), WalkforwardError> {
        self.fitted = Some(self.estimate(window)?);
        Ok(())
    }

    /// Refits on the full history so each forecast uses every past price.
    fn observe(&mut self, history: &[f64]) -> Result<(), WalkforwardError> {
        self.fit(history)
    }

    fn predict(&self) -> Result<f64, WalkforwardError> {
        self.fitted
            .as_ref()
            .map(|f| f.forecast)
            .ok_or_else(|| WalkforwardError::fit_failure(&self.name(), "predict before fit"))
    }
}

fn difference(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

/// OLS fit of `y_t = c + sum(phi_i * y_{t-i})`. Uses the minimum-norm solution
/// when regressors are collinear, which reduces a constant series to its drift.
fn estimate_ar(series: &[f64], p: usize) -> Option<(f64, Vec<f64>)> {
    let n = series.len();
    if n <= p {
        return None;
    }
    if p == 0 {
        let mean = series.iter().sum::<f64>() / n as f64;
        return Some((mean, Vec::new()));
    }

    let rows = n - p;
    let mut x = DMatrix::zeros(rows, p + 1);
    let mut y = DVector::zeros(rows);
    for row in 0..rows {
        let t = row + p;
        x[(row, 0)] = 1.0;
        for lag in 1..=p {
            x[(row, lag)] = series[t - lag];
        }
        y[row] = series[t];
    }

    let beta = x.svd(true, true).solve(&y, SVD_EPS).ok()?;
    Some((beta[0], beta.iter().skip(1).copied().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_trend_extends_by_slope() {
        let data: Vec<f64> = (0..30).map(|t| 100.0 + 2.0 * t as f64).collect();
        let mut model = ArimaModel::new(1, 1);
        model.fit(&data).unwrap();
        assert_relative_eq!(model.predict().unwrap(), 160.0, epsilon = 1e-6);
    }

    #[test]
    fn constant_series_forecasts_itself() {
        let data = vec![50.0; 20];
        let mut model = ArimaModel::new(1, 1);
        model.fit(&data).unwrap();
        assert_relative_eq!(model.predict().unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn recovers_ar_coefficient() {
        // y_t = 0.5 * y_{t-1} + 1 settles towards 2; the recursion is exact.
        let mut data = vec![10.0];
        for _ in 0..40 {
            let last = data[data.len() - 1];
            data.push(0.5 * last + 1.0);
        }
        let mut model = ArimaModel::new(1, 0);
        model.fit(&data).unwrap();
        let coeffs = model.ar_coeffs().unwrap();
        assert_relative_eq!(coeffs[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(model.constant().unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn too_few_observations() {
        let mut model = ArimaModel::new(1, 1);
        let err = model.fit(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, WalkforwardError::ModelFitFailure { .. }));
    }

    #[test]
    fn non_finite_input_fails() {
        let mut model = ArimaModel::new(1, 1);
        let data = vec![1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0];
        assert!(model.fit(&data).is_err());
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = ArimaModel::new(1, 1);
        assert!(model.predict().is_err());
    }

    #[test]
    fn observe_refits_on_growing_history() {
        let mut model = ArimaModel::new(1, 1);
        let data: Vec<f64> = (0..20).map(|t| 10.0 + t as f64).collect();
        model.fit(&data[..10]).unwrap();
        assert_relative_eq!(model.predict().unwrap(), 20.0, epsilon = 1e-6);

        model.observe(&data).unwrap();
        assert_relative_eq!(model.predict().unwrap(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn pure_differencing_is_random_walk_with_drift() {
        let data = vec![10.0, 11.0, 13.0, 14.0, 16.0];
        let mut model = ArimaModel::new(0, 1);
        model.fit(&data).unwrap();
        // mean of diffs 1.5
        assert_relative_eq!(model.predict().unwrap(), 17.5, epsilon = 1e-9);
    }
}
