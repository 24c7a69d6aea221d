// Next-day price forecasting
pub mod lstm;
pub mod scaler;

pub use lstm::{Activation, DenseLayer, LstmLayer, LstmModel};
pub use scaler::MinMaxScaler;

use crate::error::TraderError;
use crate::models::Bar;
use crate::Result;
use ndarray::Array2;
use std::path::Path;

/// Turns a window of recent daily bars into a predicted next close
pub trait Forecaster: Send + Sync {
    /// Predict the next close from bars ordered oldest first
    fn predict(&self, bars: &[Bar]) -> Result<f64>;

    fn name(&self) -> &str;
}

/// LSTM forecaster with its fitted feature and target scalers
#[derive(Debug, Clone)]
pub struct LstmForecaster {
    model: LstmModel,
    x_scaler: MinMaxScaler,
    y_scaler: MinMaxScaler,
}

impl LstmForecaster {
    pub fn new(model: LstmModel, x_scaler: MinMaxScaler, y_scaler: MinMaxScaler) -> Result<Self> {
        if x_scaler.width() != model.input_size() {
            return Err(TraderError::Model(format!(
                "feature scaler has {} columns but model takes {} features",
                x_scaler.width(),
                model.input_size()
            )));
        }
        if y_scaler.width() != 1 {
            return Err(TraderError::Model(format!(
                "target scaler must have one column, has {}",
                y_scaler.width()
            )));
        }

        Ok(Self {
            model,
            x_scaler,
            y_scaler,
        })
    }

    /// Load the model and both scalers from disk
    pub fn load(model_path: &Path, x_scaler_path: &Path, y_scaler_path: &Path) -> Result<Self> {
        let model = LstmModel::load(model_path)?;
        let x_scaler = MinMaxScaler::load(x_scaler_path)?;
        let y_scaler = MinMaxScaler::load(y_scaler_path)?;

        tracing::info!(
            model = %model_path.display(),
            features = model.input_size(),
            "Loaded forecasting model"
        );

        Self::new(model, x_scaler, y_scaler)
    }
}

impl Forecaster for LstmForecaster {
    fn predict(&self, bars: &[Bar]) -> Result<f64> {
        if bars.is_empty() {
            return Err(TraderError::Model("no bars to forecast from".into()));
        }

        let width = self.x_scaler.width();
        let mut flat = Vec::with_capacity(bars.len() * width);
        for bar in bars {
            flat.extend(self.x_scaler.transform(&bar.features())?);
        }
        let sequence = Array2::from_shape_vec((bars.len(), width), flat)
            .map_err(|e| TraderError::Model(e.to_string()))?;

        let scaled = self.model.predict(&sequence)?;
        let price = self.y_scaler.inverse_transform(scaled)?;

        if !price.is_finite() {
            return Err(TraderError::Model(format!("non-finite prediction {}", price)));
        }
        Ok(price)
    }

    fn name(&self) -> &str {
        "lstm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ndarray::{array, Array1};

    fn bars(n: usize, high: f64, low: f64, close: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high,
                low,
                close,
                volume: 1_000.0,
            })
            .collect()
    }

    /// Model whose output ignores the inputs and always equals `scaled_output`
    fn constant_forecaster(scaled_output: f64) -> LstmForecaster {
        let lstm = LstmLayer::new(Array2::zeros((3, 4)), Array2::zeros((1, 4)), Array1::zeros(4)).unwrap();
        let dense = DenseLayer::new(array![[0.0]], array![scaled_output], Activation::Linear).unwrap();
        let model = LstmModel::new(vec![lstm], vec![dense]).unwrap();

        let x_scaler = MinMaxScaler::fit(&[vec![90.0, 90.0, 90.0], vec![110.0, 110.0, 110.0]]).unwrap();
        let y_scaler = MinMaxScaler::fit(&[vec![80.0], vec![120.0]]).unwrap();

        LstmForecaster::new(model, x_scaler, y_scaler).unwrap()
    }

    #[test]
    fn test_predict_denormalizes_output() {
        // 0.65 on a [80, 120] target range is 106
        let forecaster = constant_forecaster(0.65);
        let price = forecaster.predict(&bars(50, 101.0, 99.0, 100.0)).unwrap();

        assert!((price - 106.0).abs() < 1e-9);
    }

    #[test]
    fn test_predict_rejects_empty_window() {
        let forecaster = constant_forecaster(0.5);
        assert!(forecaster.predict(&[]).is_err());
    }

    #[test]
    fn test_scaler_width_must_match_model() {
        let lstm = LstmLayer::new(Array2::zeros((2, 4)), Array2::zeros((1, 4)), Array1::zeros(4)).unwrap();
        let model = LstmModel::new(vec![lstm], vec![]).unwrap();
        let x_scaler = MinMaxScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap();
        let y_scaler = MinMaxScaler::new(vec![0.0], vec![1.0]).unwrap();

        assert!(LstmForecaster::new(model, x_scaler, y_scaler).is_err());
    }

    #[test]
    fn test_load_reports_missing_artifacts() {
        let result = LstmForecaster::load(
            Path::new("/nonexistent/model.json"),
            Path::new("/nonexistent/x.json"),
            Path::new("/nonexistent/y.json"),
        );
        assert!(matches!(result, Err(TraderError::Io { .. })));
    }
}
