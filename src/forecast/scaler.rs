use crate::error::TraderError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-column min-max scaler fitted offline
///
/// Same parameterisation as scikit-learn's `MinMaxScaler`:
/// `scaled = x * scale + min`, one (`min`, `scale`) pair per column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub scale: Vec<f64>,
}

impl MinMaxScaler {
    pub fn new(min: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { min, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Fit to the observed range of each column, mapping it onto [0, 1]
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows
            .first()
            .map(|r| r.len())
            .ok_or_else(|| TraderError::Model("cannot fit scaler on empty data".into()))?;

        let mut min = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        for col in 0..width {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r[col]), hi.max(r[col]))
            });
            let range = if hi > lo { hi - lo } else { 1.0 };
            scale.push(1.0 / range);
            min.push(-lo / range);
        }

        Self::new(min, scale)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| TraderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scaler: MinMaxScaler = serde_json::from_str(&raw)?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    fn validate(&self) -> Result<()> {
        if self.min.is_empty() || self.min.len() != self.scale.len() {
            return Err(TraderError::Model(format!(
                "scaler has {} min values and {} scale values",
                self.min.len(),
                self.scale.len()
            )));
        }
        if self.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(TraderError::Model("scaler scale values must be finite and non-zero".into()));
        }
        Ok(())
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.width() {
            return Err(TraderError::Model(format!(
                "expected {} features, got {}",
                self.width(),
                row.len()
            )));
        }

        Ok(row
            .iter()
            .zip(self.min.iter().zip(&self.scale))
            .map(|(x, (min, scale))| x * scale + min)
            .collect())
    }

    /// Undo the scaling of a single-column target value
    pub fn inverse_transform(&self, value: f64) -> Result<f64> {
        if self.width() != 1 {
            return Err(TraderError::Model(format!(
                "target scaler must have one column, has {}",
                self.width()
            )));
        }
        Ok((value - self.min[0]) / self.scale[0])
    }
}
