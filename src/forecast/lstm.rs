//! Inference-only LSTM network loaded from exported Keras weights
//!
//! Weight layout follows Keras: `kernel` is `[input, 4 * units]`,
//! `recurrent_kernel` is `[units, 4 * units]`, `bias` is `[4 * units]`,
//! with gates packed as input, forget, cell candidate, output.

use crate::error::TraderError;
use crate::Result;
use ndarray::{s, Array1, Array2, ArrayView1};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ============== File Format ==============

#[derive(Debug, Deserialize)]
struct ModelFile {
    lstm: Vec<LstmLayerFile>,
    #[serde(default)]
    dense: Vec<DenseLayerFile>,
}

#[derive(Debug, Deserialize)]
struct LstmLayerFile {
    kernel: Vec<Vec<f64>>,
    recurrent_kernel: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct DenseLayerFile {
    kernel: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default)]
    activation: Activation,
}

fn to_matrix(name: &str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    if nrows == 0 || ncols == 0 {
        return Err(TraderError::Model(format!("{} is empty", name)));
    }
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(TraderError::Model(format!("{} has ragged rows", name)));
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| TraderError::Model(format!("{}: {}", name, e)))
}

// ============== Layers ==============

#[derive(Debug, Clone)]
pub struct LstmLayer {
    kernel: Array2<f64>,
    recurrent_kernel: Array2<f64>,
    bias: Array1<f64>,
    units: usize,
}

impl LstmLayer {
    pub fn new(kernel: Array2<f64>, recurrent_kernel: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        let units = recurrent_kernel.nrows();
        if units == 0 {
            return Err(TraderError::Model("LSTM layer has zero units".into()));
        }
        if kernel.ncols() != 4 * units
            || recurrent_kernel.ncols() != 4 * units
            || bias.len() != 4 * units
        {
            return Err(TraderError::Model(format!(
                "LSTM layer with {} units expects 4*units = {} gate columns, got kernel {:?}, recurrent {:?}, bias {}",
                units,
                4 * units,
                kernel.dim(),
                recurrent_kernel.dim(),
                bias.len()
            )));
        }

        Ok(Self {
            kernel,
            recurrent_kernel,
            bias,
            units,
        })
    }

    pub fn input_size(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// One time step; returns (h_next, c_next)
    fn step(&self, x: ArrayView1<f64>, h: &Array1<f64>, c: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
        let u = self.units;
        let z = x.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;

        let i = z.slice(s![0..u]).mapv(sigmoid);
        let f = z.slice(s![u..2 * u]).mapv(sigmoid);
        let g = z.slice(s![2 * u..3 * u]).mapv(f64::tanh);
        let o = z.slice(s![3 * u..4 * u]).mapv(sigmoid);

        let c_next = &f * c + &i * &g;
        let h_next = &o * &c_next.mapv(f64::tanh);

        (h_next, c_next)
    }

    /// Run the whole sequence, returning every hidden state `[seq_len, units]`
    fn forward(&self, sequence: &Array2<f64>) -> Array2<f64> {
        let mut h = Array1::zeros(self.units);
        let mut c = Array1::zeros(self.units);
        let mut outputs = Array2::zeros((sequence.nrows(), self.units));

        for (t, x) in sequence.rows().into_iter().enumerate() {
            let (h_next, c_next) = self.step(x, &h, &c);
            outputs.row_mut(t).assign(&h_next);
            h = h_next;
            c = c_next;
        }

        outputs
    }
}

#[derive(Debug, Clone)]
pub struct DenseLayer {
    kernel: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl DenseLayer {
    pub fn new(kernel: Array2<f64>, bias: Array1<f64>, activation: Activation) -> Result<Self> {
        if kernel.ncols() != bias.len() {
            return Err(TraderError::Model(format!(
                "dense kernel has {} outputs but bias has {}",
                kernel.ncols(),
                bias.len()
            )));
        }
        Ok(Self {
            kernel,
            bias,
            activation,
        })
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        let activation = self.activation;
        (x.dot(&self.kernel) + &self.bias).mapv(|v| activation.apply(v))
    }
}

// ============== Model ==============

/// Stacked LSTM followed by a dense head producing one scaled price
#[derive(Debug, Clone)]
pub struct LstmModel {
    lstm: Vec<LstmLayer>,
    dense: Vec<DenseLayer>,
}

impl LstmModel {
    pub fn new(lstm: Vec<LstmLayer>, dense: Vec<DenseLayer>) -> Result<Self> {
        let Some(first) = lstm.first() else {
            return Err(TraderError::Model("model needs at least one LSTM layer".into()));
        };

        let mut width = first.units();
        for (idx, layer) in lstm.iter().enumerate().skip(1) {
            if layer.input_size() != width {
                return Err(TraderError::Model(format!(
                    "LSTM layer {} expects {} inputs, previous layer has {} units",
                    idx,
                    layer.input_size(),
                    width
                )));
            }
            width = layer.units();
        }
        for (idx, layer) in dense.iter().enumerate() {
            if layer.kernel.nrows() != width {
                return Err(TraderError::Model(format!(
                    "dense layer {} expects {} inputs, got {}",
                    idx,
                    layer.kernel.nrows(),
                    width
                )));
            }
            width = layer.kernel.ncols();
        }
        if width != 1 {
            return Err(TraderError::Model(format!(
                "model must produce a single output, produces {}",
                width
            )));
        }

        Ok(Self { lstm, dense })
    }

    /// Load weights exported as `{"lstm": [...], "dense": [...]}`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| TraderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ModelFile = serde_json::from_str(&raw)?;

        let lstm = file
            .lstm
            .into_iter()
            .enumerate()
            .map(|(idx, l)| {
                LstmLayer::new(
                    to_matrix(&format!("lstm[{}].kernel", idx), l.kernel)?,
                    to_matrix(&format!("lstm[{}].recurrent_kernel", idx), l.recurrent_kernel)?,
                    Array1::from(l.bias),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let dense = file
            .dense
            .into_iter()
            .enumerate()
            .map(|(idx, d)| {
                DenseLayer::new(
                    to_matrix(&format!("dense[{}].kernel", idx), d.kernel)?,
                    Array1::from(d.bias),
                    d.activation,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(lstm, dense)
    }

    pub fn input_size(&self) -> usize {
        self.lstm[0].input_size()
    }

    /// Predict from a `[seq_len, features]` window of scaled inputs
    pub fn predict(&self, sequence: &Array2<f64>) -> Result<f64> {
        if sequence.nrows() == 0 {
            return Err(TraderError::Model("empty input sequence".into()));
        }
        if sequence.ncols() != self.input_size() {
            return Err(TraderError::Model(format!(
                "model expects {} features per step, got {}",
                self.input_size(),
                sequence.ncols()
            )));
        }

        let mut hidden = sequence.clone();
        for layer in &self.lstm {
            hidden = layer.forward(&hidden);
        }

        // Only the last step of the top layer feeds the head
        let mut out = hidden.row(hidden.nrows() - 1).to_owned();
        for layer in &self.dense {
            out = layer.forward(&out);
        }

        Ok(out[0])
    }
}
