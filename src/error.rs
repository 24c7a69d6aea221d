use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the trader and its collaborators
#[derive(Debug, Error)]
pub enum TraderError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("insufficient history: got {got} bars, need {needed}")]
    InsufficientHistory { got: usize, needed: usize },

    #[error("broker rejected request ({status}): {message}")]
    Broker { status: u16, message: String },

    #[error("model error: {0}")]
    Model(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraderError {
    /// Network failures, timeouts and 5xx responses; worth another try next cycle
    pub fn is_transient(&self) -> bool {
        match self {
            TraderError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            TraderError::Broker { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
