use crate::error::TraderError;
use crate::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PAPER_API_BASE: &str = "https://paper-api.alpaca.markets";
pub const LIVE_API_BASE: &str = "https://api.alpaca.markets";
pub const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";

const DEFAULT_CONFIG_FILE: &str = "trader.toml";
const ENV_PREFIX: &str = "TRADER";
const MAX_HISTORY_DAYS: i64 = 3650;

/// Runtime settings for the trading loop
///
/// Layered lowest to highest: built-in defaults, optional TOML file,
/// `TRADER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct TraderConfig {
    pub symbol: String,
    pub share_count: u32,
    pub trigger_margin: f64,
    pub poll_interval_seconds: u64,
    pub demo_mode: bool,
    pub lookback_bars: usize,
    pub history_days: i64,
    pub request_timeout_seconds: u64,
    pub market_data_url: String,
    #[serde(default)]
    pub broker_url: Option<String>,
    pub model_path: PathBuf,
    pub x_scaler_path: PathBuf,
    pub y_scaler_path: PathBuf,
    pub confirm_fills: bool,
    pub confirm_attempts: u32,
    pub confirm_delay_seconds: u64,
    pub reconcile_on_start: bool,
    pub log_filter: String,
}

impl TraderConfig {
    /// Load config, reading `path` if given or `trader.toml` if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = Self::defaults()?
            .add_source(file)
            .add_source(Self::environment());

        Self::from_builder(builder)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX).try_parsing(true)
    }

    pub(crate) fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("symbol", "AAPL")?
            .set_default("share_count", 5_i64)?
            .set_default("trigger_margin", 5.0)?
            .set_default("poll_interval_seconds", 8_i64 * 60 * 60)?
            .set_default("demo_mode", true)?
            .set_default("lookback_bars", 50_i64)?
            .set_default("history_days", 70_i64)?
            .set_default("request_timeout_seconds", 30_i64)?
            .set_default("market_data_url", YAHOO_API_BASE)?
            .set_default("model_path", "./model/lstm.json")?
            .set_default("x_scaler_path", "./scalers/x_scaler.json")?
            .set_default("y_scaler_path", "./scalers/y_scaler.json")?
            .set_default("confirm_fills", false)?
            .set_default("confirm_attempts", 5_i64)?
            .set_default("confirm_delay_seconds", 2_i64)?
            .set_default("reconcile_on_start", false)?
            .set_default("log_filter", "lstm_trader=info")?)
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: TraderConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(TraderError::InvalidConfig("symbol must not be empty".into()));
        }
        if self.share_count == 0 {
            return Err(TraderError::InvalidConfig("share_count must be positive".into()));
        }
        if !self.trigger_margin.is_finite() || self.trigger_margin < 0.0 {
            return Err(TraderError::InvalidConfig(format!(
                "trigger_margin must be a non-negative number, got {}",
                self.trigger_margin
            )));
        }
        if self.poll_interval_seconds == 0 {
            return Err(TraderError::InvalidConfig(
                "poll_interval_seconds must be positive".into(),
            ));
        }
        if self.lookback_bars == 0 {
            return Err(TraderError::InvalidConfig("lookback_bars must be positive".into()));
        }
        if self.history_days < self.lookback_bars as i64 {
            return Err(TraderError::InvalidConfig(format!(
                "history_days ({}) must cover lookback_bars ({})",
                self.history_days, self.lookback_bars
            )));
        }
        if self.history_days > MAX_HISTORY_DAYS {
            return Err(TraderError::InvalidConfig(format!(
                "history_days ({}) must not exceed {}",
                self.history_days, MAX_HISTORY_DAYS
            )));
        }
        if self.request_timeout_seconds == 0 {
            return Err(TraderError::InvalidConfig(
                "request_timeout_seconds must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Broker endpoint: explicit override, else paper or live by `demo_mode`
    pub fn broker_base_url(&self) -> &str {
        match &self.broker_url {
            Some(url) => url,
            None if self.demo_mode => PAPER_API_BASE,
            None => LIVE_API_BASE,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_secs(self.confirm_delay_seconds)
    }
}

/// Broker API credentials, supplied through the environment only
#[derive(Clone)]
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub const KEY_ID_VAR: &'static str = "ALPACA_KEY";
    pub const SECRET_KEY_VAR: &'static str = "SECRET_KEY";

    pub fn from_env() -> Result<Self> {
        let key_id = std::env::var(Self::KEY_ID_VAR)
            .map_err(|_| TraderError::MissingCredential(Self::KEY_ID_VAR))?;
        let secret_key = std::env::var(Self::SECRET_KEY_VAR)
            .map_err(|_| TraderError::MissingCredential(Self::SECRET_KEY_VAR))?;
        Ok(Self { key_id, secret_key })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
