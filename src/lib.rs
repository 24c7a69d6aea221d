// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod forecast;
pub mod models;
pub mod trader;

// Re-export commonly used types
pub use api::{Broker, MarketData};
pub use error::TraderError;
pub use forecast::Forecaster;
pub use models::*;
pub use trader::{CycleReport, Trader};

// Error handling
pub type Result<T> = std::result::Result<T, TraderError>;
