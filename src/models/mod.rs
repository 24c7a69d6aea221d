use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One day of aggregated price data for the instrument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Feature row fed to the forecaster: (high, low, close)
    pub fn features(&self) -> [f64; 3] {
        [self.high, self.low, self.close]
    }
}

/// Direction of an open holding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// Tracked position in the single traded instrument
///
/// `Flat` carries no side, so "no position" and "no side" can never disagree.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionState {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionState {
    pub fn has_position(&self) -> bool {
        !matches!(self, PositionState::Flat)
    }

    pub fn side(&self) -> Option<PositionSide> {
        match self {
            PositionState::Flat => None,
            PositionState::Long => Some(PositionSide::Long),
            PositionState::Short => Some(PositionSide::Short),
        }
    }

    pub fn from_side(side: Option<PositionSide>) -> Self {
        match side {
            None => PositionState::Flat,
            Some(PositionSide::Long) => PositionState::Long,
            Some(PositionSide::Short) => PositionState::Short,
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => write!(f, "FLAT"),
            PositionState::Long => write!(f, "LONG"),
            PositionState::Short => write!(f, "SHORT"),
        }
    }
}

/// Forecast direction relative to the current price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// A holding as reported by the broker's position listing
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: f64,
    pub side: PositionSide,
}

/// Broker acknowledgement of a submitted order or close request
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub id: String,
    pub client_order_id: Option<String>,
    pub status: String,
}
