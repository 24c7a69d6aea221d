pub mod alpaca;
pub mod yahoo;

pub use alpaca::AlpacaClient;
pub use yahoo::YahooClient;

use crate::models::{Bar, BrokerPosition, OrderAck, OrderSide};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Historical daily price source
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Daily bars for `symbol` from `start` (inclusive) to `end` (exclusive), oldest first
    async fn daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>>;
}

/// Remote brokerage account
#[async_trait]
pub trait Broker: Send + Sync {
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>>;

    /// Submit a market order for `qty` shares
    async fn open_position(&self, symbol: &str, qty: u32, side: OrderSide) -> Result<OrderAck>;

    /// Liquidate the whole position in `symbol`
    async fn close_position(&self, symbol: &str) -> Result<OrderAck>;
}
