use crate::api::{Broker, MarketData};
use crate::config::TraderConfig;
use crate::error::TraderError;
use crate::execution::{decide, evaluate_signal, Executor, TradeAction};
use crate::forecast::Forecaster;
use crate::models::{PositionState, Signal};
use crate::Result;
use chrono::{Duration, NaiveDate, Utc};

/// What one decision cycle saw and did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub current_price: f64,
    pub predicted_price: f64,
    pub signal: Signal,
    pub action: TradeAction,
    pub state: PositionState,
}

/// One instrument, one forecaster, one broker account
pub struct Trader<M: MarketData, F: Forecaster, B: Broker> {
    config: TraderConfig,
    market_data: M,
    forecaster: F,
    executor: Executor<B>,
}

impl<M: MarketData, F: Forecaster, B: Broker> Trader<M, F, B> {
    pub fn new(config: TraderConfig, market_data: M, forecaster: F, executor: Executor<B>) -> Self {
        Self {
            config,
            market_data,
            forecaster,
            executor,
        }
    }

    pub fn state(&self) -> PositionState {
        self.executor.state()
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    /// Swap in freshly loaded model artifacts
    pub fn set_forecaster(&mut self, forecaster: F) {
        self.forecaster = forecaster;
    }

    /// Run one cycle using today's date as the end of the history window
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.run_cycle_on(Utc::now().date_naive()).await
    }

    /// Fetch, forecast, decide, act
    ///
    /// Any error skips the rest of the cycle; the position state only
    /// changes when the broker accepted the action.
    pub async fn run_cycle_on(&mut self, today: NaiveDate) -> Result<CycleReport> {
        let symbol = self.config.symbol.clone();
        let needed = self.config.lookback_bars;
        let start = today - Duration::days(self.config.history_days);

        let bars = self.market_data.daily_bars(&symbol, start, today).await?;
        if bars.len() < needed {
            return Err(TraderError::InsufficientHistory {
                got: bars.len(),
                needed,
            });
        }
        let window = &bars[bars.len() - needed..];

        let predicted_price = self.forecaster.predict(window)?;
        let current_price = window[window.len() - 1].close;

        tracing::info!("  Prediction: {:.4}", predicted_price);
        tracing::info!("  Current price: {:.4}", current_price);

        let signal = evaluate_signal(current_price, predicted_price, self.config.trigger_margin);
        let decision = decide(self.executor.state(), signal, self.config.share_count);

        tracing::info!(
            "  Signal: {:?} | Decision: {:?} - {}",
            signal,
            decision.action,
            decision.reason
        );

        self.executor.apply(&decision).await?;

        Ok(CycleReport {
            current_price,
            predicted_price,
            signal,
            action: decision.action,
            state: self.executor.state(),
        })
    }
}
