use std::time::Duration;

use crate::api::Broker;
use crate::execution::{TradeAction, TradeDecision};
use crate::models::{OrderSide, PositionState};
use crate::Result;

/// How (and whether) to confirm fills after an accepted order
#[derive(Debug, Clone, Copy)]
pub struct FillConfirmation {
    pub attempts: u32,
    pub delay: Duration,
}

/// Owns the tracked position state and applies decisions through the broker
pub struct Executor<B: Broker> {
    broker: B,
    symbol: String,
    state: PositionState,
    confirmation: Option<FillConfirmation>,
}

impl<B: Broker> Executor<B> {
    pub fn new(broker: B, symbol: impl Into<String>) -> Self {
        Self {
            broker,
            symbol: symbol.into(),
            state: PositionState::Flat,
            confirmation: None,
        }
    }

    /// Poll the broker's position listing after each accepted order
    pub fn with_fill_confirmation(mut self, confirmation: FillConfirmation) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Issue the decision's broker call, then record the new state
    ///
    /// On error the state is left untouched.
    pub async fn apply(&mut self, decision: &TradeDecision) -> Result<()> {
        match decision.action {
            TradeAction::Hold => {
                tracing::debug!("No action: {}", decision.reason);
                return Ok(());
            }
            TradeAction::Open { side, quantity } => {
                tracing::info!(
                    "  → {} {} shares of {}",
                    if side == OrderSide::Buy { "Buying" } else { "Selling" },
                    quantity,
                    self.symbol
                );
                let ack = self.broker.open_position(&self.symbol, quantity, side).await?;
                tracing::info!("  ✓ Order {} accepted ({})", ack.id, ack.status);
            }
            TradeAction::Close => {
                tracing::info!("  → Closing {} position in {}", self.state, self.symbol);
                let ack = self.broker.close_position(&self.symbol).await?;
                tracing::info!("  ✓ Close order {} accepted ({})", ack.id, ack.status);
            }
        }

        match self.confirmation {
            None => self.state = decision.next_state,
            Some(confirmation) => {
                let previous = self.state;
                self.confirm(previous, decision.next_state, confirmation).await
            }
        }
        Ok(())
    }

    /// Broker-reported state for our symbol
    pub async fn reconcile(&self) -> Result<PositionState> {
        let positions = self.broker.list_positions().await?;
        let side = positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(&self.symbol) && p.qty > 0.0)
            .map(|p| p.side);
        Ok(PositionState::from_side(side))
    }

    /// Replace the tracked state with what the broker reports
    pub async fn sync_with_broker(&mut self) -> Result<PositionState> {
        let state = self.reconcile().await?;
        if state != self.state {
            tracing::info!("Position state {} -> {} (from broker)", self.state, state);
        }
        self.state = state;
        Ok(state)
    }

    async fn confirm(
        &mut self,
        previous: PositionState,
        expected: PositionState,
        confirmation: FillConfirmation,
    ) {
        let mut observed = None;

        for attempt in 1..=confirmation.attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(confirmation.delay).await;
            }
            match self.reconcile().await {
                Ok(state) if state == expected => {
                    tracing::info!("  ✓ Broker confirms {} (attempt {})", state, attempt);
                    self.state = state;
                    return;
                }
                Ok(state) => observed = Some(state),
                Err(e) => tracing::warn!("  ✗ Position check failed (attempt {}): {}", attempt, e),
            }
        }

        match observed {
            // Accepted but not yet filled (e.g. outside market hours)
            Some(state) if state == previous => {
                tracing::warn!(
                    "Order for {} still pending, broker reports {}; tracking {}",
                    self.symbol,
                    state,
                    expected
                );
                self.state = expected;
            }
            Some(state) => {
                tracing::warn!(
                    "Broker reports {} after order, expected {}; tracking broker state",
                    state,
                    expected
                );
                self.state = state;
            }
            None => {
                // Order was accepted but we could never read positions back
                tracing::warn!(
                    "Could not confirm fill, assuming {} as accepted",
                    expected
                );
                self.state = expected;
            }
        }
    }
}
