use crate::models::{OrderSide, PositionState, Signal};

/// Broker action chosen for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeAction {
    Open { side: OrderSide, quantity: u32 },
    Close,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeDecision {
    pub action: TradeAction,
    /// State to record once the action has been accepted by the broker
    pub next_state: PositionState,
    pub reason: String,
}

/// Compare forecast to current price; the margin must be strictly exceeded
pub fn evaluate_signal(current_price: f64, predicted_price: f64, trigger_margin: f64) -> Signal {
    if predicted_price - current_price > trigger_margin {
        Signal::Bullish
    } else if current_price - predicted_price > trigger_margin {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

/// Position state machine: at most one action per signal
///
/// ```text
/// Bullish: FLAT -> LONG (buy), SHORT -> FLAT (close), LONG -> LONG
/// Bearish: FLAT -> SHORT (sell), LONG -> FLAT (close), SHORT -> SHORT
/// Neutral: unchanged
/// ```
pub fn decide(state: PositionState, signal: Signal, share_count: u32) -> TradeDecision {
    use PositionState::*;

    let (action, next_state, reason) = match (signal, state) {
        (Signal::Bullish, Flat) => (
            TradeAction::Open {
                side: OrderSide::Buy,
                quantity: share_count,
            },
            Long,
            "Bullish forecast while flat",
        ),
        (Signal::Bullish, Short) => (TradeAction::Close, Flat, "Bullish forecast against short position"),
        (Signal::Bullish, Long) => (TradeAction::Hold, Long, "Already long"),
        (Signal::Bearish, Flat) => (
            TradeAction::Open {
                side: OrderSide::Sell,
                quantity: share_count,
            },
            Short,
            "Bearish forecast while flat",
        ),
        (Signal::Bearish, Long) => (TradeAction::Close, Flat, "Bearish forecast against long position"),
        (Signal::Bearish, Short) => (TradeAction::Hold, Short, "Already short"),
        (Signal::Neutral, state) => (TradeAction::Hold, state, "Forecast within margin"),
    };

    TradeDecision {
        action,
        next_state,
        reason: reason.to_string(),
    }
}
