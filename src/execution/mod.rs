// Position state machine and order execution
pub mod decision;
pub mod executor;

pub use decision::{decide, evaluate_signal, TradeAction, TradeDecision};
pub use executor::{Executor, FillConfirmation};
