//! Trade orchestration
//!
//! Wires feed, analyzer, risk, and execution into the per-instrument
//! trade lifecycle.

mod engine;
mod state;

pub use engine::TradeOrchestrator;
pub use state::{BotContext, InstrumentState, Phase, SingleFlightScope, TrackedTrade, TradeTotals};
