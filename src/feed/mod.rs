//! Tick feed module
//!
//! Ticks, digit history, and the feed seam the orchestrator consumes

mod types;

pub use types::{last_digit, History, Tick, MAX_DIGIT};

use crate::protocol::{AccountSnapshot, ProtocolError, SubscriptionId};
use async_trait::async_trait;

/// Source of ticks and account streams
///
/// Streamed ticks and balance changes arrive as events on the client channel.
#[async_trait]
pub trait TickFeed: Send + Sync {
    /// Start streaming a symbol
    async fn subscribe_ticks(&self, symbol: &str) -> Result<SubscriptionId, ProtocolError>;
    /// Start streaming account balance changes
    async fn subscribe_balance(&self) -> Result<SubscriptionId, ProtocolError>;
    /// Latest `count` ticks of a symbol, oldest first
    async fn tick_history(&self, symbol: &str, count: usize) -> Result<Vec<Tick>, ProtocolError>;
    /// Reopen the session after a disconnect
    async fn reconnect(&self) -> Result<Option<AccountSnapshot>, ProtocolError>;
}
