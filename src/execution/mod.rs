//! Execution engine module
//!
//! Contract purchase and tracking (paper and live modes)

mod paper;
mod types;

pub use paper::PaperEngine;
pub use types::{
    BuyOrder, BuyReceipt, ContractTracking, ContractType, ContractUpdate, Trade, TradeId,
    TradeStatus,
};

use crate::feed::Tick;
use crate::protocol::ProtocolError;
use async_trait::async_trait;

/// Trait for execution engine implementations
///
/// Contract updates after [`track_contract`](ExecutionEngine::track_contract)
/// arrive asynchronously as `ClientEvent::Contract`.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Buy a contract
    async fn buy(&self, order: &BuyOrder) -> Result<BuyReceipt, ProtocolError>;
    /// Follow a contract until it settles
    async fn track_contract(&self, contract_id: u64) -> Result<ContractTracking, ProtocolError>;
    /// Stop a contract stream
    async fn forget(&self, subscription: &str) -> Result<(), ProtocolError>;
    /// Observe a live tick (simulated engines settle on it)
    async fn observe_tick(&self, _tick: &Tick) {}
    /// Mode label for logs
    fn mode_name(&self) -> &'static str;
}
