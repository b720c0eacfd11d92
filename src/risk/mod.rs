//! Risk management module
//!
//! Pre-trade limits, stake sizing, circuit breakers, and stake progression

mod limits;
mod manager;
mod sizing;
mod staking;
mod types;

pub use limits::{DrawdownMonitor, RiskLimits};
pub use manager::RiskManager;
pub use sizing::{clamp_stake, floor_to, loss_dampener, size_stake, ConfidenceTier};
pub use staking::{StakingConfig, StakingKind, StakingPolicy};
pub use types::{DenialReason, RiskDecision, RiskState, StakeBasis, StakePlan};
