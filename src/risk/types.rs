//! Risk management types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a trade was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DenialReason {
    DailyLossLimit { loss: Decimal, limit: Decimal },
    MaxDrawdown { drawdown: Decimal, limit: Decimal },
    LowBalance { balance: Decimal, minimum: Decimal },
    ConsecutiveLosses { count: u32, limit: u32 },
    MaxConcurrentTrades { active: usize, limit: usize },
    PositionSizeExceeded { stake: Decimal, max: Decimal },
}

impl DenialReason {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::DailyLossLimit { .. } => "DAILY_LOSS_LIMIT",
            DenialReason::MaxDrawdown { .. } => "MAX_DRAWDOWN",
            DenialReason::LowBalance { .. } => "LOW_BALANCE",
            DenialReason::ConsecutiveLosses { .. } => "CONSECUTIVE_LOSSES",
            DenialReason::MaxConcurrentTrades { .. } => "MAX_CONCURRENT_TRADES",
            DenialReason::PositionSizeExceeded { .. } => "POSITION_SIZE_EXCEEDED",
        }
    }

    /// Human-readable explanation
    pub fn message(&self) -> String {
        match self {
            DenialReason::DailyLossLimit { loss, limit } => {
                format!("daily loss {} reached limit {}", loss, limit)
            }
            DenialReason::MaxDrawdown { drawdown, limit } => format!(
                "drawdown {:.2}% reached limit {:.2}%",
                drawdown * Decimal::ONE_HUNDRED,
                limit * Decimal::ONE_HUNDRED
            ),
            DenialReason::LowBalance { balance, minimum } => {
                format!("balance {} below minimum {}", balance, minimum)
            }
            DenialReason::ConsecutiveLosses { count, limit } => {
                format!("{} consecutive losses (limit {})", count, limit)
            }
            DenialReason::MaxConcurrentTrades { active, limit } => {
                format!("{} trades active (limit {})", active, limit)
            }
            DenialReason::PositionSizeExceeded { stake, max } => {
                format!("stake {} exceeds position limit {}", stake, max)
            }
        }
    }

    /// Reasons that halt all trading rather than skip one opportunity
    pub fn is_hard_stop(&self) -> bool {
        matches!(
            self,
            DenialReason::DailyLossLimit { .. }
                | DenialReason::MaxDrawdown { .. }
                | DenialReason::ConsecutiveLosses { .. }
        )
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Outcome of a pre-trade check
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Allow,
    Deny(DenialReason),
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allow)
    }
}

/// Risk counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_loss: Decimal,
    pub daily_loss_limit: Decimal,
    pub max_balance_seen: Decimal,
    pub consecutive_losses: u32,
    pub active_trade_count: usize,
    pub last_reset_date: NaiveDate,
}

/// How a stake amount was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeBasis {
    /// Balance-proportional sizing
    Sizing,
    /// Carried by a loss progression
    Progression,
}

/// Stake chosen for the next trade; `min_stake <= amount <= max_stake`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakePlan {
    pub amount: Decimal,
    pub basis: StakeBasis,
}
