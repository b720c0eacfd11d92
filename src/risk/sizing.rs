//! Position sizing
//!
//! Stakes are a fixed fraction of the balance, scaled by signal confidence
//! and damped after consecutive losses.

use super::RiskLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Confidence bucket of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Bucket a confidence in [0, 1]
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceTier::High
        } else if confidence >= 0.6 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    /// Stake multiplier
    pub fn multiplier(&self) -> Decimal {
        match self {
            ConfidenceTier::Low => dec!(0.5),
            ConfidenceTier::Medium => dec!(0.75),
            ConfidenceTier::High => dec!(1),
        }
    }
}

/// `max(0.5, 1 - 0.1 * losses)`
pub fn loss_dampener(consecutive_losses: u32) -> Decimal {
    let damped = Decimal::ONE - dec!(0.1) * Decimal::from(consecutive_losses);
    damped.max(dec!(0.5))
}

/// Floor to a multiple of `granularity` (no-op for a non-positive step)
pub fn floor_to(amount: Decimal, granularity: Decimal) -> Decimal {
    if granularity <= Decimal::ZERO {
        return amount;
    }
    (amount / granularity).floor() * granularity
}

/// Clamp into the configured stake range
pub fn clamp_stake(amount: Decimal, limits: &RiskLimits) -> Decimal {
    amount.max(limits.min_stake).min(limits.max_stake)
}

/// Balance-proportional stake
pub fn size_stake(
    limits: &RiskLimits,
    balance: Decimal,
    tier: ConfidenceTier,
    consecutive_losses: u32,
) -> Decimal {
    let raw = balance.max(Decimal::ZERO)
        * limits.position_size_pct
        * tier.multiplier()
        * loss_dampener(consecutive_losses);
    clamp_stake(floor_to(raw, limits.stake_granularity), limits)
}
