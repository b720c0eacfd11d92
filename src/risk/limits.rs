//! Risk limits and drawdown tracking

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Absolute loss allowed per calendar day
    pub daily_loss_limit: Decimal,
    /// Maximum drawdown from the balance high-water mark (fraction)
    pub max_drawdown_pct: Decimal,
    /// No new trades below this balance
    pub min_balance_to_trade: Decimal,
    /// Losses in a row that stop trading
    pub stop_after_consecutive_losses: u32,
    pub max_concurrent_trades: usize,
    /// Largest stake as a fraction of balance
    pub position_size_pct: Decimal,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Stakes are floored to a multiple of this
    pub stake_granularity: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_limit: dec!(50),
            max_drawdown_pct: dec!(0.20),
            min_balance_to_trade: dec!(10),
            stop_after_consecutive_losses: 5,
            max_concurrent_trades: 1,
            position_size_pct: dec!(0.02),
            min_stake: dec!(0.35),
            max_stake: dec!(100),
            stake_granularity: dec!(0.01),
        }
    }
}

/// Balance high-water mark
#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownMonitor {
    /// Highest balance seen; never decreases
    pub peak_balance: Decimal,
    pub current_balance: Decimal,
}

impl DrawdownMonitor {
    /// Create a new drawdown monitor
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            peak_balance: initial_balance,
            current_balance: initial_balance,
        }
    }

    /// Update with a new balance
    pub fn update(&mut self, balance: Decimal) {
        self.current_balance = balance;
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
    }

    /// Drawdown of `balance` from the peak, as a fraction
    pub fn drawdown_at(&self, balance: Decimal) -> Decimal {
        if self.peak_balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_balance - balance) / self.peak_balance).max(Decimal::ZERO)
    }

    /// Current drawdown from the peak
    pub fn current_drawdown(&self) -> Decimal {
        self.drawdown_at(self.current_balance)
    }
}
