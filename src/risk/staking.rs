//! Stake progression policies

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Policy selector in config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakingKind {
    #[default]
    Fixed,
    Martingale,
    Progression,
}

/// Staking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    pub policy: StakingKind,
    /// Stake after a win and at start
    pub base_stake: Decimal,
    pub loss_multiplier: Decimal,
    /// Losses after which a progression stops growing
    pub max_steps: u32,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            policy: StakingKind::Fixed,
            base_stake: dec!(1),
            loss_multiplier: dec!(2),
            max_steps: 4,
        }
    }
}

/// How the stake moves between trades
#[derive(Debug, Clone, PartialEq)]
pub enum StakingPolicy {
    /// Stake sized from the balance each trade
    Fixed,
    /// Multiply on every loss
    Martingale { loss_multiplier: Decimal },
    /// Multiply on loss for at most `max_steps` losses in a row
    Progression {
        loss_multiplier: Decimal,
        max_steps: u32,
    },
}

impl StakingPolicy {
    pub fn from_config(config: &StakingConfig) -> Self {
        match config.policy {
            StakingKind::Fixed => StakingPolicy::Fixed,
            StakingKind::Martingale => StakingPolicy::Martingale {
                loss_multiplier: config.loss_multiplier,
            },
            StakingKind::Progression => StakingPolicy::Progression {
                loss_multiplier: config.loss_multiplier,
                max_steps: config.max_steps,
            },
        }
    }

    /// True when the stake comes from the progression rather than sizing
    pub fn is_progressive(&self) -> bool {
        !matches!(self, StakingPolicy::Fixed)
    }

    /// Stake after a settlement
    ///
    /// `losses_in_row` counts the settlement being applied. A win resets to
    /// `base`. A loss step that would exceed `max_stake` holds the current
    /// stake, and a current stake above the cap is clamped to it.
    pub fn next_stake(
        &self,
        current: Decimal,
        won: bool,
        losses_in_row: u32,
        base: Decimal,
        max_stake: Decimal,
    ) -> Decimal {
        let current = current.min(max_stake);
        if won {
            return base.min(max_stake);
        }

        let multiplier = match self {
            StakingPolicy::Fixed => return base.min(max_stake),
            StakingPolicy::Martingale { loss_multiplier } => *loss_multiplier,
            StakingPolicy::Progression {
                loss_multiplier,
                max_steps,
            } => {
                if losses_in_row > *max_steps {
                    return current;
                }
                *loss_multiplier
            }
        };

        let stepped = current * multiplier;
        if stepped > max_stake {
            current
        } else {
            stepped
        }
    }
}
