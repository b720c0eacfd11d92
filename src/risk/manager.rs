//! Pre-trade gating, sizing, and settlement bookkeeping

use super::limits::{DrawdownMonitor, RiskLimits};
use super::sizing::{clamp_stake, floor_to, size_stake, ConfidenceTier};
use super::staking::{StakingConfig, StakingPolicy};
use super::types::{DenialReason, RiskDecision, RiskState, StakeBasis, StakePlan};
use crate::execution::TradeId;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Settled trade ids remembered for duplicate detection
const SETTLED_MEMORY: usize = 64;

/// Owns every risk counter; nothing else mutates them
#[derive(Debug, Clone)]
pub struct RiskManager {
    limits: RiskLimits,
    staking: StakingConfig,
    policy: StakingPolicy,
    drawdown: DrawdownMonitor,
    daily_loss: Decimal,
    consecutive_losses: u32,
    active_trades: usize,
    last_reset_date: NaiveDate,
    current_stake: Decimal,
    settled: VecDeque<TradeId>,
}

impl RiskManager {
    pub fn new(
        limits: RiskLimits,
        staking: StakingConfig,
        initial_balance: Decimal,
        today: NaiveDate,
    ) -> Self {
        let policy = StakingPolicy::from_config(&staking);
        let current_stake = clamp_stake(staking.base_stake, &limits);
        Self {
            limits,
            policy,
            staking,
            drawdown: DrawdownMonitor::new(initial_balance),
            daily_loss: Decimal::ZERO,
            consecutive_losses: 0,
            active_trades: 0,
            last_reset_date: today,
            current_stake,
            settled: VecDeque::with_capacity(SETTLED_MEMORY),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn policy(&self) -> &StakingPolicy {
        &self.policy
    }

    /// Stake the progression is at
    pub fn current_stake(&self) -> Decimal {
        self.current_stake
    }

    /// Resume a persisted progression
    pub fn restore_stake(&mut self, stake: Decimal) {
        self.current_stake = clamp_stake(stake, &self.limits);
    }

    pub fn state(&self) -> RiskState {
        RiskState {
            daily_loss: self.daily_loss,
            daily_loss_limit: self.limits.daily_loss_limit,
            max_balance_seen: self.drawdown.peak_balance,
            consecutive_losses: self.consecutive_losses,
            active_trade_count: self.active_trades,
            last_reset_date: self.last_reset_date,
        }
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.drawdown.current_drawdown()
    }

    /// Reset daily counters once per date change
    fn roll_day(&mut self, today: NaiveDate) {
        if today > self.last_reset_date {
            tracing::info!(
                previous = %self.last_reset_date,
                today = %today,
                daily_loss = %self.daily_loss,
                "Daily risk reset"
            );
            self.daily_loss = Decimal::ZERO;
            self.last_reset_date = today;
        }
    }

    /// Track a balance change that did not come from a settlement
    pub fn observe_balance(&mut self, balance: Decimal) {
        self.drawdown.update(balance);
    }

    /// Pre-trade check; the first failing rule wins
    pub fn can_trade(
        &mut self,
        balance: Decimal,
        proposed_stake: Decimal,
        today: NaiveDate,
    ) -> RiskDecision {
        self.roll_day(today);
        if let Some(reason) = self.hard_stop(balance) {
            return RiskDecision::Deny(reason);
        }

        let limits = &self.limits;
        if balance < limits.min_balance_to_trade {
            return RiskDecision::Deny(DenialReason::LowBalance {
                balance,
                minimum: limits.min_balance_to_trade,
            });
        }
        if limits.stop_after_consecutive_losses > 0
            && self.consecutive_losses >= limits.stop_after_consecutive_losses
        {
            return RiskDecision::Deny(DenialReason::ConsecutiveLosses {
                count: self.consecutive_losses,
                limit: limits.stop_after_consecutive_losses,
            });
        }
        if self.active_trades >= limits.max_concurrent_trades {
            return RiskDecision::Deny(DenialReason::MaxConcurrentTrades {
                active: self.active_trades,
                limit: limits.max_concurrent_trades,
            });
        }
        let max = balance * limits.position_size_pct;
        if proposed_stake > max {
            return RiskDecision::Deny(DenialReason::PositionSizeExceeded {
                stake: proposed_stake,
                max,
            });
        }

        RiskDecision::Allow
    }

    /// Daily-loss and drawdown stops, in precedence order
    fn hard_stop(&self, balance: Decimal) -> Option<DenialReason> {
        if self.daily_loss >= self.limits.daily_loss_limit {
            return Some(DenialReason::DailyLossLimit {
                loss: self.daily_loss,
                limit: self.limits.daily_loss_limit,
            });
        }
        let drawdown = self.drawdown.drawdown_at(balance);
        if drawdown >= self.limits.max_drawdown_pct {
            return Some(DenialReason::MaxDrawdown {
                drawdown,
                limit: self.limits.max_drawdown_pct,
            });
        }
        None
    }

    /// Hard stop still in force, if any; used to lift a halt
    pub fn check_halt(&mut self, balance: Decimal, today: NaiveDate) -> Option<DenialReason> {
        self.roll_day(today);
        if let Some(reason) = self.hard_stop(balance) {
            return Some(reason);
        }
        let limit = self.limits.stop_after_consecutive_losses;
        if limit > 0 && self.consecutive_losses >= limit {
            return Some(DenialReason::ConsecutiveLosses {
                count: self.consecutive_losses,
                limit,
            });
        }
        None
    }

    /// Balance-proportional stake for a confidence tier
    pub fn size_position(&self, balance: Decimal, tier: ConfidenceTier) -> Decimal {
        size_stake(&self.limits, balance, tier, self.consecutive_losses)
    }

    /// Stake for the next trade
    ///
    /// Progressive policies use the carried stake; `Fixed` sizes from balance.
    pub fn stake_plan(&self, balance: Decimal, tier: ConfidenceTier) -> StakePlan {
        if self.policy.is_progressive() {
            StakePlan {
                amount: clamp_stake(
                    floor_to(self.current_stake, self.limits.stake_granularity),
                    &self.limits,
                ),
                basis: StakeBasis::Progression,
            }
        } else {
            StakePlan {
                amount: self.size_position(balance, tier),
                basis: StakeBasis::Sizing,
            }
        }
    }

    /// A buy was accepted
    pub fn register_open(&mut self) {
        self.active_trades += 1;
    }

    /// A trade never placed or never confirmed; no stake progression
    pub fn release_failed(&mut self) {
        self.active_trades = self.active_trades.saturating_sub(1);
    }

    /// Apply a settled trade
    ///
    /// Returns false (and changes nothing) for a trade id already applied.
    pub fn record_settlement(
        &mut self,
        trade_id: TradeId,
        won: bool,
        pnl: Decimal,
        new_balance: Decimal,
        today: NaiveDate,
    ) -> bool {
        if self.settled.contains(&trade_id) {
            tracing::warn!(%trade_id, "Duplicate settlement ignored");
            return false;
        }
        if self.settled.len() == SETTLED_MEMORY {
            self.settled.pop_front();
        }
        self.settled.push_back(trade_id);

        self.roll_day(today);
        if won {
            self.consecutive_losses = 0;
        } else {
            self.daily_loss += pnl.abs();
            self.consecutive_losses += 1;
        }
        self.active_trades = self.active_trades.saturating_sub(1);
        self.drawdown.update(new_balance);

        let previous = self.current_stake;
        self.current_stake = self.policy.next_stake(
            previous,
            won,
            self.consecutive_losses,
            self.staking.base_stake,
            self.limits.max_stake,
        );

        tracing::debug!(
            %trade_id,
            won,
            pnl = %pnl,
            daily_loss = %self.daily_loss,
            consecutive_losses = self.consecutive_losses,
            previous_stake = %previous,
            next_stake = %self.current_stake,
            "Settlement recorded"
        );
        true
    }
}
