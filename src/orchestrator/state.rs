//! Orchestrator state

use crate::execution::{Trade, TradeId};
use crate::feed::History;
use crate::protocol::SubscriptionId;
use crate::risk::DenialReason;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tokio::time::Instant;

/// Per-instrument lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Analyzing,
    Proposed,
    Placed,
    Open,
    Settling,
    Cooldown,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How many trades may be in flight at once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleFlightScope {
    /// One trade across all instruments
    #[default]
    Global,
    /// One trade per instrument
    PerInstrument,
}

/// One traded symbol
#[derive(Debug, Clone)]
pub struct InstrumentState {
    pub symbol: String,
    pub history: History,
    pub phase: Phase,
    pub subscription: Option<SubscriptionId>,
    /// When to ask for the tick stream again after a failed subscribe
    pub resubscribe_at: Option<Instant>,
    /// Set while in cooldown or retry suspension
    pub cooldown_until: Option<Instant>,
    pub suspended_since: Option<Instant>,
}

impl InstrumentState {
    pub fn new(symbol: impl Into<String>, history_size: usize) -> Self {
        Self {
            symbol: symbol.into(),
            history: History::new(history_size),
            phase: Phase::Idle,
            subscription: None,
            resubscribe_at: None,
            cooldown_until: None,
            suspended_since: None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.cooldown_until.is_some()
    }

    /// Hold the instrument until `until`
    pub fn suspend(&mut self, now: Instant, until: Instant) {
        self.phase = Phase::Cooldown;
        self.cooldown_until = Some(until);
        if self.suspended_since.is_none() {
            self.suspended_since = Some(now);
        }
    }

    /// Return to `Idle`
    pub fn reactivate(&mut self) {
        self.phase = Phase::Idle;
        self.cooldown_until = None;
        self.suspended_since = None;
    }
}

/// A trade the orchestrator is following
#[derive(Debug, Clone)]
pub struct TrackedTrade {
    pub trade: Trade,
    /// When to ask the venue again if no settlement arrived
    pub recheck_at: Option<Instant>,
}

/// Lifetime trade counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeTotals {
    pub total: u64,
    pub wins: u64,
    pub losses: u64,
}

/// Everything the orchestrator mutates
#[derive(Debug, Clone)]
pub struct BotContext {
    pub balance: Decimal,
    pub currency: String,
    /// Hard stop currently in force
    pub halted: Option<DenialReason>,
    pub trades: HashMap<TradeId, TrackedTrade>,
    pub instruments: BTreeMap<String, InstrumentState>,
    pub totals: TradeTotals,
    pub balance_subscription: Option<SubscriptionId>,
    pub balance_resubscribe_at: Option<Instant>,
    /// A progressive stake is over the position limit and was reported
    pub stake_blocked: bool,
}

impl BotContext {
    pub fn new(
        balance: Decimal,
        currency: impl Into<String>,
        symbols: &[String],
        history_size: usize,
    ) -> Self {
        Self {
            balance,
            currency: currency.into(),
            halted: None,
            trades: HashMap::new(),
            instruments: symbols
                .iter()
                .map(|s| (s.clone(), InstrumentState::new(s.clone(), history_size)))
                .collect(),
            totals: TradeTotals::default(),
            balance_subscription: None,
            balance_resubscribe_at: None,
            stake_blocked: false,
        }
    }

    /// Trades in Proposed, Placed, or Open
    pub fn in_flight(&self) -> impl Iterator<Item = &Trade> {
        self.trades
            .values()
            .map(|t| &t.trade)
            .filter(|t| t.status.is_in_flight())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight().count()
    }

    /// Whether single-flight forbids a new trade on `symbol`
    pub fn flight_busy(&self, scope: SingleFlightScope, symbol: &str) -> bool {
        match scope {
            SingleFlightScope::Global => self.in_flight().next().is_some(),
            SingleFlightScope::PerInstrument => self.in_flight().any(|t| t.symbol == symbol),
        }
    }

    pub fn trade_by_contract(&self, contract_id: u64) -> Option<TradeId> {
        self.trades
            .values()
            .find(|t| t.trade.contract_id == Some(contract_id))
            .map(|t| t.trade.id)
    }

    pub fn suspended_count(&self) -> usize {
        self.instruments.values().filter(|i| i.is_suspended()).count()
    }

    /// Earliest timer the loop must wake for
    pub fn next_deadline(&self) -> Option<Instant> {
        let cooldowns = self.instruments.values().filter_map(|i| i.cooldown_until);
        let resubscribes = self.instruments.values().filter_map(|i| i.resubscribe_at);
        let rechecks = self.trades.values().filter_map(|t| t.recheck_at);
        cooldowns
            .chain(resubscribes)
            .chain(rechecks)
            .chain(self.balance_resubscribe_at)
            .min()
    }
}
