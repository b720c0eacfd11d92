//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trade identifier
pub type TradeId = Uuid;

/// Digit contract kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    /// Wins when the exit digit differs from the barrier
    #[serde(rename = "DIGITDIFF")]
    DigitDiff,
    /// Wins when the exit digit equals the barrier
    #[serde(rename = "DIGITMATCH")]
    DigitMatch,
    /// Wins when the exit digit is above the barrier
    #[serde(rename = "DIGITOVER")]
    DigitOver,
    /// Wins when the exit digit is below the barrier
    #[serde(rename = "DIGITUNDER")]
    DigitUnder,
}

impl ContractType {
    /// Venue name of the contract type
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::DigitDiff => "DIGITDIFF",
            ContractType::DigitMatch => "DIGITMATCH",
            ContractType::DigitOver => "DIGITOVER",
            ContractType::DigitUnder => "DIGITUNDER",
        }
    }

    /// Settle against an exit digit
    pub fn wins(&self, exit_digit: u8, barrier: u8) -> bool {
        match self {
            ContractType::DigitDiff => exit_digit != barrier,
            ContractType::DigitMatch => exit_digit == barrier,
            ContractType::DigitOver => exit_digit > barrier,
            ContractType::DigitUnder => exit_digit < barrier,
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order to buy one contract with a stake basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub symbol: String,
    pub contract_type: ContractType,
    /// Predicted digit
    pub barrier: u8,
    /// Stake amount
    pub amount: Decimal,
    /// Contract length in ticks
    pub duration_ticks: u32,
    pub currency: String,
}

/// Venue acknowledgement of a purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyReceipt {
    pub contract_id: u64,
    pub buy_price: Decimal,
    pub payout: Decimal,
    pub balance_after: Decimal,
    pub transaction_id: Option<u64>,
}

/// State of an open or closed contract as reported by the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractUpdate {
    pub contract_id: u64,
    /// Terminal update marker
    pub is_sold: bool,
    /// Current (or final, when sold) profit
    pub profit: Decimal,
    pub buy_price: Decimal,
    /// Amount credited when sold; zero for a lost contract
    pub sell_price: Option<Decimal>,
    /// Venue status string ("open", "won", "lost", "sold")
    pub status: Option<String>,
    /// Digit of the exit tick, when known
    pub exit_digit: Option<u8>,
}

impl ContractUpdate {
    /// Outcome of a sold contract
    pub fn won(&self) -> bool {
        match self.status.as_deref() {
            Some("won") => true,
            Some("lost") => false,
            _ => self.profit > Decimal::ZERO,
        }
    }
}

/// Result of starting to track a contract
#[derive(Debug, Clone, PartialEq)]
pub struct ContractTracking {
    /// Settlement stream id; absent when the contract was already closed
    pub subscription: Option<String>,
    /// State carried by the acknowledgement
    pub snapshot: Option<ContractUpdate>,
}

/// Trade lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Approved by risk, buy not yet acknowledged
    Proposed,
    /// Buy acknowledged
    Placed,
    /// Venue reported the contract as running
    Open,
    /// Closed with a final profit/loss
    Settled,
    /// Never placed, or could not be confirmed
    Failed,
}

impl TradeStatus {
    /// Statuses that hold the single-flight slot
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TradeStatus::Proposed | TradeStatus::Placed | TradeStatus::Open
        )
    }
}

/// One trade attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub contract_type: ContractType,
    pub barrier: u8,
    pub stake: Decimal,
    pub status: TradeStatus,
    pub contract_id: Option<u64>,
    pub subscription: Option<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    /// Reconnects after which the venue has not yet confirmed this trade
    pub unconfirmed_reconnects: u32,
    pub profit: Option<Decimal>,
}

impl Trade {
    /// Create a trade in `Proposed`
    pub fn propose(order: &BuyOrder, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: order.symbol.clone(),
            contract_type: order.contract_type,
            barrier: order.barrier,
            stake: order.amount,
            status: TradeStatus::Proposed,
            contract_id: None,
            subscription: None,
            confidence,
            created_at: Utc::now(),
            unconfirmed_reconnects: 0,
            profit: None,
        }
    }

    /// Record the venue acknowledgement
    pub fn mark_placed(&mut self, receipt: &BuyReceipt) {
        self.contract_id = Some(receipt.contract_id);
        self.stake = receipt.buy_price;
        self.status = TradeStatus::Placed;
    }

    /// Record the final outcome
    pub fn mark_settled(&mut self, profit: Decimal) {
        self.profit = Some(profit);
        self.status = TradeStatus::Settled;
    }

    pub fn mark_failed(&mut self) {
        self.status = TradeStatus::Failed;
    }
}
