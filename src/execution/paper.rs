//! Paper trading execution engine

use super::{BuyOrder, BuyReceipt, ContractTracking, ContractUpdate, ExecutionEngine};
use crate::feed::{Tick, MAX_DIGIT};
use crate::protocol::{ClientEvent, ProtocolError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const FIRST_CONTRACT_ID: u64 = 1_000_000;

/// Settled contracts kept for late `track_contract` calls
const SETTLED_KEPT: usize = 256;

#[derive(Debug, Clone)]
struct PaperContract {
    order: BuyOrder,
    payout: Decimal,
    ticks_remaining: u32,
}

#[derive(Debug, Default)]
struct PaperBook {
    balance: Decimal,
    open: HashMap<u64, PaperContract>,
    settled: HashMap<u64, ContractUpdate>,
    settled_order: VecDeque<u64>,
}

impl PaperBook {
    fn remember_settled(&mut self, update: ContractUpdate) {
        if self.settled_order.len() == SETTLED_KEPT {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled_order.push_back(update.contract_id);
        self.settled.insert(update.contract_id, update);
    }
}

/// Paper trading execution engine settled against live ticks
///
/// A contract bought on one tick settles on the `duration_ticks`-th tick
/// observed after it, using that tick's last digit.
pub struct PaperEngine {
    payout_rate: Decimal,
    next_contract_id: AtomicU64,
    book: Arc<RwLock<PaperBook>>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl PaperEngine {
    /// Create a new paper trading engine
    ///
    /// `payout_rate` is the profit fraction of the stake on a win; settlement
    /// updates are delivered on `events`.
    pub fn new(
        balance: Decimal,
        payout_rate: Decimal,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            payout_rate,
            next_contract_id: AtomicU64::new(FIRST_CONTRACT_ID),
            book: Arc::new(RwLock::new(PaperBook {
                balance,
                ..Default::default()
            })),
            events,
        }
    }

    /// Simulated account balance
    pub async fn balance(&self) -> Decimal {
        self.book.read().await.balance
    }

    pub async fn open_contracts(&self) -> usize {
        self.book.read().await.open.len()
    }

    fn reject(code: &str, message: impl Into<String>) -> ProtocolError {
        ProtocolError::Validation {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn settle(contract: &PaperContract, contract_id: u64, exit_digit: u8) -> ContractUpdate {
        let stake = contract.order.amount;
        let won = contract
            .order
            .contract_type
            .wins(exit_digit, contract.order.barrier);
        let sell_price = if won { contract.payout } else { Decimal::ZERO };

        ContractUpdate {
            contract_id,
            is_sold: true,
            profit: sell_price - stake,
            buy_price: stake,
            sell_price: Some(sell_price),
            status: Some(if won { "won" } else { "lost" }.to_string()),
            exit_digit: Some(exit_digit),
        }
    }
}

#[async_trait]
impl ExecutionEngine for PaperEngine {
    async fn buy(&self, order: &BuyOrder) -> Result<BuyReceipt, ProtocolError> {
        if order.amount <= Decimal::ZERO {
            return Err(Self::reject("InputValidationFailed", "stake must be positive"));
        }
        if order.barrier > MAX_DIGIT {
            return Err(Self::reject("InputValidationFailed", "barrier must be a digit"));
        }
        if order.duration_ticks == 0 {
            return Err(Self::reject("InputValidationFailed", "duration must be at least one tick"));
        }

        let mut book = self.book.write().await;
        if order.amount > book.balance {
            return Err(Self::reject("InsufficientBalance", "stake exceeds balance"));
        }

        let contract_id = self.next_contract_id.fetch_add(1, Ordering::Relaxed);
        let payout = (order.amount * (Decimal::ONE + self.payout_rate)).round_dp(2);
        book.balance -= order.amount;
        book.open.insert(
            contract_id,
            PaperContract {
                order: order.clone(),
                payout,
                ticks_remaining: order.duration_ticks,
            },
        );

        tracing::info!(
            contract_id,
            symbol = %order.symbol,
            contract_type = %order.contract_type,
            barrier = order.barrier,
            stake = %order.amount,
            "Paper contract bought"
        );

        Ok(BuyReceipt {
            contract_id,
            buy_price: order.amount,
            payout,
            balance_after: book.balance,
            transaction_id: Some(contract_id),
        })
    }

    async fn track_contract(&self, contract_id: u64) -> Result<ContractTracking, ProtocolError> {
        let book = self.book.read().await;
        if let Some(contract) = book.open.get(&contract_id) {
            return Ok(ContractTracking {
                subscription: Some(format!("paper-{}", contract_id)),
                snapshot: Some(ContractUpdate {
                    contract_id,
                    is_sold: false,
                    profit: Decimal::ZERO,
                    buy_price: contract.order.amount,
                    sell_price: None,
                    status: Some("open".to_string()),
                    exit_digit: None,
                }),
            });
        }
        if let Some(update) = book.settled.get(&contract_id) {
            return Ok(ContractTracking {
                subscription: None,
                snapshot: Some(update.clone()),
            });
        }
        Err(Self::reject("InvalidContractId", format!("unknown contract {}", contract_id)))
    }

    async fn forget(&self, _subscription: &str) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn observe_tick(&self, tick: &Tick) {
        let mut book = self.book.write().await;
        let exit_digit = tick.last_digit();

        let mut expired = Vec::new();
        for (id, contract) in book.open.iter_mut() {
            if contract.order.symbol != tick.symbol {
                continue;
            }
            contract.ticks_remaining = contract.ticks_remaining.saturating_sub(1);
            if contract.ticks_remaining == 0 {
                expired.push(*id);
            }
        }

        for id in expired {
            let Some(contract) = book.open.remove(&id) else {
                continue;
            };
            let update = Self::settle(&contract, id, exit_digit);
            book.balance += update.sell_price.unwrap_or_default();
            tracing::info!(
                contract_id = id,
                exit_digit,
                profit = %update.profit,
                balance = %book.balance,
                "Paper contract settled"
            );
            book.remember_settled(update.clone());
            if self.events.send(ClientEvent::Contract(update)).is_err() {
                tracing::debug!("Event receiver dropped");
            }
        }
    }

    fn mode_name(&self) -> &'static str {
        "paper"
    }
}
