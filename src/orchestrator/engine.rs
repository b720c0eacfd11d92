//! Trade lifecycle orchestrator
//!
//! Drives each instrument through
//! `Idle -> Analyzing -> Proposed -> Placed -> Open -> Settling -> Cooldown -> Idle`
//! from a single task. Events are handled one at a time, so no handler ever
//! observes another half-way through.

use super::state::{BotContext, Phase, TrackedTrade};
use crate::analyzer::TickAnalyzer;
use crate::config::TradingConfig;
use crate::execution::{BuyOrder, BuyReceipt, ContractUpdate, ExecutionEngine, Trade, TradeId, TradeStatus};
use crate::feed::{History, Tick, TickFeed};
use crate::notify::{LogNotifier, Notifier, NotifyEvent};
use crate::protocol::{ClientEvent, ProtocolError, RetryPolicy};
use crate::risk::{ConfidenceTier, DenialReason, RiskDecision, RiskManager};
use crate::store::{NullStore, StrategyState, StrategyStore};
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{Local, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Trade orchestrator
pub struct TradeOrchestrator {
    config: TradingConfig,
    feed: Arc<dyn TickFeed>,
    execution: Arc<dyn ExecutionEngine>,
    analyzer: Box<dyn TickAnalyzer>,
    analyzer_weights: BTreeMap<String, f64>,
    risk: RiskManager,
    notifier: Arc<dyn Notifier>,
    store: Box<dyn StrategyStore>,
    retry: RetryPolicy,
    balance_stream: bool,
    ctx: BotContext,
}

impl TradeOrchestrator {
    pub fn new(
        config: TradingConfig,
        feed: Arc<dyn TickFeed>,
        execution: Arc<dyn ExecutionEngine>,
        analyzer: Box<dyn TickAnalyzer>,
        risk: RiskManager,
        balance: Decimal,
    ) -> Self {
        let ctx = BotContext::new(
            balance,
            config.currency.clone(),
            &config.symbols,
            config.history_size,
        );
        Self {
            config,
            feed,
            execution,
            analyzer,
            analyzer_weights: BTreeMap::new(),
            risk,
            notifier: Arc::new(LogNotifier),
            store: Box::new(NullStore),
            retry: RetryPolicy::default(),
            balance_stream: false,
            ctx,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_store(mut self, store: Box<dyn StrategyStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Follow the venue's balance stream (live accounts)
    pub fn with_balance_stream(mut self, enabled: bool) -> Self {
        self.balance_stream = enabled;
        self
    }

    /// Weights recorded alongside persisted state
    pub fn with_analyzer_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.analyzer_weights = weights;
        self
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    /// Restore state, backfill histories, and open the streams
    pub async fn start(&mut self) -> Result<(), ProtocolError> {
        self.restore_state();

        let symbols: Vec<String> = self.ctx.instruments.keys().cloned().collect();
        for symbol in &symbols {
            match self.feed.tick_history(symbol, self.config.backfill_count).await {
                Ok(ticks) => {
                    if let Some(inst) = self.ctx.instruments.get_mut(symbol) {
                        inst.history = History::from_ticks(self.config.history_size, &ticks);
                        tracing::info!(symbol = %symbol, digits = inst.history.len(), "History backfilled");
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "History backfill failed"),
            }
        }

        self.subscribe_all().await?;
        self.publish_gauges();
        tracing::info!(
            mode = self.execution.mode_name(),
            analyzer = self.analyzer.name(),
            symbols = ?symbols,
            balance = %self.ctx.balance,
            "Orchestrator started"
        );
        Ok(())
    }

    /// Process events and timers until the event stream ends
    ///
    /// Returns an error only for fatal protocol failures.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Result<(), ProtocolError> {
        loop {
            let deadline = self.ctx.next_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => {
                        tracing::info!("Event stream closed");
                        return Ok(());
                    }
                },
                _ = wait_until(deadline) => self.handle_timer(Instant::now()).await?,
            }
        }
    }

    /// Save state before exit
    pub fn shutdown(&mut self) {
        self.save_state();
        tracing::info!(
            balance = %self.ctx.balance,
            trades = self.ctx.totals.total,
            wins = self.ctx.totals.wins,
            losses = self.ctx.totals.losses,
            "Orchestrator stopped"
        );
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> Result<(), ProtocolError> {
        match event {
            ClientEvent::Tick(tick) => self.on_tick(tick).await,
            ClientEvent::Contract(update) => {
                self.apply_contract_update(update).await;
                Ok(())
            }
            ClientEvent::Balance { balance, currency } => {
                tracing::debug!(balance = %balance, currency = %currency, "Balance update");
                self.ctx.balance = balance;
                self.risk.observe_balance(balance);
                self.publish_gauges();
                Ok(())
            }
            ClientEvent::Candle(candle) => {
                tracing::trace!(symbol = %candle.symbol, close = %candle.close, "Candle");
                Ok(())
            }
            ClientEvent::Disconnected { reason } => self.on_disconnect(reason).await,
        }
    }

    /// Expire cooldowns, retry failed subscriptions, and re-check overdue trades
    pub async fn handle_timer(&mut self, now: Instant) -> Result<(), ProtocolError> {
        for inst in self.ctx.instruments.values_mut() {
            if inst.cooldown_until.is_some_and(|until| until <= now) {
                tracing::debug!(symbol = %inst.symbol, "Cooldown over");
                inst.reactivate();
            }
        }

        let overdue: Vec<TradeId> = self
            .ctx
            .trades
            .values()
            .filter(|t| t.recheck_at.is_some_and(|at| at <= now))
            .map(|t| t.trade.id)
            .collect();
        for trade_id in overdue {
            tracing::warn!(%trade_id, "No settlement yet, re-checking contract");
            self.reconfirm(trade_id).await;
        }

        let resubscribe: Vec<String> = self
            .ctx
            .instruments
            .values()
            .filter(|i| i.resubscribe_at.is_some_and(|at| at <= now))
            .map(|i| i.symbol.clone())
            .collect();
        for symbol in resubscribe {
            self.subscribe_symbol(&symbol).await?;
        }
        if self.ctx.balance_resubscribe_at.is_some_and(|at| at <= now) {
            self.subscribe_balance_stream().await?;
        }

        self.publish_gauges();
        Ok(())
    }

    async fn on_tick(&mut self, tick: Tick) -> Result<(), ProtocolError> {
        telemetry::increment(CounterMetric::TicksReceived);
        self.execution.observe_tick(&tick).await;

        let symbol = tick.symbol.clone();
        let Some(inst) = self.ctx.instruments.get_mut(&symbol) else {
            tracing::debug!(symbol = %symbol, "Tick for untracked symbol");
            return Ok(());
        };
        inst.history.push_tick(&tick);
        if inst.phase != Phase::Idle || inst.is_suspended() {
            return Ok(());
        }

        if self.ctx.halted.is_some() {
            self.try_resume();
            if self.ctx.halted.is_some() {
                return Ok(());
            }
        }
        if self.ctx.flight_busy(self.config.single_flight, &symbol) {
            return Ok(());
        }

        self.evaluate(&symbol).await
    }

    /// Analyze, gate, and possibly buy
    async fn evaluate(&mut self, symbol: &str) -> Result<(), ProtocolError> {
        let Some(inst) = self.ctx.instruments.get_mut(symbol) else {
            return Ok(());
        };
        inst.phase = Phase::Analyzing;

        let started = Instant::now();
        let signal = self.analyzer.analyze(&inst.history);
        telemetry::record_latency(LatencyMetric::Analysis, started.elapsed());

        if !signal.should_trade {
            inst.phase = Phase::Idle;
            tracing::trace!(symbol, code = %signal.code, reason = %signal.reason, "No trade");
            return Ok(());
        }
        telemetry::increment(CounterMetric::SignalsGenerated);
        inst.phase = Phase::Proposed;

        let tier = ConfidenceTier::from_confidence(signal.confidence);
        let plan = self.risk.stake_plan(self.ctx.balance, tier);
        if let RiskDecision::Deny(reason) = self.risk.can_trade(self.ctx.balance, plan.amount, today()) {
            self.set_phase(symbol, Phase::Idle);
            telemetry::increment_with_reason(CounterMetric::RiskDenials, reason.code());
            tracing::info!(symbol, code = reason.code(), reason = %reason.message(), "Trade denied");
            if reason.is_hard_stop() {
                self.halt(reason);
            } else if matches!(reason, DenialReason::PositionSizeExceeded { .. })
                && self.risk.policy().is_progressive()
            {
                self.report_stake_blocked(&reason);
            }
            return Ok(());
        }
        self.ctx.stake_blocked = false;

        let order = BuyOrder {
            symbol: symbol.to_string(),
            contract_type: self.config.contract_type,
            barrier: signal.target,
            amount: plan.amount,
            duration_ticks: self.config.duration_ticks,
            currency: self.ctx.currency.clone(),
        };
        let trade = Trade::propose(&order, signal.confidence);
        let trade_id = trade.id;
        tracing::info!(
            %trade_id,
            symbol,
            contract_type = %order.contract_type,
            barrier = order.barrier,
            stake = %order.amount,
            basis = ?plan.basis,
            confidence = signal.confidence,
            reason = %signal.reason,
            "Placing trade"
        );
        self.ctx.trades.insert(
            trade_id,
            TrackedTrade {
                trade,
                recheck_at: None,
            },
        );

        match self.execution.buy(&order).await {
            Ok(receipt) => {
                self.on_placed(trade_id, receipt).await;
                Ok(())
            }
            Err(e) => self.on_buy_failed(trade_id, e),
        }
    }

    async fn on_placed(&mut self, trade_id: TradeId, receipt: BuyReceipt) {
        let recheck_at = Instant::now() + self.contract_timeout();
        let Some(tracked) = self.ctx.trades.get_mut(&trade_id) else {
            return;
        };
        tracked.trade.mark_placed(&receipt);
        tracked.recheck_at = Some(recheck_at);
        let trade = tracked.trade.clone();

        self.ctx.balance = receipt.balance_after;
        self.risk.register_open();
        self.set_phase(&trade.symbol, Phase::Placed);
        telemetry::increment(CounterMetric::TradesPlaced);
        tracing::info!(
            %trade_id,
            contract_id = receipt.contract_id,
            buy_price = %receipt.buy_price,
            payout = %receipt.payout,
            balance = %receipt.balance_after,
            "Trade placed"
        );
        self.notifier.notify(
            NotifyEvent::TradePlaced,
            json!({
                "trade_id": trade_id.to_string(),
                "symbol": trade.symbol,
                "contract_id": receipt.contract_id,
                "contract_type": trade.contract_type.as_str(),
                "barrier": trade.barrier,
                "stake": receipt.buy_price.to_string(),
                "confidence": trade.confidence,
            }),
        );
        self.publish_gauges();

        match self.execution.track_contract(receipt.contract_id).await {
            Ok(tracking) => {
                if let Some(tracked) = self.ctx.trades.get_mut(&trade_id) {
                    tracked.trade.subscription = tracking.subscription;
                }
                if let Some(snapshot) = tracking.snapshot {
                    self.apply_contract_update(snapshot).await;
                }
            }
            Err(e) => {
                // the periodic re-check or the next reconnect picks it up
                tracing::warn!(%trade_id, contract_id = receipt.contract_id, error = %e, "Contract tracking failed");
            }
        }
    }

    fn on_buy_failed(&mut self, trade_id: TradeId, err: ProtocolError) -> Result<(), ProtocolError> {
        let symbol = match self.ctx.trades.remove(&trade_id) {
            Some(mut tracked) => {
                tracked.trade.mark_failed();
                tracked.trade.symbol
            }
            None => return Ok(()),
        };

        telemetry::increment_with_reason(CounterMetric::TradesFailed, err.code());
        tracing::warn!(%trade_id, symbol = %symbol, code = err.code(), error = %err, "Buy failed");
        self.notifier.notify(
            NotifyEvent::TradeFailed,
            json!({
                "trade_id": trade_id.to_string(),
                "symbol": symbol,
                "code": err.code(),
                "message": err.to_string(),
            }),
        );

        let now = Instant::now();
        if let Some(inst) = self.ctx.instruments.get_mut(&symbol) {
            inst.phase = Phase::Failed;
            match err.retry_after(&self.retry) {
                Some(delay) => {
                    tracing::info!(symbol = %symbol, delay_secs = delay.as_secs(), "Suspending instrument");
                    inst.suspend(now, now + delay);
                }
                None => inst.phase = Phase::Idle,
            }
        }
        self.enforce_suspension_cap();

        if err.is_fatal() {
            self.notifier.notify(
                NotifyEvent::FatalError,
                json!({ "code": err.code(), "message": err.to_string() }),
            );
            return Err(err);
        }
        Ok(())
    }

    /// Apply a venue report for a tracked contract
    async fn apply_contract_update(&mut self, update: ContractUpdate) {
        let Some(trade_id) = self.ctx.trade_by_contract(update.contract_id) else {
            tracing::debug!(contract_id = update.contract_id, "Update for unknown contract");
            return;
        };

        if !update.is_sold {
            let symbol = match self.ctx.trades.get_mut(&trade_id) {
                Some(tracked) if tracked.trade.status == TradeStatus::Placed => {
                    tracked.trade.status = TradeStatus::Open;
                    tracked.trade.symbol.clone()
                }
                _ => return,
            };
            self.set_phase(&symbol, Phase::Open);
            return;
        }

        self.settle(trade_id, update).await;
    }

    async fn settle(&mut self, trade_id: TradeId, update: ContractUpdate) {
        let Some(mut tracked) = self.ctx.trades.remove(&trade_id) else {
            return;
        };
        let symbol = tracked.trade.symbol.clone();
        self.set_phase(&symbol, Phase::Settling);

        let won = update.won();
        tracked.trade.mark_settled(update.profit);
        self.ctx.balance += update.sell_price.unwrap_or_default();

        if !self
            .risk
            .record_settlement(trade_id, won, update.profit, self.ctx.balance, today())
        {
            return;
        }

        let totals = &mut self.ctx.totals;
        totals.total += 1;
        if won {
            totals.wins += 1;
            telemetry::increment(CounterMetric::TradesWon);
        } else {
            totals.losses += 1;
            telemetry::increment(CounterMetric::TradesLost);
        }
        let lifetime = (Utc::now() - tracked.trade.created_at)
            .to_std()
            .unwrap_or_default();
        telemetry::record_latency(LatencyMetric::TradeLifetime, lifetime);

        tracing::info!(
            %trade_id,
            symbol = %symbol,
            contract_id = update.contract_id,
            won,
            profit = %update.profit,
            exit_digit = ?update.exit_digit,
            balance = %self.ctx.balance,
            next_stake = %self.risk.current_stake(),
            "Trade settled"
        );

        if let Some(subscription) = tracked.trade.subscription.as_deref() {
            if let Err(e) = self.execution.forget(subscription).await {
                tracing::debug!(subscription, error = %e, "Forget failed");
            }
        }

        self.notifier.notify(
            NotifyEvent::TradeSettled,
            json!({
                "trade_id": trade_id.to_string(),
                "symbol": symbol,
                "contract_id": update.contract_id,
                "won": won,
                "profit": update.profit.to_string(),
                "payout": update.sell_price.unwrap_or_default().to_string(),
                "exit_digit": update.exit_digit,
                "balance": self.ctx.balance.to_string(),
            }),
        );
        self.save_state();

        let now = Instant::now();
        let cooldown = self.cooldown(won);
        if let Some(inst) = self.ctx.instruments.get_mut(&symbol) {
            inst.suspend(now, now + cooldown);
        }
        tracing::debug!(symbol = %symbol, cooldown_ms = cooldown.as_millis() as u64, "Cooldown");
        self.enforce_suspension_cap();

        if let Some(reason) = self.risk.check_halt(self.ctx.balance, today()) {
            self.halt(reason);
        }
        self.publish_gauges();
    }

    /// Randomized wait, stretched after a loss
    fn cooldown(&self, won: bool) -> Duration {
        let min = self.config.min_wait_ms.min(self.config.max_wait_ms);
        let max = self.config.max_wait_ms.max(min);
        let base = rand::thread_rng().gen_range(min..=max);
        let factor = if won {
            1.0
        } else {
            self.config.loss_wait_multiplier.max(0.0)
        };
        Duration::from_millis((base as f64 * factor) as u64)
    }

    /// Reactivate the longest-suspended instruments beyond the cap
    fn enforce_suspension_cap(&mut self) {
        let cap = self.config.max_suspended_instruments;
        if cap == 0 {
            return;
        }
        while self.ctx.suspended_count() > cap {
            let oldest = self
                .ctx
                .instruments
                .values_mut()
                .filter(|i| i.is_suspended())
                .min_by_key(|i| i.suspended_since);
            match oldest {
                Some(inst) => {
                    tracing::info!(symbol = %inst.symbol, "Too many suspended instruments, reactivating oldest");
                    inst.reactivate();
                }
                None => break,
            }
        }
    }

    async fn on_disconnect(&mut self, reason: String) -> Result<(), ProtocolError> {
        tracing::warn!(reason = %reason, in_flight = self.ctx.in_flight_count(), "Disconnected");
        for inst in self.ctx.instruments.values_mut() {
            inst.subscription = None;
            inst.resubscribe_at = None;
        }
        self.ctx.balance_subscription = None;
        self.ctx.balance_resubscribe_at = None;
        // streams die with the session
        for tracked in self.ctx.trades.values_mut() {
            tracked.trade.subscription = None;
        }

        match self.feed.reconnect().await {
            Ok(Some(account)) => {
                self.ctx.balance = account.balance;
                self.ctx.currency = account.currency;
                self.risk.observe_balance(account.balance);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Reconnect failed");
                self.notifier.notify(
                    NotifyEvent::FatalError,
                    json!({ "code": e.code(), "message": e.to_string() }),
                );
                return Err(e);
            }
        }

        self.subscribe_all().await?;

        let unconfirmed: Vec<TradeId> = self
            .ctx
            .trades
            .values()
            .filter(|t| t.trade.status.is_in_flight() && t.trade.contract_id.is_some())
            .map(|t| t.trade.id)
            .collect();
        for trade_id in unconfirmed {
            self.reconfirm(trade_id).await;
        }
        Ok(())
    }

    /// Ask the venue about an in-flight trade again
    async fn reconfirm(&mut self, trade_id: TradeId) {
        let Some((contract_id, stale)) = self.ctx.trades.get_mut(&trade_id).and_then(|t| {
            t.trade
                .contract_id
                .map(|id| (id, t.trade.subscription.take()))
        }) else {
            return;
        };
        if let Some(subscription) = stale {
            if let Err(e) = self.execution.forget(&subscription).await {
                tracing::debug!(%trade_id, subscription = %subscription, error = %e, "Forget failed");
            }
        }
        let next_check = Instant::now() + self.contract_timeout();

        match self.execution.track_contract(contract_id).await {
            Ok(tracking) => {
                if let Some(tracked) = self.ctx.trades.get_mut(&trade_id) {
                    tracked.trade.unconfirmed_reconnects = 0;
                    tracked.trade.subscription = tracking.subscription;
                    tracked.recheck_at = Some(next_check);
                }
                tracing::info!(%trade_id, contract_id, "Contract re-tracked");
                if let Some(snapshot) = tracking.snapshot {
                    self.apply_contract_update(snapshot).await;
                }
            }
            Err(e) => {
                let attempts = match self.ctx.trades.get_mut(&trade_id) {
                    Some(tracked) => {
                        tracked.trade.unconfirmed_reconnects += 1;
                        tracked.recheck_at = Some(next_check);
                        tracked.trade.unconfirmed_reconnects
                    }
                    None => return,
                };
                tracing::warn!(%trade_id, contract_id, attempts, error = %e, "Contract not confirmed");
                if attempts > self.config.max_unconfirmed_reconnects {
                    self.fail_unconfirmed(trade_id);
                }
            }
        }
    }

    /// Give up on a trade the venue never confirmed
    fn fail_unconfirmed(&mut self, trade_id: TradeId) {
        let Some(mut tracked) = self.ctx.trades.remove(&trade_id) else {
            return;
        };
        tracked.trade.mark_failed();
        self.risk.release_failed();
        self.set_phase(&tracked.trade.symbol, Phase::Idle);
        telemetry::increment_with_reason(CounterMetric::TradesFailed, "UNCONFIRMED");
        tracing::error!(
            %trade_id,
            contract_id = ?tracked.trade.contract_id,
            "Trade abandoned after unconfirmed reconnects"
        );
        self.notifier.notify(
            NotifyEvent::TradeFailed,
            json!({
                "trade_id": trade_id.to_string(),
                "symbol": tracked.trade.symbol,
                "contract_id": tracked.trade.contract_id,
                "code": "UNCONFIRMED",
                "message": "contract could not be confirmed after reconnecting",
            }),
        );
        self.publish_gauges();
    }

    async fn subscribe_all(&mut self) -> Result<(), ProtocolError> {
        let symbols: Vec<String> = self.ctx.instruments.keys().cloned().collect();
        for symbol in symbols {
            self.subscribe_symbol(&symbol).await?;
        }
        if self.balance_stream {
            self.subscribe_balance_stream().await?;
        }
        Ok(())
    }

    /// Open one tick stream; a non-fatal failure schedules another attempt
    async fn subscribe_symbol(&mut self, symbol: &str) -> Result<(), ProtocolError> {
        let result = self.feed.subscribe_ticks(symbol).await;
        let retry_at = self.retry_at(&result);
        let Some(inst) = self.ctx.instruments.get_mut(symbol) else {
            return Ok(());
        };
        match result {
            Ok(id) => {
                tracing::info!(symbol, subscription = %id, "Subscribed to ticks");
                inst.subscription = Some(id);
                inst.resubscribe_at = None;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(symbol, code = e.code(), error = %e, "Tick subscription failed, will retry");
                inst.subscription = None;
                inst.resubscribe_at = retry_at;
                Ok(())
            }
        }
    }

    async fn subscribe_balance_stream(&mut self) -> Result<(), ProtocolError> {
        let result = self.feed.subscribe_balance().await;
        self.ctx.balance_resubscribe_at = self.retry_at(&result);
        match result {
            Ok(id) => {
                tracing::info!(subscription = %id, "Subscribed to balance");
                self.ctx.balance_subscription = Some(id);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "Balance subscription failed, will retry");
                self.ctx.balance_subscription = None;
                Ok(())
            }
        }
    }

    /// When to try a failed subscription again
    fn retry_at<T>(&self, result: &Result<T, ProtocolError>) -> Option<Instant> {
        match result {
            Err(e) if !e.is_fatal() => {
                let delay = e
                    .retry_after(&self.retry)
                    .unwrap_or(self.retry.rate_limit_delay);
                Some(Instant::now() + delay)
            }
            _ => None,
        }
    }

    /// Report a progressive stake over the position limit, once until a trade passes
    fn report_stake_blocked(&mut self, reason: &DenialReason) {
        if self.ctx.stake_blocked {
            return;
        }
        self.ctx.stake_blocked = true;
        tracing::warn!(
            stake = %self.risk.current_stake(),
            reason = %reason.message(),
            "Progressive stake exceeds the position limit"
        );
        self.notifier.notify(
            NotifyEvent::StakeBlocked,
            json!({
                "code": reason.code(),
                "message": reason.message(),
                "stake": self.risk.current_stake().to_string(),
            }),
        );
    }

    fn halt(&mut self, reason: DenialReason) {
        if self.ctx.halted.is_some() {
            return;
        }
        tracing::error!(code = reason.code(), reason = %reason.message(), "Trading halted");
        self.notifier.notify(
            NotifyEvent::RiskHalt,
            json!({ "code": reason.code(), "message": reason.message() }),
        );
        self.ctx.halted = Some(reason);
    }

    /// Lift a halt whose condition has cleared (e.g. a new trading day)
    fn try_resume(&mut self) {
        if self.risk.check_halt(self.ctx.balance, today()).is_none() {
            if let Some(previous) = self.ctx.halted.take() {
                tracing::info!(code = previous.code(), "Trading resumed");
                self.notifier.notify(
                    NotifyEvent::RiskResumed,
                    json!({ "code": previous.code() }),
                );
            }
        }
    }

    fn set_phase(&mut self, symbol: &str, phase: Phase) {
        if let Some(inst) = self.ctx.instruments.get_mut(symbol) {
            inst.phase = phase;
        }
    }

    fn contract_timeout(&self) -> Duration {
        Duration::from_secs(self.config.contract_timeout_secs.max(1))
    }

    fn restore_state(&mut self) {
        match self.store.load() {
            Ok(Some(state)) => {
                self.risk.restore_stake(state.current_stake);
                self.ctx.totals.total = state.total_trades;
                self.ctx.totals.wins = state.wins;
                self.ctx.totals.losses = state.losses;
                if state.analyzer == self.analyzer.name()
                    && !state.analyzer_weights.is_empty()
                    && state.analyzer_weights != self.analyzer_weights
                {
                    tracing::info!(analyzer = %state.analyzer, "Configured weights differ from saved weights");
                }
                tracing::info!(
                    stake = %self.risk.current_stake(),
                    trades = state.total_trades,
                    saved_at = %state.saved_at,
                    "Strategy state restored"
                );
            }
            Ok(None) => tracing::info!("No saved strategy state, using defaults"),
            Err(e) => tracing::warn!(error = %e, "Could not load strategy state, using defaults"),
        }
    }

    fn save_state(&self) {
        let state = StrategyState {
            current_stake: self.risk.current_stake(),
            analyzer: self.analyzer.name().to_string(),
            analyzer_weights: self.analyzer_weights.clone(),
            total_trades: self.ctx.totals.total,
            wins: self.ctx.totals.wins,
            losses: self.ctx.totals.losses,
            saved_at: Utc::now(),
        };
        if let Err(e) = self.store.save(&state) {
            tracing::warn!(error = %e, "Could not save strategy state");
        }
    }

    fn publish_gauges(&self) {
        let risk = self.risk.state();
        telemetry::set_gauge(GaugeMetric::Balance, to_f64(self.ctx.balance));
        telemetry::set_gauge(GaugeMetric::DailyLoss, to_f64(risk.daily_loss));
        telemetry::set_gauge(GaugeMetric::DrawdownPct, to_f64(self.risk.current_drawdown()));
        telemetry::set_gauge(GaugeMetric::ConsecutiveLosses, f64::from(risk.consecutive_losses));
        telemetry::set_gauge(GaugeMetric::ActiveTrades, risk.active_trade_count as f64);
        telemetry::set_gauge(GaugeMetric::CurrentStake, to_f64(self.risk.current_stake()));
        telemetry::set_gauge(
            GaugeMetric::SuspendedInstruments,
            self.ctx.suspended_count() as f64,
        );
    }
}
