//! Integration tests for the trade orchestrator

use async_trait::async_trait;
use digit_trader::analyzer::{create_analyzer, AnalyzerConfig};
use digit_trader::config::TradingConfig;
use digit_trader::execution::{
    BuyOrder, BuyReceipt, ContractTracking, ExecutionEngine, PaperEngine,
};
use digit_trader::feed::{Tick, TickFeed};
use digit_trader::notify::{ChannelNotifier, NotifyEvent};
use digit_trader::orchestrator::{Phase, SingleFlightScope, TradeOrchestrator};
use digit_trader::protocol::{AccountSnapshot, ClientEvent, ProtocolError, SubscriptionId};
use digit_trader::risk::{RiskLimits, RiskManager, StakingConfig, StakingKind};
use digit_trader::store::{JsonFileStore, StrategyState, StrategyStore};
use parking_lot::Mutex;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use std::time::Duration;
use tokio::time::Instant;

const SYMBOL: &str = "R_100";

/// Quote whose last digit at pip size 2 is `digit`
fn tick(symbol: &str, epoch: i64, digit: u8) -> Tick {
    Tick::new(symbol, epoch, Decimal::new(10_000 + i64::from(digit), 2), 2)
}

struct StubFeed {
    backfill: Vec<Tick>,
    subscribed: Mutex<Vec<String>>,
    /// Errors returned by the next tick subscribes, in order
    subscribe_failures: Mutex<VecDeque<ProtocolError>>,
    balance_subscribes: AtomicUsize,
    reconnect: Mutex<Result<Option<AccountSnapshot>, ProtocolError>>,
}

impl StubFeed {
    fn new(backfill: Vec<Tick>, subscribe_failures: Vec<ProtocolError>) -> Self {
        Self {
            backfill,
            subscribed: Mutex::new(Vec::new()),
            subscribe_failures: Mutex::new(subscribe_failures.into()),
            balance_subscribes: AtomicUsize::new(0),
            reconnect: Mutex::new(Ok(None)),
        }
    }
}

#[async_trait]
impl TickFeed for StubFeed {
    async fn subscribe_ticks(&self, symbol: &str) -> Result<SubscriptionId, ProtocolError> {
        let mut subscribed = self.subscribed.lock();
        subscribed.push(symbol.to_string());
        if let Some(err) = self.subscribe_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(format!("sub-{}-{}", symbol, subscribed.len()))
    }

    async fn subscribe_balance(&self) -> Result<SubscriptionId, ProtocolError> {
        let n = self.balance_subscribes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("bal-{}", n))
    }

    async fn tick_history(&self, symbol: &str, count: usize) -> Result<Vec<Tick>, ProtocolError> {
        let ticks: Vec<Tick> = self
            .backfill
            .iter()
            .filter(|t| t.symbol == symbol)
            .cloned()
            .collect();
        let skip = ticks.len().saturating_sub(count);
        Ok(ticks.into_iter().skip(skip).collect())
    }

    async fn reconnect(&self) -> Result<Option<AccountSnapshot>, ProtocolError> {
        self.reconnect.lock().clone()
    }
}

/// Engine whose buy and tracking outcomes are set by the test
struct ScriptedEngine {
    buy_error: Mutex<Option<ProtocolError>>,
    track_ok: AtomicBool,
    forgotten: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    const CONTRACT_ID: u64 = 77;

    fn new() -> Self {
        Self {
            buy_error: Mutex::new(None),
            track_ok: AtomicBool::new(true),
            forgotten: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn buy(&self, order: &BuyOrder) -> Result<BuyReceipt, ProtocolError> {
        if let Some(err) = self.buy_error.lock().clone() {
            return Err(err);
        }
        Ok(BuyReceipt {
            contract_id: Self::CONTRACT_ID,
            buy_price: order.amount,
            payout: order.amount * dec!(2),
            balance_after: dec!(1000) - order.amount,
            transaction_id: None,
        })
    }

    async fn track_contract(&self, contract_id: u64) -> Result<ContractTracking, ProtocolError> {
        if self.track_ok.load(Ordering::SeqCst) {
            Ok(ContractTracking {
                subscription: Some(format!("c-{}", contract_id)),
                snapshot: None,
            })
        } else {
            Err(ProtocolError::ConnectionLost)
        }
    }

    async fn forget(&self, subscription: &str) -> Result<(), ProtocolError> {
        self.forgotten.lock().push(subscription.to_string());
        Ok(())
    }

    fn mode_name(&self) -> &'static str {
        "scripted"
    }
}

struct Setup {
    trading: TradingConfig,
    analyzer: AnalyzerConfig,
    limits: RiskLimits,
    staking: StakingConfig,
    balance: Decimal,
    backfill: Vec<u8>,
    store: Option<Box<dyn StrategyStore>>,
    subscribe_failures: Vec<ProtocolError>,
    balance_stream: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            trading: TradingConfig {
                symbols: vec![SYMBOL.to_string()],
                history_size: 8,
                backfill_count: 8,
                min_wait_ms: 0,
                max_wait_ms: 0,
                ..Default::default()
            },
            // [7, 3, 3, 2, 9, 2, 9] + a live 2 scores ~0.507 on digit 2
            analyzer: AnalyzerConfig {
                min_history_length: 8,
                min_streak: 6,
                max_repetition_rate: 0.2,
                min_confidence: 0.45,
                ..Default::default()
            },
            limits: RiskLimits::default(),
            staking: StakingConfig {
                policy: StakingKind::Martingale,
                base_stake: dec!(10),
                ..Default::default()
            },
            balance: dec!(1000),
            backfill: vec![7, 3, 3, 2, 9, 2, 9],
            store: None,
            subscribe_failures: Vec::new(),
            balance_stream: false,
        }
    }
}

struct Harness {
    orch: TradeOrchestrator,
    feed: Arc<StubFeed>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    notes: mpsc::UnboundedReceiver<(NotifyEvent, Value)>,
    epoch: AtomicI64,
}

impl Harness {
    async fn build(
        setup: Setup,
        engine: impl FnOnce(mpsc::UnboundedSender<ClientEvent>) -> Arc<dyn ExecutionEngine>,
    ) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let backfill = setup
            .backfill
            .iter()
            .enumerate()
            .map(|(i, &d)| tick(SYMBOL, i as i64, d))
            .collect();
        let feed = Arc::new(StubFeed::new(backfill, setup.subscribe_failures));
        let (notifier, notes) = ChannelNotifier::new();
        let risk = RiskManager::new(
            setup.limits,
            setup.staking,
            setup.balance,
            chrono::Local::now().date_naive(),
        );

        let mut orch = TradeOrchestrator::new(
            setup.trading,
            feed.clone(),
            engine(tx),
            create_analyzer(&setup.analyzer),
            risk,
            setup.balance,
        )
        .with_notifier(Arc::new(notifier))
        .with_balance_stream(setup.balance_stream);
        if let Some(store) = setup.store {
            orch = orch.with_store(store);
        }
        orch.start().await.unwrap();

        Self {
            orch,
            feed,
            events,
            notes,
            epoch: AtomicI64::new(1_000),
        }
    }

    async fn paper(setup: Setup, paper_balance: Decimal) -> (Self, Arc<PaperEngine>) {
        let mut paper = None;
        let harness = Self::build(setup, |tx| {
            let engine = Arc::new(PaperEngine::new(paper_balance, dec!(0.095), tx));
            paper = Some(engine.clone());
            engine
        })
        .await;
        (harness, paper.unwrap())
    }

    async fn tick(&mut self, symbol: &str, digit: u8) {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        self.orch
            .handle_event(ClientEvent::Tick(tick(symbol, epoch, digit)))
            .await
            .unwrap();
    }

    /// Feed queued engine events back into the orchestrator
    async fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.orch.handle_event(event).await.unwrap();
        }
    }

    fn notifications(&mut self) -> Vec<NotifyEvent> {
        let mut seen = Vec::new();
        while let Ok((event, _)) = self.notes.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn phase(&self, symbol: &str) -> Phase {
        self.orch.context().instruments[symbol].phase
    }
}

#[tokio::test]
async fn test_backfill_and_subscribe_on_start() {
    let (h, _paper) = Harness::paper(Setup::default(), dec!(1000)).await;
    let inst = &h.orch.context().instruments[SYMBOL];
    assert_eq!(inst.history.to_vec(), vec![7, 3, 3, 2, 9, 2, 9]);
    assert!(inst.subscription.is_some());
    assert_eq!(*h.feed.subscribed.lock(), vec![SYMBOL.to_string()]);
}

#[tokio::test]
async fn test_winning_trade_lifecycle() {
    let (mut h, paper) = Harness::paper(Setup::default(), dec!(1000)).await;

    h.tick(SYMBOL, 2).await;
    assert_eq!(h.orch.context().in_flight_count(), 1);
    assert_eq!(h.phase(SYMBOL), Phase::Open);
    assert_eq!(paper.open_contracts().await, 1);
    assert_eq!(h.orch.context().balance, dec!(990));

    // exit digit 5 differs from the predicted 2
    h.tick(SYMBOL, 5).await;
    h.drain().await;

    let ctx = h.orch.context();
    assert_eq!(ctx.in_flight_count(), 0);
    assert_eq!(ctx.totals.wins, 1);
    assert_eq!(ctx.balance, dec!(1000.95));
    assert_eq!(ctx.balance, paper.balance().await);
    assert_eq!(h.phase(SYMBOL), Phase::Cooldown);
    assert_eq!(h.orch.risk().current_stake(), dec!(10));
    assert_eq!(
        h.notifications(),
        vec![NotifyEvent::TradePlaced, NotifyEvent::TradeSettled]
    );

    h.orch.handle_timer(Instant::now()).await.unwrap();
    assert_eq!(h.phase(SYMBOL), Phase::Idle);
}

#[tokio::test]
async fn test_losing_trade_progresses_stake() {
    let (mut h, _paper) = Harness::paper(Setup::default(), dec!(1000)).await;

    h.tick(SYMBOL, 2).await;
    h.tick(SYMBOL, 2).await;
    h.drain().await;

    let ctx = h.orch.context();
    assert_eq!(ctx.totals.losses, 1);
    assert_eq!(ctx.balance, dec!(990));
    let risk = h.orch.risk().state();
    assert_eq!(risk.consecutive_losses, 1);
    assert_eq!(risk.daily_loss, dec!(10));
    assert_eq!(risk.active_trade_count, 0);
    assert_eq!(h.orch.risk().current_stake(), dec!(20));
}

#[tokio::test]
async fn test_no_trade_while_cooling_down() {
    let mut setup = Setup::default();
    setup.trading.min_wait_ms = 60_000;
    setup.trading.max_wait_ms = 60_000;
    let (mut h, paper) = Harness::paper(setup, dec!(1000)).await;

    h.tick(SYMBOL, 2).await;
    h.tick(SYMBOL, 5).await;
    h.drain().await;
    assert_eq!(h.phase(SYMBOL), Phase::Cooldown);

    for digit in [3, 8, 1, 6] {
        h.tick(SYMBOL, digit).await;
    }
    assert_eq!(h.orch.context().in_flight_count(), 0);
    assert_eq!(paper.open_contracts().await, 0);

    // an early timer does not end the cooldown
    h.orch.handle_timer(Instant::now()).await.unwrap();
    assert_eq!(h.phase(SYMBOL), Phase::Cooldown);
}

#[tokio::test]
async fn test_consecutive_losses_halt_trading() {
    let mut setup = Setup::default();
    setup.limits.stop_after_consecutive_losses = 1;
    let (mut h, _paper) = Harness::paper(setup, dec!(1000)).await;

    h.tick(SYMBOL, 2).await;
    h.tick(SYMBOL, 2).await;
    h.drain().await;

    assert!(h.orch.context().halted.is_some());
    let notes = h.notifications();
    assert!(notes.contains(&NotifyEvent::RiskHalt));

    h.orch.handle_timer(Instant::now()).await.unwrap();
    for digit in [5, 1, 5, 1, 5, 1, 5, 1] {
        h.tick(SYMBOL, digit).await;
    }
    assert_eq!(h.orch.context().totals.total, 1);
    assert!(h.orch.context().halted.is_some());
}

#[tokio::test]
async fn test_failed_buy_releases_without_progression() {
    // the simulated account cannot cover the stake
    let (mut h, _paper) = Harness::paper(Setup::default(), dec!(5)).await;

    h.tick(SYMBOL, 2).await;

    let ctx = h.orch.context();
    assert_eq!(ctx.in_flight_count(), 0);
    assert!(ctx.trades.is_empty());
    assert_eq!(h.phase(SYMBOL), Phase::Idle);
    assert_eq!(h.orch.risk().current_stake(), dec!(10));
    assert_eq!(h.orch.risk().state().active_trade_count, 0);
    assert_eq!(h.notifications(), vec![NotifyEvent::TradeFailed]);
}

#[tokio::test]
async fn test_rate_limited_buy_suspends_instrument() {
    let engine = Arc::new(ScriptedEngine::new());
    *engine.buy_error.lock() = Some(ProtocolError::RateLimited("slow down".into()));
    let scripted = engine.clone();
    let mut h = Harness::build(Setup::default(), move |_| scripted).await;

    h.tick(SYMBOL, 2).await;

    let inst = &h.orch.context().instruments[SYMBOL];
    assert!(inst.is_suspended());
    assert_eq!(inst.phase, Phase::Cooldown);
    assert_eq!(h.orch.context().in_flight_count(), 0);
}

#[tokio::test]
async fn test_duplicate_settlement_ignored() {
    let (mut h, _paper) = Harness::paper(Setup::default(), dec!(1000)).await;

    h.tick(SYMBOL, 2).await;
    h.tick(SYMBOL, 2).await;
    let event = h.events.try_recv().unwrap();
    h.orch.handle_event(event.clone()).await.unwrap();
    h.orch.handle_event(event).await.unwrap();

    assert_eq!(h.orch.context().totals.total, 1);
    assert_eq!(h.orch.risk().state().consecutive_losses, 1);
    assert_eq!(h.orch.risk().current_stake(), dec!(20));
}

#[tokio::test]
async fn test_reconnect_resubscribes_and_retracks() {
    let engine = Arc::new(ScriptedEngine::new());
    engine.track_ok.store(false, Ordering::SeqCst);
    let scripted = engine.clone();
    let setup = Setup {
        balance_stream: true,
        ..Default::default()
    };
    let mut h = Harness::build(setup, move |_| scripted).await;
    assert_eq!(h.feed.balance_subscribes.load(Ordering::SeqCst), 1);
    *h.feed.reconnect.lock() = Ok(Some(AccountSnapshot {
        loginid: "VRTC1".to_string(),
        balance: dec!(750),
        currency: "USD".to_string(),
    }));

    h.tick(SYMBOL, 2).await;
    assert_eq!(h.orch.context().in_flight_count(), 1);

    engine.track_ok.store(true, Ordering::SeqCst);
    h.orch
        .handle_event(ClientEvent::Disconnected {
            reason: "reset".to_string(),
        })
        .await
        .unwrap();

    let ctx = h.orch.context();
    assert_eq!(ctx.balance, dec!(750));
    assert_eq!(h.feed.subscribed.lock().len(), 2);
    assert!(ctx.instruments[SYMBOL].subscription.is_some());
    let trade = ctx.in_flight().next().unwrap();
    assert_eq!(trade.subscription.as_deref(), Some("c-77"));
    assert_eq!(trade.unconfirmed_reconnects, 0);

    assert_eq!(h.feed.balance_subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.balance_subscription.as_deref(), Some("bal-2"));
    assert!(engine.forgotten.lock().is_empty());
}

#[tokio::test]
async fn test_throttled_subscribe_retried_on_timer() {
    let setup = Setup {
        subscribe_failures: vec![ProtocolError::RateLimited("slow down".into())],
        ..Default::default()
    };
    let (mut h, _paper) = Harness::paper(setup, dec!(1000)).await;

    let inst = &h.orch.context().instruments[SYMBOL];
    assert!(inst.subscription.is_none());
    let retry_at = inst.resubscribe_at.unwrap();
    assert_eq!(h.orch.context().next_deadline(), Some(retry_at));

    h.orch.handle_timer(retry_at).await.unwrap();

    let inst = &h.orch.context().instruments[SYMBOL];
    assert_eq!(inst.subscription.as_deref(), Some("sub-R_100-2"));
    assert!(inst.resubscribe_at.is_none());
    assert_eq!(h.feed.subscribed.lock().len(), 2);
    assert!(h.orch.context().next_deadline().is_none());
}

#[tokio::test]
async fn test_unavailable_venue_delays_resubscribe() {
    let setup = Setup {
        subscribe_failures: vec![ProtocolError::VenueUnavailable {
            code: "MarketIsClosed".into(),
            message: "closed".into(),
        }],
        ..Default::default()
    };
    let before = Instant::now();
    let (mut h, _paper) = Harness::paper(setup, dec!(1000)).await;

    // the default long delay is a minute
    let retry_at = h.orch.context().instruments[SYMBOL].resubscribe_at.unwrap();
    assert!(retry_at >= before + Duration::from_secs(60));

    h.orch.handle_timer(before).await.unwrap();
    assert!(h.orch.context().instruments[SYMBOL].subscription.is_none());
    assert_eq!(h.feed.subscribed.lock().len(), 1);
}

#[tokio::test]
async fn test_overdue_recheck_forgets_previous_stream() {
    let engine = Arc::new(ScriptedEngine::new());
    let scripted = engine.clone();
    let mut h = Harness::build(Setup::default(), move |_| scripted).await;

    h.tick(SYMBOL, 2).await;
    let trade = h.orch.context().in_flight().next().unwrap();
    assert_eq!(trade.subscription.as_deref(), Some("c-77"));

    h.orch
        .handle_timer(Instant::now() + Duration::from_secs(3600))
        .await
        .unwrap();

    assert_eq!(*engine.forgotten.lock(), vec!["c-77".to_string()]);
    let trade = h.orch.context().in_flight().next().unwrap();
    assert_eq!(trade.subscription.as_deref(), Some("c-77"));
    assert_eq!(trade.unconfirmed_reconnects, 0);
}

#[tokio::test]
async fn test_timed_out_buy_is_failed() {
    let engine = Arc::new(ScriptedEngine::new());
    *engine.buy_error.lock() = Some(ProtocolError::RequestTimeout {
        req_id: 9,
        timeout: Duration::from_secs(30),
    });
    let scripted = engine.clone();
    let mut h = Harness::build(Setup::default(), move |_| scripted).await;

    h.tick(SYMBOL, 2).await;

    let ctx = h.orch.context();
    assert!(ctx.trades.is_empty());
    assert_eq!(ctx.in_flight_count(), 0);
    assert_eq!(ctx.balance, dec!(1000));
    assert!(!ctx.instruments[SYMBOL].is_suspended());
    assert_eq!(h.phase(SYMBOL), Phase::Idle);
    assert_eq!(h.orch.risk().state().active_trade_count, 0);
    assert_eq!(h.orch.risk().current_stake(), dec!(10));
    assert_eq!(h.notifications(), vec![NotifyEvent::TradeFailed]);
}

#[tokio::test]
async fn test_blocked_progressive_stake_reported_once() {
    let mut setup = Setup::default();
    setup.analyzer = AnalyzerConfig {
        min_history_length: 2,
        min_confidence: 0.0,
        max_repetition_rate: 1.0,
        min_streak: 1,
        ..Default::default()
    };
    // martingale stake 10 against a limit of 5
    setup.limits.position_size_pct = dec!(0.005);
    let (mut h, paper) = Harness::paper(setup, dec!(1000)).await;

    for digit in [1, 2, 1, 2] {
        h.tick(SYMBOL, digit).await;
    }

    assert_eq!(h.orch.context().in_flight_count(), 0);
    assert_eq!(paper.open_contracts().await, 0);
    assert!(h.orch.context().stake_blocked);
    assert_eq!(h.notifications(), vec![NotifyEvent::StakeBlocked]);
}

#[tokio::test]
async fn test_unconfirmed_trade_abandoned_after_limit() {
    let engine = Arc::new(ScriptedEngine::new());
    engine.track_ok.store(false, Ordering::SeqCst);
    let scripted = engine.clone();
    let mut setup = Setup::default();
    setup.trading.max_unconfirmed_reconnects = 1;
    let mut h = Harness::build(setup, move |_| scripted).await;

    h.tick(SYMBOL, 2).await;
    assert_eq!(h.orch.risk().state().active_trade_count, 1);

    let disconnect = || ClientEvent::Disconnected {
        reason: "reset".to_string(),
    };
    h.orch.handle_event(disconnect()).await.unwrap();
    assert_eq!(h.orch.context().in_flight_count(), 1);

    h.orch.handle_event(disconnect()).await.unwrap();
    assert_eq!(h.orch.context().in_flight_count(), 0);
    assert_eq!(h.orch.risk().state().active_trade_count, 0);
    assert_eq!(h.orch.risk().current_stake(), dec!(10));
    assert_eq!(h.phase(SYMBOL), Phase::Idle);
    assert!(h.notifications().contains(&NotifyEvent::TradeFailed));
}

#[tokio::test]
async fn test_fatal_reconnect_ends_with_error() {
    let (mut h, _paper) = Harness::paper(Setup::default(), dec!(1000)).await;
    *h.feed.reconnect.lock() = Err(ProtocolError::MaxReconnectsExceeded(10));

    let result = h
        .orch
        .handle_event(ClientEvent::Disconnected {
            reason: "gone".to_string(),
        })
        .await;

    assert_eq!(result, Err(ProtocolError::MaxReconnectsExceeded(10)));
    assert_eq!(h.notifications(), vec![NotifyEvent::FatalError]);
}

#[tokio::test]
async fn test_state_saved_and_restored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strategy.json");

    let setup = Setup {
        store: Some(Box::new(JsonFileStore::new(&path))),
        ..Default::default()
    };
    let (mut h, _paper) = Harness::paper(setup, dec!(1000)).await;
    h.tick(SYMBOL, 2).await;
    h.tick(SYMBOL, 2).await;
    h.drain().await;

    let saved = JsonFileStore::new(&path).load().unwrap().unwrap();
    assert_eq!(saved.current_stake, dec!(20));
    assert_eq!(saved.losses, 1);
    assert_eq!(saved.analyzer, "repetition");

    JsonFileStore::new(&path)
        .save(&StrategyState {
            current_stake: dec!(40),
            analyzer_weights: BTreeMap::new(),
            total_trades: 9,
            ..saved
        })
        .unwrap();
    let setup = Setup {
        store: Some(Box::new(JsonFileStore::new(&path))),
        ..Default::default()
    };
    let (h, _paper) = Harness::paper(setup, dec!(1000)).await;
    assert_eq!(h.orch.risk().current_stake(), dec!(40));
    assert_eq!(h.orch.context().totals.total, 9);
}

#[tokio::test]
async fn test_run_returns_when_events_end() {
    let (h, _paper) = Harness::paper(Setup::default(), dec!(1000)).await;
    let Harness { mut orch, events, .. } = h;
    let (tx, rx) = mpsc::unbounded_channel();
    drop(events);
    tx.send(ClientEvent::Tick(tick(SYMBOL, 5_000, 2))).unwrap();
    drop(tx);

    orch.run(rx).await.unwrap();
    assert_eq!(orch.context().in_flight_count(), 1);
}

const SYMBOLS: [&str; 3] = ["R_10", "R_25", "R_50"];

fn random_walk_setup(scope: SingleFlightScope) -> Setup {
    Setup {
        trading: TradingConfig {
            symbols: SYMBOLS.iter().map(|s| s.to_string()).collect(),
            single_flight: scope,
            history_size: 16,
            backfill_count: 16,
            min_wait_ms: 0,
            max_wait_ms: 0,
            ..Default::default()
        },
        analyzer: AnalyzerConfig {
            min_history_length: 2,
            min_confidence: 0.0,
            max_repetition_rate: 1.0,
            min_streak: 1,
            ..Default::default()
        },
        limits: RiskLimits {
            max_concurrent_trades: 3,
            daily_loss_limit: dec!(10000),
            max_drawdown_pct: dec!(1),
            stop_after_consecutive_losses: 0,
            ..Default::default()
        },
        staking: StakingConfig::default(),
        backfill: Vec::new(),
        ..Default::default()
    }
}

/// Inject ticks in random order and check the in-flight bound after every step
fn run_random_walk(scope: SingleFlightScope, steps: &[(usize, u8)]) {
    tokio_test::block_on(async {
        let (mut h, _paper) = Harness::paper(random_walk_setup(scope), dec!(1000)).await;
        for &(symbol, digit) in steps {
            h.tick(SYMBOLS[symbol], digit).await;
            h.drain().await;
            h.orch.handle_timer(Instant::now()).await.unwrap();

            let ctx = h.orch.context();
            match scope {
                SingleFlightScope::Global => assert!(ctx.in_flight_count() <= 1),
                SingleFlightScope::PerInstrument => {
                    for s in SYMBOLS {
                        assert!(ctx.in_flight().filter(|t| t.symbol == s).count() <= 1);
                    }
                }
            }
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_global_single_flight(steps in prop::collection::vec((0usize..3, 0u8..10), 1..60)) {
        run_random_walk(SingleFlightScope::Global, &steps);
    }

    #[test]
    fn prop_per_instrument_single_flight(steps in prop::collection::vec((0usize..3, 0u8..10), 1..60)) {
        run_random_walk(SingleFlightScope::PerInstrument, &steps);
    }
}
