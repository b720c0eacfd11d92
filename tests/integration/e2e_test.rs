//! End-to-end integration tests

use digit_trader::analyzer::{create_analyzer, AnalyzerConfig, SignalCode};
use digit_trader::config::{Config, ExecutionMode};
use digit_trader::feed::History;
use digit_trader::protocol::Backoff;
use digit_trader::risk::{
    DenialReason, RiskDecision, RiskLimits, RiskManager, StakingConfig, StakingKind,
};
use rust_decimal_macros::dec;
use std::time::Duration;
use uuid::Uuid;

fn scenario_config() -> AnalyzerConfig {
    AnalyzerConfig {
        min_history_length: 8,
        min_streak: 6,
        max_repetition_rate: 0.2,
        min_confidence: 0.45,
        ..Default::default()
    }
}

#[test]
fn test_config_example_loads() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.trading.symbols, vec!["R_100".to_string()]);
    assert_eq!(config.execution.mode, ExecutionMode::Paper);
    assert_eq!(config.staking.policy, StakingKind::Martingale);
    assert_eq!(config.telemetry.metrics_port, Some(9090));
}

#[test]
fn test_digit_scenario_trades_tail_digit() {
    let analyzer = create_analyzer(&scenario_config());
    let signal = analyzer.analyze(&History::from_digits(100, [7, 3, 3, 2, 9, 2, 9, 2]));

    assert!(signal.should_trade, "{}", signal.reason);
    assert_eq!(signal.code, SignalCode::Trade);
    assert_eq!(signal.target, 2);
    assert!(signal.confidence >= 0.45 && signal.confidence <= 1.0);
}

#[test]
fn test_digit_scenario_repeating_tail_skips() {
    let analyzer = create_analyzer(&scenario_config());
    let signal = analyzer.analyze(&History::from_digits(100, [7, 3, 3, 2, 9, 2, 9, 9]));
    assert!(!signal.should_trade);

    let lenient = create_analyzer(&AnalyzerConfig {
        min_history_length: 8,
        min_confidence: 0.0,
        max_repetition_rate: 1.0,
        min_streak: 1,
        ..Default::default()
    });
    let signal = lenient.analyze(&History::from_digits(100, [7, 3, 3, 2, 9, 2, 9, 9]));
    assert_eq!(signal.code, SignalCode::CurrentlyRepeating);
}

#[test]
fn test_short_history_never_trades() {
    let analyzer = create_analyzer(&scenario_config());
    let signal = analyzer.analyze(&History::from_digits(100, [3, 2, 9, 2, 9, 2, 9]));
    assert!(!signal.should_trade);
    assert_eq!(signal.code, SignalCode::InsufficientHistory);
}

#[test]
fn test_martingale_through_settlements() {
    let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut risk = RiskManager::new(
        RiskLimits {
            daily_loss_limit: dec!(1000),
            max_drawdown_pct: dec!(1),
            stop_after_consecutive_losses: 0,
            position_size_pct: dec!(1),
            max_stake: dec!(100),
            ..Default::default()
        },
        StakingConfig {
            policy: StakingKind::Martingale,
            base_stake: dec!(10),
            loss_multiplier: dec!(2),
            ..Default::default()
        },
        dec!(10000),
        today,
    );

    let mut stakes = vec![risk.current_stake()];
    let mut balance = dec!(10000);
    for _ in 0..4 {
        risk.register_open();
        let stake = risk.current_stake();
        balance -= stake;
        risk.record_settlement(Uuid::new_v4(), false, -stake, balance, today);
        stakes.push(risk.current_stake());
    }
    assert_eq!(stakes, vec![dec!(10), dec!(20), dec!(40), dec!(80), dec!(80)]);

    risk.register_open();
    risk.record_settlement(Uuid::new_v4(), true, dec!(7.6), balance + dec!(87.6), today);
    assert_eq!(risk.current_stake(), dec!(10));
}

#[test]
fn test_daily_loss_limit_denies_first_and_resets_next_day() {
    let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut risk = RiskManager::new(
        RiskLimits {
            daily_loss_limit: dec!(20),
            ..Default::default()
        },
        StakingConfig::default(),
        dec!(1000),
        today,
    );
    risk.register_open();
    risk.record_settlement(Uuid::new_v4(), false, dec!(-25), dec!(975), today);

    match risk.can_trade(dec!(975), dec!(1), today) {
        RiskDecision::Deny(reason @ DenialReason::DailyLossLimit { .. }) => {
            assert_eq!(reason.code(), "DAILY_LOSS_LIMIT");
            assert!(reason.is_hard_stop());
        }
        other => panic!("unexpected decision {:?}", other),
    }

    let tomorrow = today.succ_opt().unwrap();
    assert!(risk.can_trade(dec!(975), dec!(1), tomorrow).is_allowed());
    assert_eq!(risk.state().daily_loss, dec!(0));
    assert_eq!(risk.state().last_reset_date, tomorrow);
}

#[test]
fn test_reconnect_backoff_schedule() {
    let mut backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(30_000), 7);
    let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
        .map(|d| d.as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    assert!(backoff.is_exhausted());
}
