//! Operator notifications
//!
//! Fire-and-forget: a failing notifier never blocks trading.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

/// Notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyEvent {
    TradePlaced,
    TradeSettled,
    TradeFailed,
    RiskHalt,
    RiskResumed,
    StakeBlocked,
    FatalError,
}

impl NotifyEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyEvent::TradePlaced => "trade_placed",
            NotifyEvent::TradeSettled => "trade_settled",
            NotifyEvent::TradeFailed => "trade_failed",
            NotifyEvent::RiskHalt => "risk_halt",
            NotifyEvent::RiskResumed => "risk_resumed",
            NotifyEvent::StakeBlocked => "stake_blocked",
            NotifyEvent::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for notification sinks
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotifyEvent, payload: Value);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotifyEvent, payload: Value) {
        match event {
            NotifyEvent::RiskHalt
            | NotifyEvent::StakeBlocked
            | NotifyEvent::FatalError
            | NotifyEvent::TradeFailed => {
                tracing::warn!(event = %event, payload = %payload, "Notification")
            }
            _ => tracing::info!(event = %event, payload = %payload, "Notification"),
        }
    }
}

/// Forwards notifications to a channel (bridges to external senders)
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(NotifyEvent, Value)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(NotifyEvent, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: NotifyEvent, payload: Value) {
        if self.tx.send((event, payload)).is_err() {
            tracing::debug!(event = %event, "Notification receiver dropped");
        }
    }
}
