//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Request sent to response received
    Request,
    /// One analyzer pass
    Analysis,
    /// Buy sent to contract settled
    TradeLifetime,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Account balance
    Balance,
    /// Loss accumulated today
    DailyLoss,
    /// Drawdown from the balance high-water mark
    DrawdownPct,
    /// Losses in a row
    ConsecutiveLosses,
    /// Trades holding a risk slot
    ActiveTrades,
    /// Stake the staking policy would use next
    CurrentStake,
    /// Instruments in cooldown or suspension
    SuspendedInstruments,
    /// Requests awaiting a response
    PendingRequests,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    TicksReceived,
    SignalsGenerated,
    TradesPlaced,
    TradesWon,
    TradesLost,
    TradesFailed,
    RiskDenials,
    Reconnects,
    RequestErrors,
    DroppedMessages,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::Request => "digit_trader_request_latency_ms",
            LatencyMetric::Analysis => "digit_trader_analysis_latency_ms",
            LatencyMetric::TradeLifetime => "digit_trader_trade_lifetime_ms",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Balance => "digit_trader_balance",
            GaugeMetric::DailyLoss => "digit_trader_daily_loss",
            GaugeMetric::DrawdownPct => "digit_trader_drawdown_pct",
            GaugeMetric::ConsecutiveLosses => "digit_trader_consecutive_losses",
            GaugeMetric::ActiveTrades => "digit_trader_active_trades",
            GaugeMetric::CurrentStake => "digit_trader_current_stake",
            GaugeMetric::SuspendedInstruments => "digit_trader_suspended_instruments",
            GaugeMetric::PendingRequests => "digit_trader_pending_requests",
        }
    }
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::TicksReceived => "digit_trader_ticks_total",
            CounterMetric::SignalsGenerated => "digit_trader_signals_total",
            CounterMetric::TradesPlaced => "digit_trader_trades_placed_total",
            CounterMetric::TradesWon => "digit_trader_trades_won_total",
            CounterMetric::TradesLost => "digit_trader_trades_lost_total",
            CounterMetric::TradesFailed => "digit_trader_trades_failed_total",
            CounterMetric::RiskDenials => "digit_trader_risk_denials_total",
            CounterMetric::Reconnects => "digit_trader_reconnects_total",
            CounterMetric::RequestErrors => "digit_trader_request_errors_total",
            CounterMetric::DroppedMessages => "digit_trader_dropped_messages_total",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Bump a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

/// Bump a counter labelled with a reason code
pub fn increment_with_reason(metric: CounterMetric, reason: &'static str) {
    metrics::counter!(metric.name(), "reason" => reason).increment(1);
}

/// Install the Prometheus recorder and its HTTP scrape endpoint
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(%addr, "Metrics endpoint listening");
    Ok(())
}
