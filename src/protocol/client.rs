//! Correlated request/response client over one WebSocket session

use super::backoff::Backoff;
use super::dispatch::{route, Routed, SubscriptionRegistry};
use super::error::ProtocolError;
use super::pending::{PendingRequest, PendingRequests, SubscribeIntent};
use super::types::{
    buy_request, parse_account, parse_balance, parse_buy_receipt, parse_contract_update,
    parse_history, AccountSnapshot, ClientEvent, Envelope, ProtocolConfig, Subscription,
    SubscriptionId, SubscriptionKind,
};
use crate::execution::{BuyOrder, BuyReceipt, ContractTracking, ExecutionEngine};
use crate::feed::{Tick, TickFeed};
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use crate::ws::{WsClient, WsMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Session-scoped state guarded by one lock
#[derive(Debug, Default)]
struct ClientState {
    pending: PendingRequests,
    subscriptions: SubscriptionRegistry,
    /// Frame sender of the live session
    outbound: Option<mpsc::Sender<String>>,
    /// Incremented for every opened session
    session: u64,
    /// Set by [`ProtocolClient::close`] so the resulting close is not reported
    closing: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ClientState>,
    next_req_id: AtomicU64,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Shared {
    fn dispatch(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unparseable frame");
                telemetry::increment(CounterMetric::DroppedMessages);
                return;
            }
        };

        let routed = {
            let mut state = self.state.lock();
            let state = &mut *state;
            route(envelope, &mut state.pending, &mut state.subscriptions)
        };

        match routed {
            Routed::Event(event) => {
                if self.events.send(event).is_err() {
                    tracing::debug!("Event receiver dropped");
                }
            }
            Routed::Response { req_id } => {
                tracing::trace!(req_id, "Resolved request");
            }
            Routed::Dropped => telemetry::increment(CounterMetric::DroppedMessages),
        }
    }

    /// Tear down after the session's frame stream ended
    fn end_session(&self, session: u64, reason: Option<String>) {
        let (rejected, report) = {
            let mut state = self.state.lock();
            if state.session != session {
                return;
            }
            let report = !state.closing && reason.is_some();
            state.outbound = None;
            state.subscriptions.clear();
            (state.pending.reject_all(ProtocolError::ConnectionLost), report)
        };

        telemetry::set_gauge(GaugeMetric::PendingRequests, 0.0);
        match reason {
            Some(reason) if report => {
                tracing::warn!(session, rejected, reason = %reason, "Session lost");
                let _ = self.events.send(ClientEvent::Disconnected { reason });
            }
            _ => tracing::info!(session, rejected, "Session closed"),
        }
    }
}

/// Removes a request from the correlation map if its caller stops waiting
struct PendingGuard<'a> {
    shared: &'a Shared,
    req_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.state.lock().pending.remove(self.req_id);
    }
}

/// Venue protocol client
///
/// One background task per session is the only reader of the socket. It
/// completes pending requests through `oneshot` channels and forwards
/// subscription messages to the event receiver handed out by [`new`].
///
/// [`new`]: ProtocolClient::new
pub struct ProtocolClient {
    config: ProtocolConfig,
    ws: WsClient,
    shared: Arc<Shared>,
    backoff: Mutex<Backoff>,
    account: Mutex<Option<AccountSnapshot>>,
}

impl ProtocolClient {
    /// Create a disconnected client and the receiver of its unsolicited events
    pub fn new(config: ProtocolConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let ws = WsClient::new(config.ws.clone());
        let backoff = Backoff::new(
            config.reconnect_base,
            config.reconnect_cap,
            config.max_reconnect_attempts,
        );

        let client = Self {
            config,
            ws,
            shared: Arc::new(Shared {
                state: Mutex::new(ClientState::default()),
                next_req_id: AtomicU64::new(1),
                events,
            }),
            backoff: Mutex::new(backoff),
            account: Mutex::new(None),
        };
        (client, events_rx)
    }

    /// Sender feeding the same event receiver (used by simulated execution)
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.shared.events.clone()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().outbound.is_some()
    }

    /// Account reported by the last successful authorization
    pub fn account(&self) -> Option<AccountSnapshot> {
        self.account.lock().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.state.lock().subscriptions.snapshot()
    }

    /// Open a session and authorize it
    ///
    /// Resolves only after authorization succeeds (or immediately after the
    /// handshake when no token is configured).
    pub async fn connect(&self) -> Result<Option<AccountSnapshot>, ProtocolError> {
        let (frames, outbound) = self.ws.open().await?;

        let session = {
            let mut state = self.shared.state.lock();
            if state.outbound.is_some() {
                state.pending.reject_all(ProtocolError::ConnectionLost);
            }
            state.session += 1;
            state.closing = false;
            state.outbound = Some(outbound);
            state.subscriptions.clear();
            state.session
        };

        tokio::spawn(read_session(Arc::clone(&self.shared), session, frames));
        tokio::spawn(heartbeat(
            Arc::downgrade(&self.shared),
            session,
            self.config.heartbeat_interval,
        ));

        if self.config.token.is_none() {
            self.backoff.lock().reset();
            tracing::info!(session, "Connected without authorization");
            return Ok(None);
        }

        match self.authorize().await {
            Ok(account) => {
                self.backoff.lock().reset();
                tracing::info!(
                    session,
                    loginid = %account.loginid,
                    balance = %account.balance,
                    currency = %account.currency,
                    "Authorized"
                );
                *self.account.lock() = Some(account.clone());
                Ok(Some(account))
            }
            Err(e) => {
                tracing::error!(session, error = %e, "Authorization failed");
                self.drop_session(session);
                Err(e)
            }
        }
    }

    /// Close the session without reporting a disconnect
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closing = true;
        state.outbound = None;
    }

    fn drop_session(&self, session: u64) {
        let mut state = self.shared.state.lock();
        if state.session == session {
            state.closing = true;
            state.outbound = None;
        }
    }

    /// Reopen the session with capped exponential backoff
    ///
    /// Stops immediately on a fatal error. Subscriptions are not restored.
    pub async fn reconnect(&self) -> Result<Option<AccountSnapshot>, ProtocolError> {
        loop {
            let next = self.backoff.lock().next_delay();
            let Some(delay) = next else {
                return Err(ProtocolError::MaxReconnectsExceeded(
                    self.config.max_reconnect_attempts,
                ));
            };
            let attempt = self.backoff.lock().attempts();

            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            telemetry::increment(CounterMetric::Reconnects);
            tokio::time::sleep(delay).await;

            match self.connect().await {
                Ok(account) => return Ok(account),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(attempt, error = %e, "Reconnect attempt failed"),
            }
        }
    }

    /// Send an arbitrary request and wait for its response
    pub async fn request(&self, payload: Value) -> Result<Value, ProtocolError> {
        self.call("request", payload, None).await
    }

    /// Send a request, retrying throttled or unavailable responses
    pub async fn request_with_retry(&self, payload: Value) -> Result<Value, ProtocolError> {
        self.call_with_retry("request", payload, None).await
    }

    /// `call`, repeated after the policy delay while the venue throttles or is unavailable
    async fn call_with_retry(
        &self,
        method: &'static str,
        payload: Value,
        subscribe: Option<SubscribeIntent>,
    ) -> Result<Value, ProtocolError> {
        let mut retries = 0;
        loop {
            match self.call(method, payload.clone(), subscribe.clone()).await {
                Err(e) => match e.retry_after(&self.config.retry) {
                    Some(delay) if retries < self.config.retry.max_retries => {
                        retries += 1;
                        tracing::warn!(
                            method,
                            error = %e,
                            retry = retries,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(e),
                },
                ok => return ok,
            }
        }
    }

    /// Subscribe and register the stream the acknowledgement names
    pub async fn subscribe(
        &self,
        kind: SubscriptionKind,
        target: impl Into<String>,
        payload: Value,
    ) -> Result<SubscriptionId, ProtocolError> {
        let (id, _ack) = self.subscribe_with_ack(kind, target.into(), payload).await?;
        Ok(id)
    }

    async fn subscribe_with_ack(
        &self,
        kind: SubscriptionKind,
        target: String,
        payload: Value,
    ) -> Result<(SubscriptionId, Value), ProtocolError> {
        let ack = self
            .call_with_retry("subscribe", payload, Some(SubscribeIntent { kind, target }))
            .await?;
        let id = subscription_id(&ack).ok_or_else(|| {
            ProtocolError::Malformed("subscription acknowledgement without an id".into())
        })?;
        Ok((id, ack))
    }

    /// Authorize the current session with the configured token
    pub async fn authorize(&self) -> Result<AccountSnapshot, ProtocolError> {
        let token = self.config.token.clone().unwrap_or_default();
        let body = self
            .call("authorize", json!({ "authorize": token }), None)
            .await?;
        parse_account(&body)
    }

    /// Latest `count` ticks of a symbol
    pub async fn ticks_history(&self, symbol: &str, count: usize) -> Result<Vec<Tick>, ProtocolError> {
        let body = self
            .call_with_retry(
                "ticks_history",
                json!({
                    "ticks_history": symbol,
                    "count": count,
                    "end": "latest",
                    "style": "ticks",
                }),
                None,
            )
            .await?;
        parse_history(symbol, &body)
    }

    /// Start the tick stream of a symbol
    pub async fn subscribe_ticks(&self, symbol: &str) -> Result<SubscriptionId, ProtocolError> {
        self.subscribe(
            SubscriptionKind::Tick,
            symbol,
            json!({ "ticks": symbol, "subscribe": 1 }),
        )
        .await
    }

    /// Stream balance changes
    pub async fn subscribe_balance(&self) -> Result<SubscriptionId, ProtocolError> {
        self.subscribe(
            SubscriptionKind::Balance,
            "account",
            json!({ "balance": 1, "subscribe": 1 }),
        )
        .await
    }

    /// Buy one contract; never retried
    pub async fn buy(&self, order: &BuyOrder) -> Result<BuyReceipt, ProtocolError> {
        let body = self.call("buy", buy_request(order), None).await?;
        parse_buy_receipt(&body)
    }

    /// Follow a contract until it is sold
    ///
    /// The acknowledgement's own state is returned as the snapshot. A contract
    /// that already closed is acknowledged without a stream.
    pub async fn track_contract(&self, contract_id: u64) -> Result<ContractTracking, ProtocolError> {
        let ack = self
            .call(
                "proposal_open_contract",
                json!({
                    "proposal_open_contract": 1,
                    "contract_id": contract_id,
                    "subscribe": 1,
                }),
                Some(SubscribeIntent {
                    kind: SubscriptionKind::Contract,
                    target: contract_id.to_string(),
                }),
            )
            .await?;

        Ok(ContractTracking {
            subscription: subscription_id(&ack),
            snapshot: parse_contract_update(&ack)?,
        })
    }

    /// Stop a stream
    pub async fn forget(&self, subscription: &str) -> Result<(), ProtocolError> {
        self.shared.state.lock().subscriptions.remove(subscription);
        self.call("forget", json!({ "forget": subscription }), None)
            .await?;
        Ok(())
    }

    /// Current account balance
    pub async fn balance(&self) -> Result<(Decimal, String), ProtocolError> {
        let body = self.call("balance", json!({ "balance": 1 }), None).await?;
        parse_balance(&body)
    }

    async fn call(
        &self,
        method: &'static str,
        mut payload: Value,
        subscribe: Option<SubscribeIntent>,
    ) -> Result<Value, ProtocolError> {
        let fields = payload
            .as_object_mut()
            .ok_or_else(|| ProtocolError::Malformed("request payload must be an object".into()))?;
        let req_id = self.shared.next_req_id.fetch_add(1, Ordering::Relaxed);
        fields.insert("req_id".to_string(), json!(req_id));

        let (tx, rx) = oneshot::channel();
        let outbound = {
            let mut state = self.shared.state.lock();
            let outbound = state.outbound.clone().ok_or(ProtocolError::NotConnected)?;
            state
                .pending
                .insert(PendingRequest::new(req_id, tx, subscribe));
            telemetry::set_gauge(GaugeMetric::PendingRequests, state.pending.len() as f64);
            outbound
        };
        let _guard = PendingGuard {
            shared: &self.shared,
            req_id,
        };

        tracing::debug!(req_id, method, "Sending request");
        let started = Instant::now();
        outbound
            .send(payload.to_string())
            .await
            .map_err(|_| ProtocolError::ConnectionLost)?;

        let result = match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::ConnectionLost),
            Err(_) => Err(ProtocolError::RequestTimeout {
                req_id,
                timeout: self.config.request_timeout,
            }),
        };

        telemetry::record_latency(LatencyMetric::Request, started.elapsed());
        if let Err(e) = &result {
            tracing::debug!(req_id, method, error = %e, "Request failed");
            telemetry::increment_with_reason(CounterMetric::RequestErrors, e.code());
        }
        result
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn subscription_id(body: &Value) -> Option<SubscriptionId> {
    body.get("subscription")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn read_session(shared: Arc<Shared>, session: u64, mut frames: mpsc::Receiver<WsMessage>) {
    while let Some(frame) = frames.recv().await {
        match frame {
            WsMessage::Text(text) => shared.dispatch(&text),
            WsMessage::Binary(data) => {
                tracing::debug!(len = data.len(), "Ignoring binary frame");
            }
            WsMessage::Closed => {
                shared.end_session(session, None);
                return;
            }
            WsMessage::Disconnected { reason } => {
                shared.end_session(session, Some(reason));
                return;
            }
        }
    }
    shared.end_session(session, Some("frame stream ended".to_string()));
}

/// Application-level keepalive; stops with its session
async fn heartbeat(shared: Weak<Shared>, session: u64, every: Duration) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let outbound = {
            let state = shared.state.lock();
            match (&state.outbound, state.session == session) {
                (Some(tx), true) => tx.clone(),
                _ => return,
            }
        };
        if outbound.send(json!({ "ping": 1 }).to_string()).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl TickFeed for ProtocolClient {
    async fn subscribe_ticks(&self, symbol: &str) -> Result<SubscriptionId, ProtocolError> {
        ProtocolClient::subscribe_ticks(self, symbol).await
    }

    async fn subscribe_balance(&self) -> Result<SubscriptionId, ProtocolError> {
        ProtocolClient::subscribe_balance(self).await
    }

    async fn tick_history(&self, symbol: &str, count: usize) -> Result<Vec<Tick>, ProtocolError> {
        self.ticks_history(symbol, count).await
    }

    async fn reconnect(&self) -> Result<Option<AccountSnapshot>, ProtocolError> {
        ProtocolClient::reconnect(self).await
    }
}

#[async_trait]
impl ExecutionEngine for ProtocolClient {
    async fn buy(&self, order: &BuyOrder) -> Result<BuyReceipt, ProtocolError> {
        ProtocolClient::buy(self, order).await
    }

    async fn track_contract(&self, contract_id: u64) -> Result<ContractTracking, ProtocolError> {
        ProtocolClient::track_contract(self, contract_id).await
    }

    async fn forget(&self, subscription: &str) -> Result<(), ProtocolError> {
        ProtocolClient::forget(self, subscription).await
    }

    fn mode_name(&self) -> &'static str {
        "live"
    }
}
