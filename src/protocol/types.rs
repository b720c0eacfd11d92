//! Wire types for the venue's JSON protocol

use super::error::{ApiError, ProtocolError, RetryPolicy};
use crate::execution::{BuyOrder, BuyReceipt, ContractUpdate};
use crate::feed::{last_digit, Tick};
use crate::ws::WsConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

/// Venue-assigned subscription identifier
pub type SubscriptionId = String;

/// What a subscription streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionKind {
    Tick,
    Contract,
    Balance,
}

/// An acknowledged stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub kind: SubscriptionKind,
    /// Symbol for ticks, contract id for contracts
    pub target: String,
}

/// Account state returned by `authorize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub loginid: String,
    pub balance: Decimal,
    pub currency: String,
}

/// One OHLC candle update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub epoch: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Unsolicited events delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Tick(Tick),
    Contract(ContractUpdate),
    Balance { balance: Decimal, currency: String },
    Candle(Candle),
    /// The session dropped without being asked to
    Disconnected { reason: String },
}

/// Parsed top-level fields of an inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub req_id: Option<u64>,
    pub msg_type: String,
    pub subscription_id: Option<SubscriptionId>,
    pub error: Option<ApiError>,
    pub body: Value,
}

impl Envelope {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let body: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if !body.is_object() {
            return Err(ProtocolError::Malformed("expected a JSON object".into()));
        }

        let req_id = body.get("req_id").and_then(Value::as_u64);
        let msg_type = body
            .get("msg_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let subscription_id = body
            .get("subscription")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let error = match body.get("error") {
            Some(err) => Some(
                serde_json::from_value::<ApiError>(err.clone())
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            req_id,
            msg_type,
            subscription_id,
            error,
            body,
        })
    }

    /// Payload of a correlated response, or its classified error
    pub fn into_result(self) -> Result<Value, ProtocolError> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(self.body),
        }
    }
}

/// Read a decimal from a JSON number or numeric string
pub fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn decimal_field(obj: &Value, key: &str) -> Option<Decimal> {
    obj.get(key).and_then(decimal_value)
}

fn section<'a>(body: &'a Value, key: &str) -> Result<&'a Value, ProtocolError> {
    body.get(key)
        .filter(|v| v.is_object())
        .ok_or_else(|| ProtocolError::Malformed(format!("missing '{}' object", key)))
}

fn malformed(what: &str) -> ProtocolError {
    ProtocolError::Malformed(format!("missing or invalid '{}'", what))
}

/// Parse a `tick` message
pub fn parse_tick(body: &Value) -> Result<Tick, ProtocolError> {
    let tick = section(body, "tick")?;
    let symbol = tick
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("tick.symbol"))?;
    let epoch = tick
        .get("epoch")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("tick.epoch"))?;
    let quote = decimal_field(tick, "quote").ok_or_else(|| malformed("tick.quote"))?;
    let pip_size = tick
        .get("pip_size")
        .and_then(Value::as_u64)
        .map(|p| p as u32)
        .unwrap_or_else(|| quote.scale());

    Ok(Tick::new(symbol, epoch, quote, pip_size))
}

/// Parse a `history` response to `ticks_history`
pub fn parse_history(symbol: &str, body: &Value) -> Result<Vec<Tick>, ProtocolError> {
    let history = section(body, "history")?;
    let prices = history
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("history.prices"))?;
    let times = history
        .get("times")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("history.times"))?;
    let pip_size = body.get("pip_size").and_then(Value::as_u64).map(|p| p as u32);

    prices
        .iter()
        .zip(times.iter())
        .map(|(price, time)| {
            let quote = decimal_value(price).ok_or_else(|| malformed("history.prices[]"))?;
            let epoch = time.as_i64().ok_or_else(|| malformed("history.times[]"))?;
            Ok(Tick::new(
                symbol,
                epoch,
                quote,
                pip_size.unwrap_or_else(|| quote.scale()),
            ))
        })
        .collect()
}

/// Parse an `authorize` response
pub fn parse_account(body: &Value) -> Result<AccountSnapshot, ProtocolError> {
    let auth = section(body, "authorize")?;
    Ok(AccountSnapshot {
        loginid: auth
            .get("loginid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        balance: decimal_field(auth, "balance").ok_or_else(|| malformed("authorize.balance"))?,
        currency: auth
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or("USD")
            .to_string(),
    })
}

/// Parse a `balance` message
pub fn parse_balance(body: &Value) -> Result<(Decimal, String), ProtocolError> {
    let balance = section(body, "balance")?;
    let amount = decimal_field(balance, "balance").ok_or_else(|| malformed("balance.balance"))?;
    let currency = balance
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok((amount, currency))
}

/// Parse a `buy` response
pub fn parse_buy_receipt(body: &Value) -> Result<BuyReceipt, ProtocolError> {
    let buy = section(body, "buy")?;
    Ok(BuyReceipt {
        contract_id: buy
            .get("contract_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed("buy.contract_id"))?,
        buy_price: decimal_field(buy, "buy_price").ok_or_else(|| malformed("buy.buy_price"))?,
        payout: decimal_field(buy, "payout").unwrap_or_default(),
        balance_after: decimal_field(buy, "balance_after")
            .ok_or_else(|| malformed("buy.balance_after"))?,
        transaction_id: buy.get("transaction_id").and_then(Value::as_u64),
    })
}

/// Parse a `proposal_open_contract` message
///
/// Returns `None` for the empty body the venue sends once a stream ends.
pub fn parse_contract_update(body: &Value) -> Result<Option<ContractUpdate>, ProtocolError> {
    let poc = match body.get("proposal_open_contract") {
        Some(v) if v.as_object().is_some_and(|o| !o.is_empty()) => v,
        _ => return Ok(None),
    };

    let contract_id = poc
        .get("contract_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("proposal_open_contract.contract_id"))?;
    let is_sold = match poc.get("is_sold") {
        Some(Value::Bool(b)) => *b,
        Some(v) => v.as_u64().unwrap_or(0) == 1,
        None => false,
    };
    let exit_digit = poc.get("exit_tick").and_then(decimal_value).map(|quote| {
        let pip = poc
            .get("exit_tick_display_value")
            .and_then(Value::as_str)
            .and_then(|s| s.split('.').nth(1))
            .map(|decimals| decimals.len() as u32)
            .unwrap_or_else(|| quote.scale());
        last_digit(quote, pip)
    });

    Ok(Some(ContractUpdate {
        contract_id,
        is_sold,
        profit: decimal_field(poc, "profit").unwrap_or_default(),
        buy_price: decimal_field(poc, "buy_price").unwrap_or_default(),
        sell_price: decimal_field(poc, "sell_price"),
        status: poc.get("status").and_then(Value::as_str).map(str::to_string),
        exit_digit,
    }))
}

/// Parse an `ohlc` message
pub fn parse_candle(body: &Value) -> Result<Candle, ProtocolError> {
    let ohlc = section(body, "ohlc")?;
    Ok(Candle {
        symbol: ohlc
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        epoch: ohlc
            .get("open_time")
            .or_else(|| ohlc.get("epoch"))
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        open: decimal_field(ohlc, "open").ok_or_else(|| malformed("ohlc.open"))?,
        high: decimal_field(ohlc, "high").ok_or_else(|| malformed("ohlc.high"))?,
        low: decimal_field(ohlc, "low").ok_or_else(|| malformed("ohlc.low"))?,
        close: decimal_field(ohlc, "close").ok_or_else(|| malformed("ohlc.close"))?,
    })
}

/// Protocol client configuration
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Venue WebSocket endpoint, including any app id query
    pub url: String,
    /// API token; without one the session is left unauthorized (ticks only)
    pub token: Option<String>,
    pub request_timeout: Duration,
    /// Application-level `ping` cadence
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    /// Reconnect attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    pub retry: RetryPolicy,
    pub ws: WsConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(1000),
            reconnect_cap: Duration::from_millis(30_000),
            max_reconnect_attempts: 10,
            retry: RetryPolicy::default(),
            ws: WsConfig::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            ws: WsConfig::new(url.clone()),
            url,
            ..Default::default()
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = d;
        self
    }

    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Set the reconnect schedule
    pub fn reconnect(mut self, base: Duration, cap: Duration, max_attempts: u32) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Build a `buy` request with a stake basis
pub fn buy_request(order: &BuyOrder) -> Value {
    let amount = order.amount.to_f64().unwrap_or_default();
    json!({
        "buy": 1,
        "price": amount,
        "parameters": {
            "amount": amount,
            "basis": "stake",
            "contract_type": order.contract_type.as_str(),
            "currency": order.currency,
            "duration": order.duration_ticks,
            "duration_unit": "t",
            "symbol": order.symbol,
            "barrier": order.barrier.to_string(),
        }
    })
}
