//! Venue protocol client
//!
//! JSON request/response correlation, subscription dispatch, and reconnection
//! on top of a single [`crate::ws`] session.

mod backoff;
mod client;
mod dispatch;
mod error;
mod pending;
mod types;

pub use backoff::Backoff;
pub use client::ProtocolClient;
pub use dispatch::{route, Routed, SubscriptionRegistry};
pub use error::{ApiError, ProtocolError, RetryPolicy};
pub use pending::{PendingRequest, PendingRequests, SubscribeIntent};
pub use types::{
    buy_request, decimal_value, parse_account, parse_balance, parse_buy_receipt, parse_candle,
    parse_contract_update, parse_history, parse_tick, AccountSnapshot, Candle, ClientEvent,
    Envelope, ProtocolConfig, Subscription, SubscriptionId, SubscriptionKind,
};
