//! WebSocket transport
//!
//! One session per connection with ping keepalive. The protocol layer
//! above decides when to reconnect.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
