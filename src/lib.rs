//! digit-trader: Tick-driven trading bot for digit contracts
//!
//! This library provides the core components for:
//! - WebSocket transport with request/response correlation
//! - Subscription dispatch for ticks, contracts, and balance
//! - Digit history analysis and trade signals
//! - Risk limits, stake sizing, and stake progression
//! - Paper/live execution engine
//! - Per-instrument trade lifecycle orchestration
//! - Strategy state persistence and operator notifications
//! - Full observability stack

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod execution;
pub mod feed;
pub mod notify;
pub mod orchestrator;
pub mod protocol;
pub mod risk;
pub mod store;
pub mod telemetry;
pub mod ws;
