//! Protocol failure taxonomy

use crate::ws::WsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error body returned by the venue: `{"error": {"code", "message"}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Error codes that mean the credentials themselves are bad
const AUTH_CODES: &[&str] = &["InvalidToken", "AuthorizationRequired", "InvalidAppID"];

/// Error codes for throttling
const RATE_LIMIT_CODES: &[&str] = &["RateLimit", "TooManyRequests"];

/// Error codes for a venue that is up but not trading
const UNAVAILABLE_CODES: &[&str] = &["MarketIsClosed", "ServiceUnavailable", "TradingDisabled"];

/// Protocol client errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// Credentials rejected; fatal
    #[error("Authorization failed ({code}): {message}")]
    Auth { code: String, message: String },
    /// Throttled by the venue
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Venue closed or temporarily unavailable
    #[error("Venue unavailable ({code}): {message}")]
    VenueUnavailable { code: String, message: String },
    /// Request rejected as invalid; retrying the same request will not help
    #[error("Request rejected ({code}): {message}")]
    Validation { code: String, message: String },
    /// No response within the configured timeout
    #[error("Request {req_id} timed out after {timeout:?}")]
    RequestTimeout { req_id: u64, timeout: Duration },
    /// Channel closed while the request was pending
    #[error("Connection lost")]
    ConnectionLost,
    /// No session is open
    #[error("Not connected")]
    NotConnected,
    /// Session could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Reconnection gave up
    #[error("Gave up after {0} reconnect attempts")]
    MaxReconnectsExceeded(u32),
    /// Response could not be interpreted
    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Errors that must stop the bot
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Auth { .. } | ProtocolError::MaxReconnectsExceeded(_)
        )
    }

    /// Errors caused by the connection going away
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionLost
                | ProtocolError::NotConnected
                | ProtocolError::ConnectionFailed(_)
        )
    }

    /// How long to wait before retrying the same logical operation, if at all
    pub fn retry_after(&self, policy: &RetryPolicy) -> Option<Duration> {
        match self {
            ProtocolError::RateLimited(_) => Some(policy.rate_limit_delay),
            ProtocolError::VenueUnavailable { .. } => Some(policy.unavailable_delay),
            _ => None,
        }
    }

    /// Stable machine code for logs and notifications
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Auth { .. } => "AUTH_ERROR",
            ProtocolError::RateLimited(_) => "RATE_LIMITED",
            ProtocolError::VenueUnavailable { .. } => "VENUE_UNAVAILABLE",
            ProtocolError::Validation { .. } => "VALIDATION_ERROR",
            ProtocolError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            ProtocolError::ConnectionLost => "CONNECTION_LOST",
            ProtocolError::NotConnected => "NOT_CONNECTED",
            ProtocolError::ConnectionFailed(_) => "CONNECTION_FAILED",
            ProtocolError::MaxReconnectsExceeded(_) => "MAX_RECONNECTS",
            ProtocolError::Malformed(_) => "MALFORMED",
        }
    }
}

impl From<ApiError> for ProtocolError {
    fn from(err: ApiError) -> Self {
        let code = err.code.as_str();
        if AUTH_CODES.contains(&code) {
            ProtocolError::Auth {
                code: err.code,
                message: err.message,
            }
        } else if RATE_LIMIT_CODES.contains(&code) {
            ProtocolError::RateLimited(err.message)
        } else if UNAVAILABLE_CODES.contains(&code) {
            ProtocolError::VenueUnavailable {
                code: err.code,
                message: err.message,
            }
        } else {
            ProtocolError::Validation {
                code: err.code,
                message: err.message,
            }
        }
    }
}

impl From<WsError> for ProtocolError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::ChannelClosed => ProtocolError::ConnectionLost,
            other => ProtocolError::ConnectionFailed(other.to_string()),
        }
    }
}

/// Delays applied to retryable venue errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay after a rate-limit rejection
    pub rate_limit_delay: Duration,
    /// Long delay while the venue is closed/unavailable
    pub unavailable_delay: Duration,
    /// Retries of the same request before giving up
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_secs(5),
            unavailable_delay: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}
