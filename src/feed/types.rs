//! Tick and digit history types

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Highest valid digit symbol
pub const MAX_DIGIT: u8 = 9;

/// A single price tick from the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument symbol (e.g., "R_100")
    pub symbol: String,
    /// Venue epoch in seconds
    pub epoch: i64,
    /// Quoted price
    pub quote: Decimal,
    /// Number of decimals the venue quotes this instrument with
    pub pip_size: u32,
}

impl Tick {
    /// Create a new tick
    pub fn new(symbol: impl Into<String>, epoch: i64, quote: Decimal, pip_size: u32) -> Self {
        Self {
            symbol: symbol.into(),
            epoch,
            quote,
            pip_size,
        }
    }

    /// Last significant digit of the quote at the instrument's pip size
    ///
    /// Trailing zeros matter: `1234.50` at pip size 2 yields `0`, not `5`.
    pub fn last_digit(&self) -> u8 {
        last_digit(self.quote, self.pip_size)
    }

    /// Venue timestamp
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.epoch, 0).single()
    }
}

/// Last digit of `quote` when rendered with `pip_size` decimals
pub fn last_digit(quote: Decimal, pip_size: u32) -> u8 {
    let scaled = (quote.abs() * Decimal::from(10u64.pow(pip_size.min(18)))).trunc();
    let digit = scaled % Decimal::TEN;
    u8::try_from(digit.mantissa()).unwrap_or(0) % 10
}

/// Bounded sliding window of digit symbols
///
/// Appending to a full history drops the oldest element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    digits: VecDeque<u8>,
    capacity: usize,
}

impl History {
    /// Create an empty history with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            digits: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a history from raw digits, keeping the newest `capacity`
    pub fn from_digits(capacity: usize, digits: impl IntoIterator<Item = u8>) -> Self {
        let mut history = Self::new(capacity);
        for digit in digits {
            history.push(digit);
        }
        history
    }

    /// Seed a history from a tick backfill
    pub fn from_ticks<'a>(capacity: usize, ticks: impl IntoIterator<Item = &'a Tick>) -> Self {
        Self::from_digits(capacity, ticks.into_iter().map(Tick::last_digit))
    }

    /// Append a symbol, evicting the oldest when full
    pub fn push(&mut self, digit: u8) {
        if self.digits.len() == self.capacity {
            self.digits.pop_front();
        }
        self.digits.push_back(digit);
    }

    /// Append the digit of a tick
    pub fn push_tick(&mut self, tick: &Tick) {
        self.push(tick.last_digit());
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent symbol
    pub fn last(&self) -> Option<u8> {
        self.digits.back().copied()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = u8> + ExactSizeIterator + '_ {
        self.digits.iter().copied()
    }

    /// The newest `n` symbols, oldest first
    pub fn recent(&self, n: usize) -> Vec<u8> {
        let skip = self.digits.len().saturating_sub(n);
        self.digits.iter().skip(skip).copied().collect()
    }

    /// Copy out as a contiguous vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.digits.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }
}
