//! Analyzer signal and configuration types

use super::stats::DigitStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why an analyzer did or did not recommend a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCode {
    Trade,
    InsufficientHistory,
    InvalidSymbol,
    LowConfidence,
    RepetitionTooHigh,
    StreakTooShort,
    CurrentlyRepeating,
    InsufficientSamples,
}

impl SignalCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCode::Trade => "TRADE",
            SignalCode::InsufficientHistory => "INSUFFICIENT_HISTORY",
            SignalCode::InvalidSymbol => "INVALID_SYMBOL",
            SignalCode::LowConfidence => "LOW_CONFIDENCE",
            SignalCode::RepetitionTooHigh => "REPETITION_TOO_HIGH",
            SignalCode::StreakTooShort => "STREAK_TOO_SHORT",
            SignalCode::CurrentlyRepeating => "CURRENTLY_REPEATING",
            SignalCode::InsufficientSamples => "INSUFFICIENT_SAMPLES",
        }
    }
}

impl fmt::Display for SignalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analyzer verdict for one history snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub should_trade: bool,
    /// Predicted digit (the contract barrier)
    pub target: u8,
    /// Clamped to [0, 1]
    pub confidence: f64,
    /// Human-readable explanation
    pub reason: String,
    pub code: SignalCode,
    pub analyzer: &'static str,
    pub stats: Option<DigitStats>,
}

impl Signal {
    /// A positive verdict
    pub fn trade(analyzer: &'static str, target: u8, confidence: f64, stats: DigitStats) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            should_trade: true,
            target,
            confidence,
            reason: format!("target {} at confidence {:.3}", target, confidence),
            code: SignalCode::Trade,
            analyzer,
            stats: Some(stats),
        }
    }

    /// A negative verdict
    pub fn skip(analyzer: &'static str, code: SignalCode, reason: impl Into<String>) -> Self {
        Self {
            should_trade: false,
            target: 0,
            confidence: 0.0,
            reason: reason.into(),
            code,
            analyzer,
            stats: None,
        }
    }

    /// Attach the figures the verdict was based on
    pub fn with_evidence(mut self, target: u8, confidence: f64, stats: DigitStats) -> Self {
        self.target = target;
        self.confidence = confidence.clamp(0.0, 1.0);
        self.stats = Some(stats);
        self
    }
}

/// Analyzer implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    #[default]
    Repetition,
    Frequency,
    Survival,
}

/// Weights of the confidence components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub repetition: f64,
    pub streak: f64,
    pub transition: f64,
    pub frequency: f64,
    pub entropy: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            repetition: 0.35,
            streak: 0.25,
            transition: 0.2,
            frequency: 0.1,
            entropy: 0.1,
        }
    }
}

impl ConfidenceWeights {
    pub fn total(&self) -> f64 {
        self.repetition + self.streak + self.transition + self.frequency + self.entropy
    }

    /// Named view used for persistence
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("repetition".to_string(), self.repetition),
            ("streak".to_string(), self.streak),
            ("transition".to_string(), self.transition),
            ("frequency".to_string(), self.frequency),
            ("entropy".to_string(), self.entropy),
        ])
    }
}

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub kind: AnalyzerKind,
    /// Shortest history the analyzer will judge
    pub min_history_length: usize,
    /// Sub-window for transition, frequency, and entropy figures
    pub recent_window: usize,
    pub min_confidence: f64,
    pub max_repetition_rate: f64,
    /// Required non-repetition streak at the tail
    pub min_streak: usize,
    /// Streak length at which the streak component saturates
    pub streak_saturation: usize,
    /// Observations needed before the survival estimate is used
    pub min_samples: usize,
    pub weights: ConfidenceWeights,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            kind: AnalyzerKind::Repetition,
            min_history_length: 50,
            recent_window: 20,
            min_confidence: 0.6,
            max_repetition_rate: 0.12,
            min_streak: 4,
            streak_saturation: 10,
            min_samples: 20,
            weights: ConfidenceWeights::default(),
        }
    }
}
