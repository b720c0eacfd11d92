//! Frequency analyzer: bet against the least-seen recent digit

use super::stats::DigitStats;
use super::types::{AnalyzerConfig, Signal, SignalCode};
use super::{validate_history, TickAnalyzer};
use crate::feed::History;

/// Share of confidence from under-representation; the rest is entropy
const UNDER_REPRESENTATION_WEIGHT: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct FrequencyAnalyzer {
    config: AnalyzerConfig,
}

impl FrequencyAnalyzer {
    pub const NAME: &'static str = "frequency";

    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }
}

impl TickAnalyzer for FrequencyAnalyzer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn analyze(&self, history: &History) -> Signal {
        if let Err(signal) = validate_history(Self::NAME, history, self.config.min_history_length) {
            return signal;
        }

        let recent = DigitStats::compute(&history.recent(self.config.recent_window));
        let Some(target) = recent.least_frequent() else {
            return Signal::skip(Self::NAME, SignalCode::InsufficientHistory, "empty window");
        };

        // a digit absent from the window scores 1.0
        let under = (-recent.frequency_deviation[usize::from(target)] * 10.0).clamp(0.0, 1.0);
        let confidence = UNDER_REPRESENTATION_WEIGHT * under
            + (1.0 - UNDER_REPRESENTATION_WEIGHT) * recent.entropy;

        if confidence < self.config.min_confidence {
            return Signal::skip(
                Self::NAME,
                SignalCode::LowConfidence,
                format!(
                    "confidence {:.3} below {:.3}",
                    confidence, self.config.min_confidence
                ),
            )
            .with_evidence(target, confidence, recent);
        }

        Signal::trade(Self::NAME, target, confidence, recent)
    }
}
