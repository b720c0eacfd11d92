//! Repetition analyzer: bet that the tail digit does not repeat

use super::stats::DigitStats;
use super::types::{AnalyzerConfig, Signal, SignalCode};
use super::{validate_history, TickAnalyzer};
use crate::feed::History;

/// Scores low-repetition regimes and targets the current tail digit
///
/// Gates, first failure wins: confidence, repetition rate, non-repetition
/// streak, and a tail that is not itself repeating.
#[derive(Debug, Clone)]
pub struct RepetitionAnalyzer {
    config: AnalyzerConfig,
}

impl RepetitionAnalyzer {
    pub const NAME: &'static str = "repetition";

    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Weighted confidence in [0, 1]
    pub fn confidence(&self, full: &DigitStats, recent: &DigitStats, target: u8) -> f64 {
        let w = &self.config.weights;
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }

        // expected rate for uniform digits is 0.1; 0.2 or worse scores zero
        let low_repetition = (1.0 - recent.repetition_rate * 5.0).clamp(0.0, 1.0);
        let streak = (full.non_repetition_streak as f64
            / self.config.streak_saturation.max(1) as f64)
            .min(1.0);
        let transition = 1.0 - recent.repeat_probability();
        let frequency =
            (0.5 - recent.frequency_deviation[usize::from(target)] * 5.0).clamp(0.0, 1.0);

        let score = w.repetition * low_repetition
            + w.streak * streak
            + w.transition * transition
            + w.frequency * frequency
            + w.entropy * recent.entropy;
        (score / total).clamp(0.0, 1.0)
    }
}

impl TickAnalyzer for RepetitionAnalyzer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn analyze(&self, history: &History) -> Signal {
        if let Err(signal) = validate_history(Self::NAME, history, self.config.min_history_length) {
            return signal;
        }

        let digits = history.to_vec();
        let full = DigitStats::compute(&digits);
        let recent = DigitStats::compute(&history.recent(self.config.recent_window));
        let Some(target) = full.current_digit else {
            return Signal::skip(Self::NAME, SignalCode::InsufficientHistory, "empty history");
        };
        let confidence = self.confidence(&full, &recent, target);

        let failed = if confidence < self.config.min_confidence {
            Some((
                SignalCode::LowConfidence,
                format!(
                    "confidence {:.3} below {:.3}",
                    confidence, self.config.min_confidence
                ),
            ))
        } else if full.repetition_rate > self.config.max_repetition_rate {
            Some((
                SignalCode::RepetitionTooHigh,
                format!(
                    "repetition rate {:.3} above {:.3}",
                    full.repetition_rate, self.config.max_repetition_rate
                ),
            ))
        } else if full.non_repetition_streak < self.config.min_streak {
            Some((
                SignalCode::StreakTooShort,
                format!(
                    "non-repetition streak {} shorter than {}",
                    full.non_repetition_streak, self.config.min_streak
                ),
            ))
        } else if full.current_streak != 1 {
            Some((
                SignalCode::CurrentlyRepeating,
                format!("digit {} is repeating ({} in a row)", target, full.current_streak),
            ))
        } else {
            None
        };

        match failed {
            Some((code, reason)) => {
                Signal::skip(Self::NAME, code, reason).with_evidence(target, confidence, full)
            }
            None => Signal::trade(Self::NAME, target, confidence, full),
        }
    }
}
