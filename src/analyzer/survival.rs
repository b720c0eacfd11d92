//! Survival analyzer: empirical hazard of a repeat given the current gap

use super::stats::DigitStats;
use super::types::{AnalyzerConfig, Signal, SignalCode};
use super::{validate_history, TickAnalyzer};
use crate::feed::History;

/// Estimates `P(next digit repeats | ticks since the last repeat)` from the
/// history itself. Gaps at or beyond `streak_saturation` share one bucket.
///
/// The estimator is a plain frequency count with no smoothing; it is kept for
/// compatibility and makes no claim to predictive accuracy.
#[derive(Debug, Clone)]
pub struct SurvivalAnalyzer {
    config: AnalyzerConfig,
}

/// Hazard estimate for one gap bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hazard {
    pub gap: usize,
    pub samples: usize,
    pub repeats: usize,
}

impl Hazard {
    pub fn rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.repeats as f64 / self.samples as f64
        }
    }
}

impl SurvivalAnalyzer {
    pub const NAME: &'static str = "survival";

    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Hazard at the tail's current gap
    pub fn hazard(&self, digits: &[u8]) -> Hazard {
        let cap = self.config.streak_saturation.max(1);
        let mut gaps = Vec::with_capacity(digits.len());
        let mut run = 0usize;
        for (i, &d) in digits.iter().enumerate() {
            run = if i > 0 && digits[i - 1] == d { 1 } else { run + 1 };
            gaps.push(run.min(cap));
        }

        let gap = gaps.last().copied().unwrap_or(0);
        let mut hazard = Hazard {
            gap,
            samples: 0,
            repeats: 0,
        };
        for i in 0..digits.len().saturating_sub(1) {
            if gaps[i] == gap {
                hazard.samples += 1;
                if digits[i + 1] == digits[i] {
                    hazard.repeats += 1;
                }
            }
        }
        hazard
    }
}

impl TickAnalyzer for SurvivalAnalyzer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn analyze(&self, history: &History) -> Signal {
        if let Err(signal) = validate_history(Self::NAME, history, self.config.min_history_length) {
            return signal;
        }

        let digits = history.to_vec();
        let stats = DigitStats::compute(&digits);
        let Some(target) = stats.current_digit else {
            return Signal::skip(Self::NAME, SignalCode::InsufficientHistory, "empty history");
        };

        let hazard = self.hazard(&digits);
        if hazard.samples < self.config.min_samples {
            return Signal::skip(
                Self::NAME,
                SignalCode::InsufficientSamples,
                format!(
                    "{} observations at gap {}, need {}",
                    hazard.samples, hazard.gap, self.config.min_samples
                ),
            );
        }

        let confidence = 1.0 - hazard.rate();
        if confidence < self.config.min_confidence {
            return Signal::skip(
                Self::NAME,
                SignalCode::LowConfidence,
                format!(
                    "repeat hazard {:.3} at gap {}",
                    hazard.rate(),
                    hazard.gap
                ),
            )
            .with_evidence(target, confidence, stats);
        }
        if stats.current_streak != 1 {
            return Signal::skip(
                Self::NAME,
                SignalCode::CurrentlyRepeating,
                format!("digit {} is repeating", target),
            )
            .with_evidence(target, confidence, stats);
        }

        Signal::trade(Self::NAME, target, confidence, stats)
    }
}
