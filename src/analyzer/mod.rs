//! Tick analyzers
//!
//! Pure scoring of a digit history into a trade [`Signal`]

mod frequency;
mod repetition;
mod stats;
mod survival;
mod types;

pub use frequency::FrequencyAnalyzer;
pub use repetition::RepetitionAnalyzer;
pub use stats::DigitStats;
pub use survival::{Hazard, SurvivalAnalyzer};
pub use types::{AnalyzerConfig, AnalyzerKind, ConfidenceWeights, Signal, SignalCode};

use crate::feed::{History, MAX_DIGIT};

/// Scores a digit history; deterministic and free of I/O
pub trait TickAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, history: &History) -> Signal;
}

/// Build the analyzer selected in config
pub fn create_analyzer(config: &AnalyzerConfig) -> Box<dyn TickAnalyzer> {
    match config.kind {
        AnalyzerKind::Repetition => Box::new(RepetitionAnalyzer::new(config.clone())),
        AnalyzerKind::Frequency => Box::new(FrequencyAnalyzer::new(config.clone())),
        AnalyzerKind::Survival => Box::new(SurvivalAnalyzer::new(config.clone())),
    }
}

/// Common input checks: length first, then symbol range
pub(crate) fn validate_history(
    analyzer: &'static str,
    history: &History,
    min_length: usize,
) -> Result<(), Signal> {
    if history.len() < min_length.max(1) {
        return Err(Signal::skip(
            analyzer,
            SignalCode::InsufficientHistory,
            format!("history has {} of {} digits", history.len(), min_length),
        ));
    }
    if let Some(bad) = history.iter().find(|&d| d > MAX_DIGIT) {
        return Err(Signal::skip(
            analyzer,
            SignalCode::InvalidSymbol,
            format!("symbol {} outside 0..=9", bad),
        ));
    }
    Ok(())
}
