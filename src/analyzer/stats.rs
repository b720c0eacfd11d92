//! Digit statistics

use crate::feed::MAX_DIGIT;
use serde::{Deserialize, Serialize};

const SYMBOLS: usize = MAX_DIGIT as usize + 1;
const UNIFORM: f64 = 1.0 / SYMBOLS as f64;

/// Summary statistics of a digit sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitStats {
    pub sample_size: usize,
    /// Fraction of adjacent pairs that are equal
    pub repetition_rate: f64,
    /// Tail symbol
    pub current_digit: Option<u8>,
    /// Run of equal symbols ending at the tail
    pub current_streak: usize,
    /// Symbols in the tail segment with no two adjacent equal
    pub non_repetition_streak: usize,
    /// Longest such segment anywhere in the sequence
    pub max_non_repetition_streak: usize,
    pub counts: [usize; SYMBOLS],
    /// `freq / n - 0.1` per digit
    pub frequency_deviation: [f64; SYMBOLS],
    /// Observed next-digit distribution after the tail symbol
    pub transitions: [f64; SYMBOLS],
    /// Number of observed transitions out of the tail symbol
    pub transition_samples: usize,
    /// Shannon entropy divided by `log2(10)`
    pub entropy: f64,
}

impl DigitStats {
    /// Compute over a sequence of valid digits
    pub fn compute(digits: &[u8]) -> Self {
        let n = digits.len();
        let mut counts = [0usize; SYMBOLS];
        for &d in digits {
            counts[usize::from(d.min(MAX_DIGIT))] += 1;
        }

        let repeats = digits.windows(2).filter(|w| w[0] == w[1]).count();
        let repetition_rate = if n > 1 {
            repeats as f64 / (n - 1) as f64
        } else {
            0.0
        };

        let current_digit = digits.last().copied();
        let current_streak = match current_digit {
            Some(tail) => digits.iter().rev().take_while(|&&d| d == tail).count(),
            None => 0,
        };

        let mut max_non_repetition_streak = 0;
        let mut run = 0;
        for (i, &d) in digits.iter().enumerate() {
            run = if i > 0 && digits[i - 1] == d { 1 } else { run + 1 };
            max_non_repetition_streak = max_non_repetition_streak.max(run);
        }
        let non_repetition_streak = run;

        let mut frequency_deviation = [0.0; SYMBOLS];
        if n > 0 {
            for (dev, &count) in frequency_deviation.iter_mut().zip(counts.iter()) {
                *dev = count as f64 / n as f64 - UNIFORM;
            }
        }

        let mut transitions = [0.0; SYMBOLS];
        let mut transition_samples = 0;
        if let Some(tail) = current_digit {
            let mut next_counts = [0usize; SYMBOLS];
            for w in digits.windows(2).filter(|w| w[0] == tail) {
                next_counts[usize::from(w[1].min(MAX_DIGIT))] += 1;
                transition_samples += 1;
            }
            if transition_samples > 0 {
                for (p, &c) in transitions.iter_mut().zip(next_counts.iter()) {
                    *p = c as f64 / transition_samples as f64;
                }
            }
        }

        Self {
            sample_size: n,
            repetition_rate,
            current_digit,
            current_streak,
            non_repetition_streak,
            max_non_repetition_streak,
            counts,
            frequency_deviation,
            transitions,
            transition_samples,
            entropy: normalized_entropy(&counts, n),
        }
    }

    /// Probability that the tail symbol repeats next, uniform when unobserved
    pub fn repeat_probability(&self) -> f64 {
        match self.current_digit {
            Some(d) if self.transition_samples > 0 => self.transitions[usize::from(d)],
            _ => UNIFORM,
        }
    }

    /// Most frequent digit; ties go to the lowest digit
    pub fn most_frequent(&self) -> Option<u8> {
        if self.sample_size == 0 {
            return None;
        }
        let mut best = 0;
        for d in 1..SYMBOLS {
            if self.counts[d] > self.counts[best] {
                best = d;
            }
        }
        Some(best as u8)
    }

    /// Least frequent digit; ties go to the lowest digit
    pub fn least_frequent(&self) -> Option<u8> {
        if self.sample_size == 0 {
            return None;
        }
        let mut best = 0;
        for d in 1..SYMBOLS {
            if self.counts[d] < self.counts[best] {
                best = d;
            }
        }
        Some(best as u8)
    }
}

fn normalized_entropy(counts: &[usize; SYMBOLS], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let h: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n as f64;
            -p * p.log2()
        })
        .sum();
    h / (SYMBOLS as f64).log2()
}
