//! Pure severity evaluation and hysteresis. No I/O, no shared state.

use crate::proto::{Prediction, Severity, Thresholds};
use chrono::Duration;

/// `(probability, thresholds) -> severity`, highest bucket wins.
pub fn evaluate(probability: f64, thresholds: &Thresholds) -> Option<Severity> {
    if probability >= thresholds.high {
        Some(Severity::High)
    } else if probability >= thresholds.medium {
        Some(Severity::Medium)
    } else if probability >= thresholds.low {
        Some(Severity::Low)
    } else {
        None
    }
}

/// A fired-or-not prediction, carrying the severity `evaluate` assigned it.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatedPrediction<'a> {
    pub prediction: &'a Prediction,
    pub severity: Severity,
}

/// Hysteresis rules, applied in order against the previously-fired evaluation.
///
/// `current` must already have a severity (callers skip this entirely when
/// `evaluate` returns `None`). `realert_window` is the configured minimum
/// interval between two HIGH alerts before one is re-surfaced.
pub fn should_fire(current: &EvaluatedPrediction, previous: Option<&EvaluatedPrediction>, realert_window: Duration) -> bool {
    if current.severity == Severity::High {
        return match previous {
            None => true,
            Some(prev) => {
                let elapsed = current.prediction.timestamp - prev.prediction.timestamp;
                prev.severity != Severity::High || elapsed >= realert_window
            }
        };
    }

    match previous {
        None => true,
        Some(prev) => current.severity != prev.severity,
    }
}
