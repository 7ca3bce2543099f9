//! Threshold Evaluator
//!
//! Pure comparison of a sensor value against its bounds. Strict inequality
//! only and no hysteresis: a value equal to a bound never raises an alarm.

use crate::domain::{ThresholdAlarms, Thresholds};

/// Derive alarm flags for `value`.
pub fn evaluate(value: u64, bounds: &Thresholds) -> ThresholdAlarms {
    ThresholdAlarms {
        critical_high: value > bounds.critical_high,
        critical_low: value < bounds.critical_low,
        warning_high: value > bounds.warning_high,
        warning_low: value < bounds.warning_low,
    }
}
