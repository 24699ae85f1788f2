// =============================================================================
// Fallback Generator — deterministic forecast when no oracle answered
// =============================================================================
//
// No randomness and no I/O: the same series always yields the same answer, so
// the total-failure path is reproducible.

use crate::analytics::mean;
use crate::consensus::ConsensusResult;
use crate::types::{format_multiplier, ConfidenceLabel, Strategy};

const SERIES_WINDOW: usize = 5;
const UPLIFT: f64 = 1.1;
const FLOOR: f64 = 1.5;
const CEILING: f64 = 10.0;

/// Fixed answer for an absent or empty series.
pub fn canned() -> ConsensusResult {
    ConsensusResult {
        prediction: "2.15x".to_string(),
        confidence: ConfidenceLabel::Low,
        comment: "Fallback prediction - insufficient data".to_string(),
        strategy: Strategy::Conservative.to_string(),
        entry_timing: "Wait 1-2 rounds".to_string(),
        risk_level: 3,
        models_used: 0,
        explanation: None,
        pattern_signal: None,
        mathematical_basis: None,
        streak_factor: None,
        volatility_adjustment: None,
        fallback: true,
    }
}

/// Mean of the last five points, lifted by 10% and clamped to [1.5, 10.0].
pub fn generate(points: &[f64]) -> ConsensusResult {
    if points.is_empty() {
        return canned();
    }

    let tail = &points[points.len().saturating_sub(SERIES_WINDOW)..];
    let value = (mean(tail) * UPLIFT).clamp(FLOOR, CEILING);

    ConsensusResult {
        prediction: format_multiplier(value),
        confidence: ConfidenceLabel::Medium,
        comment: "Mathematical fallback based on recent average".to_string(),
        strategy: Strategy::Balanced.to_string(),
        entry_timing: "Immediate".to_string(),
        risk_level: 4,
        models_used: 0,
        explanation: None,
        pattern_signal: None,
        mathematical_basis: None,
        streak_factor: None,
        volatility_adjustment: None,
        fallback: true,
    }
}
