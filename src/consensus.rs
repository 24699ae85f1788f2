// =============================================================================
// Consensus Merger — collapses several forecast votes into one result
// =============================================================================
//
// Pure and stateless. Input votes arrive in submission order (conservative
// first). The selected strategy only decides how the numeric predictions are
// reduced:
//
//   Conservative → minimum
//   Aggressive   → maximum
//   Balanced     → median (mean of the two middles on an even count)
//
// Confidence is the rounded mean of the label ordinals; a rounded ordinal
// outside 1..=4 falls back to Medium. Risk is the rounded mean of the risk
// levels. Entry timing comes from the first vote.
// =============================================================================

use serde::Serialize;
use tracing::debug;

use crate::analytics::median;
use crate::oracle::ForecastVote;
use crate::types::{format_multiplier, ConfidenceLabel, Strategy};

/// Final forecast handed to the caller, the cache and the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusResult {
    /// Rendered multiplier, e.g. `"2.45x"`.
    pub prediction: String,
    pub confidence: ConfidenceLabel,
    pub comment: String,
    pub strategy: String,
    pub entry_timing: String,
    pub risk_level: u8,
    pub models_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mathematical_basis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_factor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_adjustment: Option<String>,
    /// Set only by the fallback generator.
    pub fallback: bool,
}

impl ConsensusResult {
    /// A single vote, unchanged apart from the multiplier rendering.
    fn from_single(vote: &ForecastVote) -> Self {
        Self {
            prediction: vote.prediction_text.clone(),
            confidence: vote.confidence,
            comment: vote.comment.clone(),
            strategy: vote.strategy.clone(),
            entry_timing: vote.entry_timing.clone(),
            risk_level: vote.risk_level,
            models_used: 1,
            explanation: None,
            pattern_signal: Some(vote.pattern_signal.clone()),
            mathematical_basis: Some(vote.mathematical_basis.clone()),
            streak_factor: Some(vote.streak_factor.clone()),
            volatility_adjustment: Some(vote.volatility_adjustment.clone()),
            fallback: false,
        }
    }
}

/// Rounded mean of the confidence ordinals, or Medium when out of range.
fn merge_confidence(votes: &[ForecastVote]) -> ConfidenceLabel {
    let sum: u32 = votes.iter().map(|v| v.confidence.ordinal() as u32).sum();
    let avg = (sum as f64 / votes.len() as f64).round() as i64;
    ConfidenceLabel::from_ordinal(avg).unwrap_or(ConfidenceLabel::Medium)
}

fn merge_risk(votes: &[ForecastVote]) -> u8 {
    let sum: u32 = votes.iter().map(|v| v.risk_level as u32).sum();
    (sum as f64 / votes.len() as f64).round().clamp(1.0, 10.0) as u8
}

/// Merge a non-empty vote list. Returns `None` for an empty list.
pub fn merge(votes: &[ForecastVote], strategy: Strategy) -> Option<ConsensusResult> {
    let first = votes.first()?;
    if votes.len() == 1 {
        return Some(ConsensusResult::from_single(first));
    }

    let values: Vec<f64> = votes.iter().map(|v| v.prediction).collect();
    let value = match strategy {
        Strategy::Conservative => values.iter().copied().fold(f64::INFINITY, f64::min),
        Strategy::Aggressive => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Strategy::Balanced => median(&values),
    };

    let confidence = merge_confidence(votes);
    let risk_level = merge_risk(votes);

    debug!(
        votes = votes.len(),
        %strategy,
        value,
        %confidence,
        risk_level,
        "votes merged"
    );

    Some(ConsensusResult {
        prediction: format_multiplier(value),
        confidence,
        comment: format!(
            "Merged prediction from {} AI models using {} strategy",
            votes.len(),
            strategy
        ),
        strategy: strategy.to_string(),
        entry_timing: first.entry_timing.clone(),
        risk_level,
        models_used: votes.len(),
        explanation: Some("AI consensus reached through multi-model voting system".to_string()),
        pattern_signal: None,
        mathematical_basis: None,
        streak_factor: None,
        volatility_adjustment: None,
        fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(prediction: f64, confidence: ConfidenceLabel, risk: u8, timing: &str, order: usize) -> ForecastVote {
        ForecastVote {
            prediction_text: format_multiplier(prediction),
            prediction,
            confidence,
            comment: format!("vote {order}"),
            strategy: "Balanced".into(),
            entry_timing: timing.into(),
            risk_level: risk,
            pattern_signal: "neutral".into(),
            mathematical_basis: "Monte Carlo".into(),
            streak_factor: "none".into(),
            volatility_adjustment: "none".into(),
            temperature: 0.3,
            order,
        }
    }

    fn three() -> Vec<ForecastVote> {
        vec![
            vote(3.0, ConfidenceLabel::Low, 3, "Wait 1-2 rounds", 0),
            vote(5.0, ConfidenceLabel::High, 6, "Immediate", 1),
            vote(2.0, ConfidenceLabel::High, 8, "Immediate", 2),
        ]
    }

    #[test]
    fn strategy_selects_reduction() {
        let votes = three();
        assert_eq!(merge(&votes, Strategy::Conservative).unwrap().prediction, "2.00x");
        assert_eq!(merge(&votes, Strategy::Aggressive).unwrap().prediction, "5.00x");
        assert_eq!(merge(&votes, Strategy::Balanced).unwrap().prediction, "3.00x");
    }

    #[test]
    fn even_count_median_averages_middles() {
        let votes = vec![
            vote(2.0, ConfidenceLabel::Low, 2, "Immediate", 0),
            vote(4.0, ConfidenceLabel::Low, 2, "Immediate", 1),
        ];
        assert_eq!(merge(&votes, Strategy::Balanced).unwrap().prediction, "3.00x");
    }

    #[test]
    fn confidence_risk_and_timing() {
        let merged = merge(&three(), Strategy::Balanced).unwrap();
        // (1 + 3 + 3) / 3 = 2.33 → 2
        assert_eq!(merged.confidence, ConfidenceLabel::Medium);
        // (3 + 6 + 8) / 3 = 5.67 → 6
        assert_eq!(merged.risk_level, 6);
        assert_eq!(merged.entry_timing, "Wait 1-2 rounds");
        assert_eq!(merged.models_used, 3);
        assert_eq!(merged.strategy, "Balanced");
        assert_eq!(
            merged.comment,
            "Merged prediction from 3 AI models using Balanced strategy"
        );
        assert!(merged.explanation.is_some());
        assert!(!merged.fallback);
    }

    #[test]
    fn risk_half_rounds_up() {
        let votes = vec![
            vote(2.0, ConfidenceLabel::High, 4, "Immediate", 0),
            vote(2.0, ConfidenceLabel::Extreme, 5, "Immediate", 1),
        ];
        let merged = merge(&votes, Strategy::Balanced).unwrap();
        assert_eq!(merged.risk_level, 5);
        // (3 + 4) / 2 = 3.5 → 4
        assert_eq!(merged.confidence, ConfidenceLabel::Extreme);
    }

    #[test]
    fn single_vote_passes_through() {
        let mut only = vote(7.77, ConfidenceLabel::Extreme, 9, "Wait 3+ rounds", 2);
        only.prediction_text = "7.77x".into();
        only.strategy = "Aggressive".into();
        let merged = merge(std::slice::from_ref(&only), Strategy::Conservative).unwrap();
        assert_eq!(merged.prediction, "7.77x");
        assert_eq!(merged.confidence, ConfidenceLabel::Extreme);
        assert_eq!(merged.risk_level, 9);
        assert_eq!(merged.strategy, "Aggressive");
        assert_eq!(merged.comment, "vote 2");
        assert_eq!(merged.models_used, 1);
        assert_eq!(merged.pattern_signal.as_deref(), Some("neutral"));
    }

    #[test]
    fn empty_input_is_none() {
        assert!(merge(&[], Strategy::Balanced).is_none());
    }
}
