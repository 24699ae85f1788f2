// =============================================================================
// Forecast Vote — strict decoding of one oracle answer
// =============================================================================
//
// The oracle is asked for a single JSON object with exactly ten fields. The
// decoder strips Markdown code fences, then requires:
//   - one JSON object, nothing else, no unknown fields
//   - `prediction` parsable as a finite positive multiplier ("3.25x")
//   - `confidence` one of Low | Medium | High | EXTREME
//   - `risk_level` an integer in 1..=10
// Anything else is a `VoteParseError`, which the orchestrator counts as a
// failed call.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::{parse_multiplier, ConfidenceLabel};

/// One oracle's validated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastVote {
    /// Prediction exactly as the oracle wrote it.
    pub prediction_text: String,
    /// Parsed numeric prediction.
    pub prediction: f64,
    pub confidence: ConfidenceLabel,
    pub comment: String,
    pub strategy: String,
    pub entry_timing: String,
    /// 1–10.
    pub risk_level: u8,
    pub pattern_signal: String,
    pub mathematical_basis: String,
    pub streak_factor: String,
    pub volatility_adjustment: String,
    /// Sampling temperature of the call that produced this vote.
    pub temperature: f64,
    /// Submission index (0 = conservative).
    pub order: usize,
}

/// Why an oracle response was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteParseError {
    /// Not exactly one JSON object of the expected shape.
    Shape(String),
    /// `prediction` is not a finite positive multiplier.
    Prediction(String),
    /// `risk_level` outside 1..=10.
    RiskLevel(u8),
}

impl std::error::Error for VoteParseError {}

impl std::fmt::Display for VoteParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shape(msg) => write!(f, "response does not match vote schema: {msg}"),
            Self::Prediction(raw) => write!(f, "unparsable prediction value '{raw}'"),
            Self::RiskLevel(level) => write!(f, "risk_level {level} outside 1..=10"),
        }
    }
}

/// Wire shape of the oracle's JSON answer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireVote {
    prediction: String,
    confidence: ConfidenceLabel,
    comment: String,
    strategy: String,
    entry_timing: String,
    risk_level: u8,
    pattern_signal: String,
    mathematical_basis: String,
    streak_factor: String,
    volatility_adjustment: String,
}

/// Remove ```json / ``` fence markers and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Decode an oracle completion into a [`ForecastVote`].
pub fn decode_vote(raw: &str, temperature: f64, order: usize) -> Result<ForecastVote, VoteParseError> {
    let cleaned = strip_code_fences(raw);
    let wire: WireVote =
        serde_json::from_str(&cleaned).map_err(|e| VoteParseError::Shape(e.to_string()))?;

    let prediction = parse_multiplier(&wire.prediction)
        .filter(|v| *v > 0.0)
        .ok_or_else(|| VoteParseError::Prediction(wire.prediction.clone()))?;

    if !(1..=10).contains(&wire.risk_level) {
        return Err(VoteParseError::RiskLevel(wire.risk_level));
    }

    Ok(ForecastVote {
        prediction_text: wire.prediction,
        prediction,
        confidence: wire.confidence,
        comment: wire.comment,
        strategy: wire.strategy,
        entry_timing: wire.entry_timing,
        risk_level: wire.risk_level,
        pattern_signal: wire.pattern_signal,
        mathematical_basis: wire.mathematical_basis,
        streak_factor: wire.streak_factor,
        volatility_adjustment: wire.volatility_adjustment,
        temperature,
        order,
    })
}
