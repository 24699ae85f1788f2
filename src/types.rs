// =============================================================================
// Shared types used across the forecast engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Threshold separating "low" observations from everything else.
pub const LOW_THRESHOLD: f64 = 2.0;

/// Upper bound (inclusive) of the "mid" bucket.
pub const HIGH_THRESHOLD: f64 = 5.0;

/// Risk posture requested by the caller. Selects how multiple forecast votes
/// collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Conservative,
    Balanced,
    Aggressive,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Balanced
    }
}

impl Strategy {
    /// Parse a caller-supplied selector. Anything unrecognised is `Balanced`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Self::Conservative,
            "aggressive" => Self::Aggressive,
            _ => Self::Balanced,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservative => write!(f, "Conservative"),
            Self::Balanced => write!(f, "Balanced"),
            Self::Aggressive => write!(f, "Aggressive"),
        }
    }
}

/// Confidence label attached to a forecast. Ordinals run 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
    #[serde(rename = "EXTREME")]
    Extreme,
}

impl ConfidenceLabel {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Extreme => 4,
        }
    }

    /// Inverse of [`ordinal`](Self::ordinal). Out-of-range values yield `None`.
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            4 => Some(Self::Extreme),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Extreme => write!(f, "EXTREME"),
        }
    }
}

/// Format a multiplier the way every outbound prediction is rendered.
pub fn format_multiplier(value: f64) -> String {
    format!("{value:.2}x")
}

/// Parse "3.25x" / "3.25" into a float. Returns `None` for anything else.
pub fn parse_multiplier(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_suffix('x')
        .or_else(|| trimmed.strip_suffix('X'))
        .unwrap_or(trimmed)
        .trim();
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parse_defaults_to_balanced() {
        assert_eq!(Strategy::parse_lenient("Conservative"), Strategy::Conservative);
        assert_eq!(Strategy::parse_lenient("aggressive"), Strategy::Aggressive);
        assert_eq!(Strategy::parse_lenient("YOLO"), Strategy::Balanced);
        assert_eq!(Strategy::default(), Strategy::Balanced);
    }

    #[test]
    fn confidence_serialises_with_wire_spelling() {
        let json = serde_json::to_string(&ConfidenceLabel::Extreme).unwrap();
        assert_eq!(json, "\"EXTREME\"");
        let back: ConfidenceLabel = serde_json::from_str("\"Medium\"").unwrap();
        assert_eq!(back, ConfidenceLabel::Medium);
        assert!(serde_json::from_str::<ConfidenceLabel>("\"Extreme\"").is_err());
    }

    #[test]
    fn confidence_ordinal_roundtrip() {
        for label in [
            ConfidenceLabel::Low,
            ConfidenceLabel::Medium,
            ConfidenceLabel::High,
            ConfidenceLabel::Extreme,
        ] {
            assert_eq!(ConfidenceLabel::from_ordinal(label.ordinal() as i64), Some(label));
        }
        assert_eq!(ConfidenceLabel::from_ordinal(0), None);
        assert_eq!(ConfidenceLabel::from_ordinal(5), None);
    }

    #[test]
    fn multiplier_parsing() {
        assert_eq!(parse_multiplier("3.25x"), Some(3.25));
        assert_eq!(parse_multiplier(" 2 "), Some(2.0));
        assert_eq!(parse_multiplier("abc"), None);
        assert_eq!(format_multiplier(3.3), "3.30x");
    }
}
