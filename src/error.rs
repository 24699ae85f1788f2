// =============================================================================
// Prediction errors
// =============================================================================
//
// Only `Validation` ever reaches a caller as an error status. The other
// variants are diagnostic: `AllOraclesFailed` is converted into a fallback
// answer and `Persistence` is logged and dropped.
// =============================================================================

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PredictError {
    /// Input rejected before any oracle call (too short, non-finite, < 1.0).
    Validation(String),
    /// Every oracle call failed; the message is the last failure seen.
    AllOraclesFailed { attempts: usize, last_error: String },
    /// Audit write failed or overran its timeout.
    Persistence(String),
}

impl std::error::Error for PredictError {}

impl fmt::Display for PredictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Insufficient data: {msg}"),
            Self::AllOraclesFailed { attempts, last_error } => {
                write!(f, "All AI calls failed ({attempts} attempted): {last_error}")
            }
            Self::Persistence(msg) => write!(f, "Audit write failed: {msg}"),
        }
    }
}
