// =============================================================================
// Forecast Oracle
// =============================================================================
//
// The oracle is a hosted text-completion service. Its whole contract is:
// given a prompt and a temperature, return text that should decode into one
// `ForecastVote`, or fail. Everything here is built around that seam:
//
// - `ForecastOracle`      — the trait the orchestrator fans out over
// - `ChatCompletionClient` — OpenAI-compatible HTTP implementation
// - `prompt`              — prompt text built from the analytics output
// - `vote`                — strict decoding of the oracle's answer

pub mod client;
pub mod prompt;
pub mod vote;

use std::time::Duration;

use async_trait::async_trait;

pub use client::ChatCompletionClient;
pub use vote::{decode_vote, ForecastVote, VoteParseError};

/// Failure of a single oracle call. Never propagated to the caller directly;
/// it only counts towards the failed-call tally.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleCallError {
    /// Network-level failure (connect, TLS, body read).
    Transport(String),
    /// Non-success HTTP status.
    Status { status: u16, body: String },
    /// Success status but the completion envelope lacks the message text.
    Envelope(String),
    /// Message text does not decode into a vote.
    Decode(VoteParseError),
    /// The call exceeded its time bound and was abandoned.
    Timeout(Duration),
    /// The spawned call task died before producing a result.
    TaskFailed(String),
}

impl std::error::Error for OracleCallError {}

impl std::fmt::Display for OracleCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "oracle transport error: {msg}"),
            Self::Status { status, body } => write!(f, "oracle API error: {status}: {body}"),
            Self::Envelope(msg) => write!(f, "malformed completion envelope: {msg}"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::Timeout(d) => write!(f, "oracle call timed out after {} ms", d.as_millis()),
            Self::TaskFailed(msg) => write!(f, "oracle task failed: {msg}"),
        }
    }
}

impl From<VoteParseError> for OracleCallError {
    fn from(e: VoteParseError) -> Self {
        Self::Decode(e)
    }
}

/// Anything that can answer a forecast prompt.
#[async_trait]
pub trait ForecastOracle: Send + Sync {
    /// Return the raw completion text for `prompt` sampled at `temperature`.
    async fn complete(&self, prompt: &str, temperature: f64) -> Result<String, OracleCallError>;
}

/// One independently parameterised oracle call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Posture {
    pub name: String,
    pub temperature: f64,
}

impl Posture {
    pub fn new(name: impl Into<String>, temperature: f64) -> Self {
        Self {
            name: name.into(),
            temperature,
        }
    }

    /// Conservative, balanced and aggressive postures, in submission order.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("conservative", 0.3),
            Self::new("balanced", 0.7),
            Self::new("aggressive", 0.9),
        ]
    }
}
