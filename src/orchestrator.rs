// =============================================================================
// Orchestrator — concurrent oracle fan-out with settle-all semantics
// =============================================================================
//
// One spawned task per posture, submitted in configuration order. Every call
// is bounded by `call_timeout`; a call that overruns is abandoned (its task is
// detached, not cancelled) and counted as failed. The orchestrator waits for
// every call to settle and keeps only the answers that decode into a vote.
// There are no retries.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::error::PredictError;
use crate::oracle::{decode_vote, ForecastOracle, ForecastVote, OracleCallError, Posture};

/// One call that did not produce a vote.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub posture: String,
    pub error: OracleCallError,
}

/// Settled outcome of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    /// Decoded votes in submission order.
    pub votes: Vec<ForecastVote>,
    pub failures: Vec<CallFailure>,
}

impl FanOutReport {
    pub fn attempts(&self) -> usize {
        self.votes.len() + self.failures.len()
    }

    /// The votes, or `AllOraclesFailed` when there are none.
    pub fn into_votes(self) -> Result<Vec<ForecastVote>, PredictError> {
        if !self.votes.is_empty() {
            return Ok(self.votes);
        }
        let attempts = self.attempts();
        let last_error = self
            .failures
            .last()
            .map(|f| f.error.to_string())
            .unwrap_or_else(|| "no oracle postures configured".to_string());
        Err(PredictError::AllOraclesFailed {
            attempts,
            last_error,
        })
    }
}

pub struct Orchestrator {
    oracle: Arc<dyn ForecastOracle>,
    postures: Vec<Posture>,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn new(oracle: Arc<dyn ForecastOracle>, postures: Vec<Posture>, call_timeout: Duration) -> Self {
        Self {
            oracle,
            postures,
            call_timeout,
        }
    }

    /// Issue one call per posture and wait for all of them to settle.
    pub async fn fan_out(&self, prompt: &str) -> FanOutReport {
        let prompt: Arc<str> = Arc::from(prompt);

        let handles: Vec<_> = self
            .postures
            .iter()
            .map(|posture| {
                let oracle = Arc::clone(&self.oracle);
                let prompt = Arc::clone(&prompt);
                let temperature = posture.temperature;
                tokio::spawn(async move { oracle.complete(&prompt, temperature).await })
            })
            .collect();

        let timeout = self.call_timeout;
        let settled = join_all(
            handles
                .into_iter()
                .map(|handle| tokio::time::timeout(timeout, handle)),
        )
        .await;

        let mut report = FanOutReport::default();
        for (order, (posture, outcome)) in self.postures.iter().zip(settled).enumerate() {
            let result = match outcome {
                Err(_elapsed) => Err(OracleCallError::Timeout(timeout)),
                Ok(Err(join_err)) => Err(OracleCallError::TaskFailed(join_err.to_string())),
                Ok(Ok(Err(call_err))) => Err(call_err),
                Ok(Ok(Ok(text))) => {
                    decode_vote(&text, posture.temperature, order).map_err(OracleCallError::from)
                }
            };

            match result {
                Ok(vote) => {
                    debug!(posture = %posture.name, prediction = vote.prediction, "oracle vote accepted");
                    report.votes.push(vote);
                }
                Err(error) => {
                    warn!(posture = %posture.name, error = %error, "oracle call failed");
                    report.failures.push(CallFailure {
                        posture: posture.name.clone(),
                        error,
                    });
                }
            }
        }

        report
    }
}
