// =============================================================================
// Prediction Service — one request from validation to audited answer
// =============================================================================
//
// Pipeline:
//   1. Validate the series (the only failure surfaced to callers).
//   2. Fingerprint → cache hit short-circuits with `cached: true`.
//   3. Analyse the trailing window, build the prompt, fan out to the oracle.
//   4. Merge the votes (and cache the result) or fall back deterministically.
//   5. Record latency; a degradation signal sets `degraded` on the response.
//   6. Hand the result to the audit sink. Sink failures are logged only.
//
// The service owns no global state: cache, latency monitor and audit sink are
// handles supplied by the composition root.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analytics;
use crate::audit::{AuditRecord, AuditSink};
use crate::cache::{fingerprint, TtlCache};
use crate::consensus::{self, ConsensusResult};
use crate::error::PredictError;
use crate::fallback;
use crate::latency::{LatencyMonitor, AUDIT_WRITE, ORACLE_PREDICTION};
use crate::oracle::prompt::{build_prompt, PromptContext};
use crate::orchestrator::Orchestrator;
use crate::runtime_config::RuntimeConfig;
use crate::types::Strategy;

/// Inbound prediction request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionRequest {
    /// Observation series, most recent last.
    #[serde(default)]
    pub crash_points: Vec<f64>,
    /// Strategy selector; anything unrecognised means Balanced.
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub pattern_summary: Option<serde_json::Value>,
    #[serde(default)]
    pub hash_history: Option<serde_json::Value>,
    #[serde(default)]
    pub volatility_index: Option<f64>,
}

impl PredictionRequest {
    pub fn strategy(&self) -> Strategy {
        self.strategy
            .as_deref()
            .map(Strategy::parse_lenient)
            .unwrap_or_default()
    }
}

/// Outbound answer. Always produced unless validation failed.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    #[serde(flatten)]
    pub result: ConsensusResult,
    pub cached: bool,
    /// Wall time spent on this request, in milliseconds.
    pub latency: u64,
    /// Why the fallback was used, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The oracle fan-out of this request crossed its latency threshold.
    pub degraded: bool,
}

/// Knobs the service reads on every request.
#[derive(Debug, Clone)]
struct ServiceSettings {
    min_series_len: usize,
    analysis_window: usize,
    fingerprint_window: usize,
    audit_window: usize,
    monte_carlo_trials: usize,
    monte_carlo_seed: Option<u64>,
    cache_ttl: Duration,
    audit_timeout: Duration,
}

impl From<&RuntimeConfig> for ServiceSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            min_series_len: config.min_series_len.max(1),
            analysis_window: config.analysis_window.max(1),
            fingerprint_window: config.fingerprint_window.max(1),
            audit_window: config.audit_window,
            monte_carlo_trials: config.monte_carlo_trials,
            monte_carlo_seed: config.monte_carlo_seed,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            audit_timeout: Duration::from_millis(config.audit_timeout_ms.max(1)),
        }
    }
}

pub struct PredictionService {
    settings: ServiceSettings,
    orchestrator: Orchestrator,
    cache: Arc<TtlCache<ConsensusResult>>,
    latency: Arc<LatencyMonitor>,
    audit: Arc<dyn AuditSink>,
}

fn tail(points: &[f64], n: usize) -> &[f64] {
    &points[points.len().saturating_sub(n)..]
}

impl PredictionService {
    pub fn new(
        config: &RuntimeConfig,
        orchestrator: Orchestrator,
        cache: Arc<TtlCache<ConsensusResult>>,
        latency: Arc<LatencyMonitor>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            settings: ServiceSettings::from(config),
            orchestrator,
            cache,
            latency,
            audit,
        }
    }

    fn validate(&self, points: &[f64]) -> Result<(), PredictError> {
        let min = self.settings.min_series_len;
        if points.len() < min {
            return Err(PredictError::Validation(format!(
                "Need at least {min} crash points for prediction"
            )));
        }
        if let Some((i, v)) = points
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 1.0)
        {
            return Err(PredictError::Validation(format!(
                "crash point #{i} ({v}) is not a finite multiplier >= 1.0"
            )));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.settings.monte_carlo_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictError> {
        let started = Instant::now();
        let points = request.crash_points.as_slice();
        self.validate(points)?;

        let strategy = request.strategy();
        let key = fingerprint(points, self.settings.fingerprint_window, strategy);

        if let Some(result) = self.cache.get(&key) {
            debug!(%strategy, "prediction served from cache");
            return Ok(PredictionResponse {
                result,
                cached: true,
                latency: started.elapsed().as_millis() as u64,
                error: None,
                degraded: false,
            });
        }

        let window = tail(points, self.settings.analysis_window);
        let prompt = {
            let mut rng = self.rng();
            let analysis = analytics::analyze(window, self.settings.monte_carlo_trials, &mut rng)
                .ok_or_else(|| PredictError::Validation("empty series".to_string()))?;
            let ctx = PromptContext {
                strategy,
                volatility_index: request.volatility_index.unwrap_or(0.0),
                pattern_summary: request.pattern_summary.as_ref(),
                hash_history: request.hash_history.as_ref(),
            };
            build_prompt(window, &analysis, &ctx)
        };

        let report = self.orchestrator.fan_out(&prompt).await;
        let merged = report.into_votes().and_then(|votes| {
            consensus::merge(&votes, strategy).ok_or(PredictError::AllOraclesFailed {
                attempts: 0,
                last_error: "empty vote set".to_string(),
            })
        });

        let (result, error) = match merged {
            Ok(result) => {
                self.cache.set(key, result.clone(), self.settings.cache_ttl);
                (result, None)
            }
            Err(e) => {
                warn!(error = %e, "no usable oracle votes, using fallback forecast");
                (fallback::generate(points), Some(e.to_string()))
            }
        };

        let latency = started.elapsed().as_millis() as u64;
        let outcome = self.latency.record(ORACLE_PREDICTION, latency);
        let degraded = outcome.degradation.is_some();

        info!(
            %strategy,
            prediction = %result.prediction,
            confidence = %result.confidence,
            models_used = result.models_used,
            fallback = result.fallback,
            latency_ms = latency,
            window_avg_ms = outcome.stats.average_ms,
            health = %outcome.stats.status,
            degraded,
            "prediction answered"
        );

        if let Err(e) = self.write_audit(&result, strategy, points).await {
            error!(error = %e, "audit write failed");
        }

        Ok(PredictionResponse {
            result,
            cached: false,
            latency,
            error,
            degraded,
        })
    }

    /// Hand the result to the sink, bounded by `audit_timeout`. An overrun
    /// abandons the write and reports it as a persistence failure.
    async fn write_audit(
        &self,
        result: &ConsensusResult,
        strategy: Strategy,
        points: &[f64],
    ) -> Result<(), PredictError> {
        let record = AuditRecord::new(result, strategy, tail(points, self.settings.audit_window));
        let timeout = self.settings.audit_timeout;
        let started = Instant::now();
        let written = tokio::time::timeout(timeout, self.audit.write(record)).await;
        self.latency
            .record(AUDIT_WRITE, started.elapsed().as_millis() as u64);
        match written {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(PredictError::Persistence(format!(
                "timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::audit::PredictionJournal;
    use crate::oracle::{ForecastOracle, OracleCallError, Posture};
    use crate::types::ConfidenceLabel;

    const SERIES: [f64; 12] = [1.2, 3.0, 1.5, 4.0, 1.1, 2.2, 1.05, 6.4, 1.9, 2.7, 1.3, 1.4];

    /// Answers every temperature in `answers`; fails the rest.
    struct StubOracle {
        answers: Vec<(f64, &'static str)>,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ForecastOracle for StubOracle {
        async fn complete(&self, prompt: &str, temperature: f64) -> Result<String, OracleCallError> {
            assert!(prompt.contains("OUTPUT REQUIREMENTS"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answers
                .iter()
                .find(|(t, _)| *t == temperature)
                .map(|(_, p)| {
                    format!(
                        r#"{{"prediction": "{p}", "confidence": "High", "comment": "c",
                            "strategy": "Balanced", "entry_timing": "Immediate", "risk_level": 4,
                            "pattern_signal": "neutral", "mathematical_basis": "m",
                            "streak_factor": "s", "volatility_adjustment": "v"}}"#
                    )
                })
                .ok_or_else(|| OracleCallError::Status {
                    status: 503,
                    body: "unavailable".into(),
                })
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn write(&self, _record: AuditRecord) -> Result<(), PredictError> {
            Err(PredictError::Persistence("disk full".into()))
        }
    }

    /// Never finishes a write.
    struct StalledSink;

    #[async_trait]
    impl AuditSink for StalledSink {
        async fn write(&self, _record: AuditRecord) -> Result<(), PredictError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Harness {
        service: PredictionService,
        oracle: Arc<StubOracle>,
        cache: Arc<TtlCache<ConsensusResult>>,
        latency: Arc<LatencyMonitor>,
        journal: Arc<PredictionJournal>,
    }

    fn harness(answers: Vec<(f64, &'static str)>) -> Harness {
        slow_harness(answers, Duration::ZERO)
    }

    fn slow_harness(answers: Vec<(f64, &'static str)>, delay: Duration) -> Harness {
        let config = RuntimeConfig {
            monte_carlo_seed: Some(42),
            ..RuntimeConfig::default()
        };
        configured_harness(config, answers, delay)
    }

    fn configured_harness(
        config: RuntimeConfig,
        answers: Vec<(f64, &'static str)>,
        delay: Duration,
    ) -> Harness {
        let oracle = Arc::new(StubOracle {
            answers,
            delay,
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(TtlCache::new(config.cache_capacity));
        let latency = Arc::new(LatencyMonitor::new(
            config.latency_window,
            config.latency_thresholds_ms.clone(),
        ));
        let journal = Arc::new(PredictionJournal::new(config.journal_capacity));
        let orchestrator = Orchestrator::new(
            oracle.clone(),
            Posture::defaults(),
            Duration::from_secs(config.oracle.call_timeout_secs),
        );
        let service = PredictionService::new(
            &config,
            orchestrator,
            cache.clone(),
            latency.clone(),
            journal.clone(),
        );
        Harness {
            service,
            oracle,
            cache,
            latency,
            journal,
        }
    }

    fn request(strategy: &str) -> PredictionRequest {
        PredictionRequest {
            crash_points: SERIES.to_vec(),
            strategy: Some(strategy.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn short_series_is_rejected_before_any_call() {
        let h = harness(vec![(0.3, "2.00x")]);
        let req = PredictionRequest {
            crash_points: vec![1.5; 9],
            ..Default::default()
        };
        let err = h.service.predict(&req).await.unwrap_err();
        assert!(matches!(err, PredictError::Validation(_)));
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sub_unit_point_is_rejected() {
        let h = harness(vec![]);
        let mut req = request("Balanced");
        req.crash_points[3] = 0.5;
        assert!(matches!(
            h.service.predict(&req).await,
            Err(PredictError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn merges_votes_and_caches() {
        let h = harness(vec![(0.3, "2.00x"), (0.7, "3.00x"), (0.9, "5.00x")]);
        let first = h.service.predict(&request("Aggressive")).await.unwrap();
        assert_eq!(first.result.prediction, "5.00x");
        assert_eq!(first.result.models_used, 3);
        assert_eq!(first.result.confidence, ConfidenceLabel::High);
        assert!(!first.cached);
        assert!(!first.result.fallback);
        assert_eq!(h.cache.len(), 1);

        let second = h.service.predict(&request("Aggressive")).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.result, first.result);
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 3);

        // A different strategy is a different key.
        let other = h.service.predict(&request("Conservative")).await.unwrap();
        assert!(!other.cached);
        assert_eq!(other.result.prediction, "2.00x");
    }

    #[tokio::test]
    async fn single_survivor_passes_through() {
        let h = harness(vec![(0.7, "3.10x")]);
        let resp = h.service.predict(&request("Balanced")).await.unwrap();
        assert_eq!(resp.result.prediction, "3.10x");
        assert_eq!(resp.result.models_used, 1);
        assert!(!resp.result.fallback);
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn total_failure_falls_back_and_is_not_cached() {
        let h = harness(vec![]);
        let resp = h.service.predict(&request("Balanced")).await.unwrap();
        assert!(resp.result.fallback);
        // Last five: 6.4, 1.9, 2.7, 1.3, 1.4 → mean 2.74 × 1.1 = 3.014
        assert_eq!(resp.result.prediction, "3.01x");
        assert!(resp.error.unwrap().contains("All AI calls failed (3 attempted)"));
        assert_eq!(h.cache.len(), 0);
        assert_eq!(h.journal.len(), 1);
        assert_eq!(h.latency.stats(ORACLE_PREDICTION).unwrap().count, 1);
    }

    #[tokio::test]
    async fn audit_gets_trailing_window() {
        let h = harness(vec![(0.3, "2.00x")]);
        h.service.predict(&request("Balanced")).await.unwrap();
        let records = h.journal.recent(1);
        assert_eq!(records[0].crash_points.len(), 10);
        assert_eq!(records[0].crash_points[9], 1.4);
        assert_eq!(h.latency.stats(AUDIT_WRITE).unwrap().count, 1);
    }

    #[tokio::test]
    async fn audit_failure_does_not_affect_response() {
        let config = RuntimeConfig::default();
        let oracle = Arc::new(StubOracle {
            answers: vec![(0.3, "2.50x")],
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let service = PredictionService::new(
            &config,
            Orchestrator::new(oracle, Posture::defaults(), Duration::from_secs(5)),
            Arc::new(TtlCache::new(10)),
            Arc::new(LatencyMonitor::new(10, Default::default())),
            Arc::new(FailingSink),
        );
        let resp = service.predict(&request("Balanced")).await.unwrap();
        assert_eq!(resp.result.prediction, "2.50x");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_audit_write_times_out_as_persistence_failure() {
        let config = RuntimeConfig {
            audit_timeout_ms: 250,
            ..RuntimeConfig::default()
        };
        let oracle = Arc::new(StubOracle {
            answers: vec![(0.3, "2.50x")],
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let latency = Arc::new(LatencyMonitor::new(10, Default::default()));
        let service = PredictionService::new(
            &config,
            Orchestrator::new(oracle, Posture::defaults(), Duration::from_secs(5)),
            Arc::new(TtlCache::new(10)),
            latency.clone(),
            Arc::new(StalledSink),
        );

        let err = service
            .write_audit(&fallback::canned(), Strategy::Balanced, &SERIES)
            .await
            .unwrap_err();
        assert_eq!(err, PredictError::Persistence("timed out after 250ms".into()));
        assert!(latency.stats(AUDIT_WRITE).unwrap().min_ms >= 250);

        // The response path is unaffected.
        let resp = service.predict(&request("Balanced")).await.unwrap();
        assert_eq!(resp.result.prediction, "2.50x");
        assert_eq!(latency.stats(AUDIT_WRITE).unwrap().count, 2);
    }

    #[tokio::test]
    async fn zero_fingerprint_window_still_separates_series() {
        let config = RuntimeConfig {
            fingerprint_window: 0,
            monte_carlo_seed: Some(42),
            ..RuntimeConfig::default()
        };
        let h = configured_harness(config, vec![(0.3, "2.00x")], Duration::ZERO);
        h.service.predict(&request("Balanced")).await.unwrap();

        let mut other = request("Balanced");
        *other.crash_points.last_mut().unwrap() = 9.9;
        let resp = h.service.predict(&other).await.unwrap();
        assert!(!resp.cached);
        assert_eq!(h.cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fan_out_flags_degradation() {
        let h = slow_harness(vec![(0.3, "2.00x")], Duration::from_secs(6));
        let resp = h.service.predict(&request("Balanced")).await.unwrap();
        assert!(resp.degraded);
        assert!(resp.latency >= 6000);
        assert!(!resp.result.fallback);

        let fast = harness(vec![(0.3, "2.00x")]);
        let resp = fast.service.predict(&request("Balanced")).await.unwrap();
        assert!(!resp.degraded);
    }

    #[test]
    fn response_serialises_flat() {
        let resp = PredictionResponse {
            result: fallback::canned(),
            cached: false,
            latency: 12,
            error: Some("All AI calls failed".into()),
            degraded: false,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["prediction"], "2.15x");
        assert_eq!(json["confidence"], "Low");
        assert_eq!(json["fallback"], true);
        assert_eq!(json["latency"], 12);
        assert_eq!(json["models_used"], 0);
        assert!(json.get("explanation").is_none());
    }

    #[test]
    fn unknown_strategy_is_balanced() {
        assert_eq!(request("YOLO").strategy(), Strategy::Balanced);
        assert_eq!(PredictionRequest::default().strategy(), Strategy::Balanced);
    }
}
