// =============================================================================
// Central Application State — Crash Forecast Service
// =============================================================================
//
// Composition root for everything a request handler needs. The shared,
// mutable components (cache, latency monitor, journal) are constructed once
// here and handed out as `Arc` handles; nothing in the crate is a global.
//
// Thread safety:
//   - `TtlCache` and `LatencyMonitor` guard their own state with
//     parking_lot locks.
//   - `PredictionService` is immutable after construction.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::PredictionJournal;
use crate::cache::{CacheStats, TtlCache};
use crate::consensus::ConsensusResult;
use crate::latency::{HealthStatus, LatencyMonitor};
use crate::oracle::ForecastOracle;
use crate::orchestrator::Orchestrator;
use crate::predictor::PredictionService;
use crate::runtime_config::RuntimeConfig;

/// Health snapshot served at `/api/v1/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub model: String,
    pub postures: usize,
    pub cache: CacheStats,
}

/// Shared across all handlers via `Arc<AppState>`.
pub struct AppState {
    pub runtime_config: RuntimeConfig,
    pub started_at: DateTime<Utc>,

    pub cache: Arc<TtlCache<ConsensusResult>>,
    pub latency: Arc<LatencyMonitor>,
    pub journal: Arc<PredictionJournal>,

    pub predictor: PredictionService,
}

impl AppState {
    pub fn new(config: RuntimeConfig, oracle: Arc<dyn ForecastOracle>) -> Self {
        let cache = Arc::new(TtlCache::new(config.cache_capacity));
        let latency = Arc::new(LatencyMonitor::new(
            config.latency_window,
            config.latency_thresholds_ms.clone(),
        ));
        let journal = Arc::new(PredictionJournal::new(config.journal_capacity));

        let orchestrator = Orchestrator::new(
            oracle,
            config.oracle.postures.clone(),
            Duration::from_secs(config.oracle.call_timeout_secs),
        );
        let predictor = PredictionService::new(
            &config,
            orchestrator,
            cache.clone(),
            latency.clone(),
            journal.clone(),
        );

        Self {
            runtime_config: config,
            started_at: Utc::now(),
            cache,
            latency,
            journal,
            predictor,
        }
    }

    /// Degraded when any operation's running average is over its threshold.
    pub fn health(&self) -> HealthSnapshot {
        let status = if self
            .latency
            .all_stats()
            .iter()
            .any(|s| s.status == HealthStatus::Degraded)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthSnapshot {
            status,
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            model: self.runtime_config.oracle.model.clone(),
            postures: self.runtime_config.oracle.postures.len(),
            cache: self.cache.stats(),
        }
    }
}
