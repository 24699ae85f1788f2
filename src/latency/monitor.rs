// =============================================================================
// Latency Monitor — per-operation sliding windows and degradation signals
// =============================================================================
//
// Each named operation keeps the last `window` samples. Recording a sample
// that exceeds the operation's threshold yields a `DegradationSignal` in the
// returned outcome; the monitor itself never acts on it.
//
// Percentiles index the sorted window at floor(n × q), clamped to the last
// element. No interpolation.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub operation: String,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub operation: String,
    pub count: usize,
    /// Rounded mean.
    pub average_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub threshold_ms: Option<u64>,
    pub status: HealthStatus,
}

/// A single sample crossed its operation's threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationSignal {
    pub operation: String,
    pub duration_ms: u64,
    pub threshold_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub stats: OperationStats,
    pub degradation: Option<DegradationSignal>,
}

pub struct LatencyMonitor {
    window: usize,
    windows: Mutex<HashMap<String, VecDeque<LatencyRecord>>>,
    thresholds: RwLock<HashMap<String, u64>>,
}

fn percentile(sorted: &[u64], q: f64) -> u64 {
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn summarise(
    operation: &str,
    samples: &VecDeque<LatencyRecord>,
    threshold_ms: Option<u64>,
) -> Option<OperationStats> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted: Vec<u64> = samples.iter().map(|r| r.duration_ms).collect();
    sorted.sort_unstable();

    let sum: u64 = sorted.iter().sum();
    let average = sum as f64 / sorted.len() as f64;
    // Status uses the unrounded mean; only the reported figure is rounded.
    let status = match threshold_ms {
        Some(t) if average > t as f64 => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    };

    Some(OperationStats {
        operation: operation.to_string(),
        count: sorted.len(),
        average_ms: average.round() as u64,
        min_ms: sorted[0],
        max_ms: sorted[sorted.len() - 1],
        p50_ms: percentile(&sorted, 0.50),
        p95_ms: percentile(&sorted, 0.95),
        p99_ms: percentile(&sorted, 0.99),
        threshold_ms,
        status,
    })
}

impl LatencyMonitor {
    /// `window` is clamped to at least one sample.
    pub fn new(window: usize, thresholds: HashMap<String, u64>) -> Self {
        Self {
            window: window.max(1),
            windows: Mutex::new(HashMap::new()),
            thresholds: RwLock::new(thresholds),
        }
    }

    pub fn threshold(&self, operation: &str) -> Option<u64> {
        self.thresholds.read().get(operation).copied()
    }

    pub fn set_threshold(&self, operation: impl Into<String>, threshold_ms: u64) {
        self.thresholds.write().insert(operation.into(), threshold_ms);
    }

    /// Append one sample and return the updated summary.
    pub fn record(&self, operation: &str, duration_ms: u64) -> RecordOutcome {
        let threshold_ms = self.threshold(operation);

        let stats = {
            let mut windows = self.windows.lock();
            let samples = windows.entry(operation.to_string()).or_default();
            samples.push_back(LatencyRecord {
                operation: operation.to_string(),
                duration_ms,
                recorded_at: Utc::now(),
            });
            while samples.len() > self.window {
                samples.pop_front();
            }
            summarise(operation, samples, threshold_ms)
        };

        let degradation = match threshold_ms {
            Some(t) if duration_ms > t => {
                warn!(
                    operation,
                    duration_ms,
                    threshold_ms = t,
                    "latency threshold exceeded"
                );
                Some(DegradationSignal {
                    operation: operation.to_string(),
                    duration_ms,
                    threshold_ms: t,
                })
            }
            _ => None,
        };

        RecordOutcome {
            // A window that was just appended to is never empty.
            stats: stats.unwrap_or_else(|| OperationStats {
                operation: operation.to_string(),
                count: 0,
                average_ms: 0,
                min_ms: 0,
                max_ms: 0,
                p50_ms: 0,
                p95_ms: 0,
                p99_ms: 0,
                threshold_ms,
                status: HealthStatus::Healthy,
            }),
            degradation,
        }
    }

    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        let threshold_ms = self.threshold(operation);
        let windows = self.windows.lock();
        summarise(operation, windows.get(operation)?, threshold_ms)
    }

    /// Summaries for every operation seen so far, sorted by name.
    pub fn all_stats(&self) -> Vec<OperationStats> {
        let thresholds = self.thresholds.read().clone();
        let windows = self.windows.lock();
        let mut out: Vec<OperationStats> = windows
            .iter()
            .filter_map(|(op, samples)| summarise(op, samples, thresholds.get(op).copied()))
            .collect();
        out.sort_by(|a, b| a.operation.cmp(&b.operation));
        out
    }

    /// Drop all samples. Thresholds are kept.
    pub fn reset(&self) {
        self.windows.lock().clear();
    }
}
