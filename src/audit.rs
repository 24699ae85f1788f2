// =============================================================================
// Audit — record of every answered prediction
// =============================================================================
//
// The predictor hands each final result to an `AuditSink`. Sink failures are
// the predictor's to log; they never change the response. The in-process
// implementation is a bounded journal that the REST layer can read back.
// =============================================================================

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::consensus::ConsensusResult;
use crate::error::PredictError;
use crate::types::{ConfidenceLabel, Strategy};

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub prediction: String,
    pub confidence: ConfidenceLabel,
    /// Strategy the caller asked for.
    pub requested_strategy: Strategy,
    /// Strategy reported on the result.
    pub strategy: String,
    pub risk_level: u8,
    pub models_used: usize,
    pub fallback: bool,
    /// Trailing slice of the request series.
    pub crash_points: Vec<f64>,
}

impl AuditRecord {
    pub fn new(result: &ConsensusResult, requested_strategy: Strategy, crash_points: &[f64]) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            prediction: result.prediction.clone(),
            confidence: result.confidence,
            requested_strategy,
            strategy: result.strategy.clone(),
            risk_level: result.risk_level,
            models_used: result.models_used,
            fallback: result.fallback,
            crash_points: crash_points.to_vec(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: AuditRecord) -> Result<(), PredictError>;
}

/// In-memory ring of the most recent records.
pub struct PredictionJournal {
    capacity: usize,
    records: RwLock<VecDeque<AuditRecord>>,
}

impl PredictionJournal {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        self.records.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[async_trait]
impl AuditSink for PredictionJournal {
    async fn write(&self, record: AuditRecord) -> Result<(), PredictError> {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;

    #[tokio::test]
    async fn journal_keeps_newest_records() {
        let journal = PredictionJournal::new(3);
        let result = fallback::generate(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        for i in 0..5 {
            let record = AuditRecord::new(&result, Strategy::Balanced, &[i as f64 + 1.0]);
            journal.write(record).await.unwrap();
        }
        assert_eq!(journal.len(), 3);
        let recent = journal.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].crash_points, vec![5.0]);
        assert_eq!(recent[2].crash_points, vec![3.0]);
        assert_eq!(journal.recent(1).len(), 1);
    }

    #[test]
    fn record_copies_result_fields() {
        let result = fallback::canned();
        let record = AuditRecord::new(&result, Strategy::Aggressive, &[1.5, 2.5]);
        assert_eq!(record.prediction, "2.15x");
        assert_eq!(record.strategy, "Conservative");
        assert_eq!(record.requested_strategy, Strategy::Aggressive);
        assert!(record.fallback);
        assert_eq!(record.id.len(), 36);
    }
}
