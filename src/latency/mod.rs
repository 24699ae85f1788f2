// =============================================================================
// Latency
// =============================================================================

pub mod monitor;

pub use monitor::{HealthStatus, LatencyMonitor};

/// Operation name for one full oracle fan-out.
pub const ORACLE_PREDICTION: &str = "oracle_prediction";

/// Operation name for one audit sink write.
pub const AUDIT_WRITE: &str = "audit_write";
