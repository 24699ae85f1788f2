// =============================================================================
// Runtime Configuration — predictor settings with serde defaults
// =============================================================================
//
// Every tunable of the forecast engine lives here. All fields carry
// `#[serde(default)]` so that a partial (or empty) JSON file still loads, and
// adding new fields never breaks an older config file.
//
// Secrets never live in this file: the oracle API key is read from the
// environment only.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::oracle::Posture;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_top_p() -> f64 {
    0.9
}

fn default_call_timeout_secs() -> u64 {
    20
}

fn default_postures() -> Vec<Posture> {
    Posture::defaults()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_min_series_len() -> usize {
    10
}

fn default_analysis_window() -> usize {
    50
}

fn default_fingerprint_window() -> usize {
    10
}

fn default_audit_window() -> usize {
    10
}

fn default_monte_carlo_trials() -> usize {
    1000
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_sweep_interval_secs() -> u64 {
    300
}

fn default_latency_window() -> usize {
    100
}

fn default_latency_thresholds_ms() -> HashMap<String, u64> {
    HashMap::from([
        ("oracle_prediction".to_string(), 5000),
        ("audit_write".to_string(), 2000),
    ])
}

fn default_journal_capacity() -> usize {
    100
}

fn default_audit_timeout_ms() -> u64 {
    2000
}

// =============================================================================
// OracleConfig
// =============================================================================

/// Where and how the forecast oracle is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Hard bound on one oracle call. Exceeding it counts as a failure.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Calls issued per request, in submission order.
    #[serde(default = "default_postures")]
    pub postures: Vec<Posture>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            call_timeout_secs: default_call_timeout_secs(),
            postures: default_postures(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the forecast engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Server --------------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // --- Input & analysis ----------------------------------------------------

    /// Shortest series accepted by the predictor.
    #[serde(default = "default_min_series_len")]
    pub min_series_len: usize,

    /// Number of trailing points analysed and shown to the oracle.
    #[serde(default = "default_analysis_window")]
    pub analysis_window: usize,

    /// Number of trailing points hashed into the cache key.
    #[serde(default = "default_fingerprint_window")]
    pub fingerprint_window: usize,

    /// Number of trailing points attached to each audit record.
    #[serde(default = "default_audit_window")]
    pub audit_window: usize,

    #[serde(default = "default_monte_carlo_trials")]
    pub monte_carlo_trials: usize,

    /// Fixed seed for the Monte-Carlo estimate. `None` seeds from entropy.
    #[serde(default)]
    pub monte_carlo_seed: Option<u64>,

    // --- Cache ---------------------------------------------------------------

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,

    // --- Latency -------------------------------------------------------------

    #[serde(default = "default_latency_window")]
    pub latency_window: usize,

    /// Per-operation degradation thresholds in milliseconds.
    #[serde(default = "default_latency_thresholds_ms")]
    pub latency_thresholds_ms: HashMap<String, u64>,

    // --- Audit ---------------------------------------------------------------

    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,

    /// Bound on one audit write. An overrun is logged as a persistence failure.
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,

    // --- Oracle --------------------------------------------------------------

    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            min_series_len: default_min_series_len(),
            analysis_window: default_analysis_window(),
            fingerprint_window: default_fingerprint_window(),
            audit_window: default_audit_window(),
            monte_carlo_trials: default_monte_carlo_trials(),
            monte_carlo_seed: None,
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_sweep_interval_secs: default_cache_sweep_interval_secs(),
            latency_window: default_latency_window(),
            latency_thresholds_ms: default_latency_thresholds_ms(),
            journal_capacity: default_journal_capacity(),
            audit_timeout_ms: default_audit_timeout_ms(),
            oracle: OracleConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            model = %config.oracle.model,
            postures = config.oracle.postures.len(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply environment overrides on top of the file/default values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ORACLE_BASE_URL") {
            self.oracle.base_url = url;
        }
        if let Ok(model) = std::env::var("ORACLE_MODEL") {
            self.oracle.model = model;
        }
        if let Ok(addr) = std::env::var("PREDICTOR_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(seed) = std::env::var("MONTE_CARLO_SEED") {
            let seed = seed
                .trim()
                .parse::<u64>()
                .with_context(|| format!("MONTE_CARLO_SEED '{seed}' is not a u64"))?;
            self.monte_carlo_seed = Some(seed);
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.min_series_len, 10);
        assert_eq!(cfg.analysis_window, 50);
        assert_eq!(cfg.cache_capacity, 1000);
        assert_eq!(cfg.cache_ttl_secs, 300);
        assert_eq!(cfg.latency_window, 100);
        assert_eq!(cfg.latency_thresholds_ms.get("oracle_prediction"), Some(&5000));
        assert_eq!(cfg.oracle.postures.len(), 3);
        assert_eq!(cfg.oracle.postures[0].temperature, 0.3);
        assert_eq!(cfg.oracle.postures[2].temperature, 0.9);
        assert!(cfg.monte_carlo_seed.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.fingerprint_window, 10);
        assert_eq!(cfg.audit_timeout_ms, 2000);
        assert_eq!(cfg.oracle.model, "llama3-70b-8192");
        assert_eq!(cfg.oracle.call_timeout_secs, 20);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "cache_capacity": 5, "oracle": { "model": "mixtral" }, "monte_carlo_seed": 7 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.cache_capacity, 5);
        assert_eq!(cfg.oracle.model, "mixtral");
        assert_eq!(cfg.oracle.max_tokens, 1000);
        assert_eq!(cfg.monte_carlo_seed, Some(7));
        assert_eq!(cfg.oracle.postures[1].name, "balanced");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(RuntimeConfig::load("/definitely/not/here.json").is_err());
    }
}
