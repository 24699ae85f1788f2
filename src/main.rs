// =============================================================================
// Crash Forecast Service — Main Entry Point
// =============================================================================
//
// Aggregates several forecast-oracle answers about the next value of a
// crash-multiplier series into one consensus forecast, with a deterministic
// fallback when no oracle answers.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analytics;
mod api;
mod app_state;
mod audit;
mod cache;
mod consensus;
mod error;
mod fallback;
mod latency;
mod oracle;
mod orchestrator;
mod predictor;
mod runtime_config;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::oracle::ChatCompletionClient;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "predictor_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Crash Forecast Service starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides()?;

    info!(
        model = %config.oracle.model,
        postures = config.oracle.postures.len(),
        min_series_len = config.min_series_len,
        cache_capacity = config.cache_capacity,
        cache_ttl_secs = config.cache_ttl_secs,
        seeded = config.monte_carlo_seed.is_some(),
        "Configuration loaded"
    );

    // ── 2. Oracle client ─────────────────────────────────────────────────
    let api_key = std::env::var("ORACLE_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("ORACLE_API_KEY not set — every oracle call will fail and answers will come from the fallback");
    }
    let oracle = Arc::new(ChatCompletionClient::new(&config.oracle, &api_key)?);

    // ── 3. Shared state ──────────────────────────────────────────────────
    let sweep_interval = Duration::from_secs(config.cache_sweep_interval_secs.max(1));
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, oracle));

    // ── 4. Background cache sweep ────────────────────────────────────────
    let sweeper = cache::spawn_sweeper(state.cache.clone(), sweep_interval);

    // ── 5. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        warn!("Shutdown signal received — stopping gracefully");
    });

    if let Err(e) = server.await {
        error!(error = %e, "API server failed");
    }

    // ── 6. Shutdown ──────────────────────────────────────────────────────
    sweeper.abort();
    let cache = state.cache.stats();
    info!(
        cache_hits = cache.hits,
        cache_misses = cache.misses,
        journal_records = state.journal.len(),
        "Crash Forecast Service shut down complete."
    );
    Ok(())
}
