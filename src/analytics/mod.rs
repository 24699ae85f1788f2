// =============================================================================
// Analytics Engine
// =============================================================================
//
// Pure, stateless reduction of an observation series into a statistical
// snapshot, pattern signals and streak state. Safe to call from any number of
// concurrent requests; the only external input is the caller's random source
// for the Monte-Carlo estimate.

pub mod patterns;
pub mod stats;
pub mod streaks;

use rand::RngCore;
use serde::Serialize;

pub use patterns::{detect_patterns, PatternSignal};
pub use stats::{mean, median, AnalyticsSnapshot};
pub use streaks::{analyze_streaks, StreakState};

/// Everything the engine derives from one series.
#[derive(Debug, Clone, Serialize)]
pub struct MarketAnalysis {
    pub snapshot: AnalyticsSnapshot,
    pub patterns: Vec<PatternSignal>,
    pub streaks: StreakState,
}

/// Analyse `points`. Returns `None` when the series is empty.
pub fn analyze(points: &[f64], trials: usize, rng: &mut dyn RngCore) -> Option<MarketAnalysis> {
    let streaks = analyze_streaks(points)?;
    Some(MarketAnalysis {
        snapshot: stats::build_snapshot(points, trials, rng),
        patterns: detect_patterns(points),
        streaks,
    })
}
