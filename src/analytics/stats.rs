// =============================================================================
// Descriptive Statistics — moments, buckets, trend, model estimates
// =============================================================================
//
// All moments use population (divide-by-n) formulas. Skewness is E[z^3] and
// kurtosis is reported as *excess* kurtosis E[z^4] - 3, where z = (x - μ)/σ.
// A flat series (σ = 0) reports both higher moments as 0.0.
//
// Bucketing:
//   low  : x <  2.0
//   mid  : 2.0 <= x <= 5.0
//   high : x >  5.0
// =============================================================================

use std::ops::RangeInclusive;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::types::{HIGH_THRESHOLD, LOW_THRESHOLD};

/// Number of trailing points used for the recent-volatility reading.
const RECENT_WINDOW: usize = 10;

/// Number of points averaged at each end of the series for the trend reading.
const TREND_EDGE: usize = 5;

/// Golden ratio multiplier for the Fibonacci level.
const GOLDEN_RATIO: f64 = 1.618;

/// Half-width of the uniform perturbation applied per Monte-Carlo trial.
const MONTE_CARLO_SPREAD: f64 = 0.25;

/// Per-trial scale factor range, both ends included.
const PERTURBATION: RangeInclusive<f64> = -MONTE_CARLO_SPREAD..=MONTE_CARLO_SPREAD;

/// Direction of travel between the start and end of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Upward,
    Downward,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upward => write!(f, "upward"),
            Self::Downward => write!(f, "downward"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Recent volatility relative to the whole-series standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCondition {
    Volatile,
    Stable,
    Calm,
}

impl std::fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volatile => write!(f, "volatile"),
            Self::Stable => write!(f, "stable"),
            Self::Calm => write!(f, "calm"),
        }
    }
}

/// Count and share of one observation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketShare {
    pub count: usize,
    /// Percentage of the series in this bucket (0–100).
    pub percentage: f64,
}

/// Derived statistics of an observation series. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub sample_size: usize,
    pub mean: f64,
    pub median: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub skewness: f64,
    /// Excess kurtosis (normal distribution = 0).
    pub kurtosis: f64,
    pub low: BucketShare,
    pub mid: BucketShare,
    pub high: BucketShare,
    pub recent_volatility: f64,
    pub trend_direction: TrendDirection,
    pub momentum: f64,
    pub harmonic_mean: f64,
    pub fibonacci_level: f64,
    /// Midpoint of mean ± 2σ. Algebraically identical to `mean`; kept only
    /// because downstream consumers expect the field.
    pub bollinger_prediction: f64,
    pub monte_carlo_estimate: f64,
    pub market_condition: MarketCondition,
    /// 1–10.
    pub entry_risk: u8,
    /// 1–10.
    pub pattern_reliability: u8,
    /// 0–100.
    pub correction_probability: f64,
}

// -----------------------------------------------------------------------------
// Moments
// -----------------------------------------------------------------------------

pub fn mean(points: &[f64]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().sum::<f64>() / points.len() as f64
}

/// Median of the ascending-sorted series; average of the two middles on even
/// counts.
pub fn median(points: &[f64]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Population variance.
pub fn variance(points: &[f64]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let m = mean(points);
    points.iter().map(|x| (x - m).powi(2)).sum::<f64>() / points.len() as f64
}

/// Population standard deviation.
pub fn std_dev(points: &[f64]) -> f64 {
    variance(points).sqrt()
}

/// Mean of the standardised values raised to `power`. Zero when σ = 0.
fn standardised_moment(points: &[f64], m: f64, sigma: f64, power: i32) -> f64 {
    if points.is_empty() || sigma < f64::EPSILON {
        return 0.0;
    }
    points
        .iter()
        .map(|x| ((x - m) / sigma).powi(power))
        .sum::<f64>()
        / points.len() as f64
}

pub fn harmonic_mean(points: &[f64]) -> f64 {
    let reciprocal_sum: f64 = points.iter().map(|x| 1.0 / x).sum();
    if reciprocal_sum <= 0.0 {
        return 0.0;
    }
    points.len() as f64 / reciprocal_sum
}

// -----------------------------------------------------------------------------
// Trend
// -----------------------------------------------------------------------------

/// Compare the average of the first five points against the last five.
/// Returns the direction and the relative change (momentum).
pub fn trend(points: &[f64]) -> (TrendDirection, f64) {
    let head = &points[..points.len().min(TREND_EDGE)];
    let tail = &points[points.len().saturating_sub(TREND_EDGE)..];
    let first_avg = mean(head);
    let last_avg = mean(tail);

    let direction = if last_avg > first_avg {
        TrendDirection::Upward
    } else if last_avg < first_avg {
        TrendDirection::Downward
    } else {
        TrendDirection::Stable
    };

    let momentum = if first_avg != 0.0 {
        (last_avg - first_avg) / first_avg
    } else {
        0.0
    };

    (direction, momentum)
}

// -----------------------------------------------------------------------------
// Monte Carlo
// -----------------------------------------------------------------------------

/// Resample-and-perturb estimate of the next observation.
///
/// Each trial draws one historical point uniformly at random, scales it by a
/// uniform factor in [-25 %, +25 %], and floors the result at 1.0. The
/// estimate is the average over all trials. The caller owns the random
/// source, so a seeded generator yields a reproducible estimate.
pub fn monte_carlo_estimate(points: &[f64], trials: usize, rng: &mut dyn RngCore) -> f64 {
    if points.is_empty() || trials == 0 {
        return 0.0;
    }

    let mut total = 0.0;
    for _ in 0..trials {
        let sample = points[rng.gen_range(0..points.len())];
        let variation = rng.gen_range(PERTURBATION);
        total += (sample * (1.0 + variation)).max(1.0);
    }
    total / trials as f64
}

// -----------------------------------------------------------------------------
// Snapshot
// -----------------------------------------------------------------------------

fn bucket_share(count: usize, n: usize) -> BucketShare {
    BucketShare {
        count,
        percentage: count as f64 / n as f64 * 100.0,
    }
}

/// Build the full statistical snapshot. `points` must be non-empty.
pub fn build_snapshot(points: &[f64], trials: usize, rng: &mut dyn RngCore) -> AnalyticsSnapshot {
    let n = points.len();
    let m = mean(points);
    let var = variance(points);
    let sigma = var.sqrt();

    let low_count = points.iter().filter(|&&p| p < LOW_THRESHOLD).count();
    let mid_count = points
        .iter()
        .filter(|&&p| (LOW_THRESHOLD..=HIGH_THRESHOLD).contains(&p))
        .count();
    let high_count = points.iter().filter(|&&p| p > HIGH_THRESHOLD).count();

    let recent = &points[n.saturating_sub(RECENT_WINDOW)..];
    let recent_volatility = std_dev(recent);

    let (trend_direction, momentum) = trend(points);

    let kurtosis = if sigma < f64::EPSILON {
        0.0
    } else {
        standardised_moment(points, m, sigma, 4) - 3.0
    };

    let bollinger_upper = m + 2.0 * sigma;
    let bollinger_lower = m - 2.0 * sigma;

    let market_condition = if recent_volatility > sigma * 1.5 {
        MarketCondition::Volatile
    } else if recent_volatility < sigma * 0.5 {
        MarketCondition::Calm
    } else {
        MarketCondition::Stable
    };

    let entry_risk = (recent_volatility * 3.0).round().clamp(1.0, 10.0) as u8;
    let pattern_reliability = (10.0 - sigma * 2.0).round().clamp(1.0, 10.0) as u8;
    let correction_probability = if low_count as f64 > n as f64 * 0.6 {
        80.0
    } else if high_count as f64 > n as f64 * 0.3 {
        70.0
    } else {
        50.0
    };

    AnalyticsSnapshot {
        sample_size: n,
        mean: m,
        median: median(points),
        variance: var,
        std_dev: sigma,
        skewness: standardised_moment(points, m, sigma, 3),
        kurtosis,
        low: bucket_share(low_count, n),
        mid: bucket_share(mid_count, n),
        high: bucket_share(high_count, n),
        recent_volatility,
        trend_direction,
        momentum,
        harmonic_mean: harmonic_mean(points),
        fibonacci_level: m * GOLDEN_RATIO,
        bollinger_prediction: (bollinger_upper + bollinger_lower) / 2.0,
        monte_carlo_estimate: monte_carlo_estimate(points, trials, rng),
        market_condition,
        entry_risk,
        pattern_reliability,
        correction_probability,
    }
}
