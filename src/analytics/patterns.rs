// =============================================================================
// Pattern Detection — alternating, trend and clustering scans
// =============================================================================
//
// Three independent scans over the same series. Any combination may fire; the
// output order is always alternating, ascending, descending, clustering.
//
//   Alternating : interior triplets whose low/not-low bucket flips and flips
//                 back. >= 3 triplets => confidence min(95, 15 * count).
//   Trend       : > 70 % of consecutive deltas strictly positive (negative)
//                 => Ascending (Descending), confidence = matching share.
//   Clustering  : greedy single-pass clustering against a running centroid
//                 (tolerance 0.5). >= 2 clusters of >= 3 members => fixed
//                 confidence 75.
// =============================================================================

use serde::{Serialize, Serializer};
use tracing::trace;

use crate::types::LOW_THRESHOLD;

/// Minimum number of flip-back triplets before an alternating pattern fires.
const MIN_ALTERNATIONS: usize = 3;
/// Share of deltas that must move in one direction for a trend pattern.
const TREND_SHARE: f64 = 0.7;
/// Maximum distance from a cluster centroid for a point to join it.
const CLUSTER_TOLERANCE: f64 = 0.5;
/// Members required for a cluster to count.
const MIN_CLUSTER_SIZE: usize = 3;
/// Qualifying clusters required before a clustering pattern fires.
const MIN_CLUSTERS: usize = 2;
const CLUSTER_CONFIDENCE: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PatternKind {
    Alternating,
    Ascending,
    Descending,
    Clustering,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alternating => write!(f, "Alternating"),
            Self::Ascending => write!(f, "Ascending"),
            Self::Descending => write!(f, "Descending"),
            Self::Clustering => write!(f, "Clustering"),
        }
    }
}

/// Cycle length of a pattern, or a marker that it is a directional trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Period(usize),
    Trend,
}

impl Serialize for Cycle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Period(n) => serializer.serialize_u64(*n as u64),
            Self::Trend => serializer.serialize_str("trend"),
        }
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Period(n) => write!(f, "{n}"),
            Self::Trend => write!(f, "trend"),
        }
    }
}

/// A detected structural pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSignal {
    pub kind: PatternKind,
    pub description: String,
    /// 0–100.
    pub confidence: u8,
    pub cycle: Cycle,
}

/// A cluster built by [`find_clusters`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub centroid: f64,
    pub members: Vec<f64>,
}

/// Run all three scans and return every signal that fired.
pub fn detect_patterns(points: &[f64]) -> Vec<PatternSignal> {
    let mut signals = Vec::new();

    let alternations = count_alternations(points);
    if alternations >= MIN_ALTERNATIONS {
        signals.push(PatternSignal {
            kind: PatternKind::Alternating,
            description: "High-Low alternating pattern detected".to_string(),
            confidence: (alternations * 15).min(95) as u8,
            cycle: Cycle::Period(2),
        });
    }

    let deltas = points.len().saturating_sub(1);
    if deltas > 0 {
        let rising = points.windows(2).filter(|w| w[1] > w[0]).count();
        let falling = points.windows(2).filter(|w| w[1] < w[0]).count();

        if rising as f64 > deltas as f64 * TREND_SHARE {
            signals.push(PatternSignal {
                kind: PatternKind::Ascending,
                description: "Strong upward trend detected".to_string(),
                confidence: share_pct(rising, deltas),
                cycle: Cycle::Trend,
            });
        }
        if falling as f64 > deltas as f64 * TREND_SHARE {
            signals.push(PatternSignal {
                kind: PatternKind::Descending,
                description: "Strong downward trend detected".to_string(),
                confidence: share_pct(falling, deltas),
                cycle: Cycle::Trend,
            });
        }
    }

    let clusters = find_clusters(points);
    if clusters.len() >= MIN_CLUSTERS {
        signals.push(PatternSignal {
            kind: PatternKind::Clustering,
            description: format!("{} distinct value clusters identified", clusters.len()),
            confidence: CLUSTER_CONFIDENCE,
            cycle: Cycle::Period(clusters.len()),
        });
    }

    trace!(
        len = points.len(),
        alternations,
        clusters = clusters.len(),
        fired = signals.len(),
        "pattern scan complete"
    );

    signals
}

fn share_pct(matching: usize, total: usize) -> u8 {
    (matching as f64 / total as f64 * 100.0).round() as u8
}

/// Count interior triplets `(a, b, c)` where `b` sits on the other side of the
/// low threshold from both neighbours.
pub fn count_alternations(points: &[f64]) -> usize {
    points
        .windows(3)
        .filter(|w| {
            let (a, b, c) = (w[0] < LOW_THRESHOLD, w[1] < LOW_THRESHOLD, w[2] < LOW_THRESHOLD);
            a == c && a != b
        })
        .count()
}

/// Greedy single-pass clustering. Each point joins the first cluster whose
/// running centroid lies within the tolerance, otherwise opens a new cluster.
/// Only clusters with at least three members are returned.
pub fn find_clusters(points: &[f64]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();

    for &point in points {
        match clusters
            .iter_mut()
            .find(|c| (c.centroid - point).abs() <= CLUSTER_TOLERANCE)
        {
            Some(cluster) => {
                cluster.members.push(point);
                let n = cluster.members.len() as f64;
                cluster.centroid += (point - cluster.centroid) / n;
            }
            None => clusters.push(Cluster {
                centroid: point,
                members: vec![point],
            }),
        }
    }

    clusters.retain(|c| c.members.len() >= MIN_CLUSTER_SIZE);
    clusters
}
