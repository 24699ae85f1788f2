// =============================================================================
// Streak Analysis — run lengths over a low/high split at 2.0
// =============================================================================

use serde::Serialize;

use crate::types::LOW_THRESHOLD;

/// Current streaks shorter than this keep the base break probability.
const MIN_STREAK_FOR_ADJUSTMENT: usize = 3;
const BASE_BREAK_PROBABILITY: f64 = 50.0;
const BREAK_PROBABILITY_STEP: f64 = 8.0;
const MAX_BREAK_PROBABILITY: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakKind {
    Low,
    High,
}

impl StreakKind {
    pub fn of(value: f64) -> Self {
        if value < LOW_THRESHOLD {
            Self::Low
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for StreakKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A maximal run of same-bucket observations. `count` is always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Streak {
    pub count: usize,
    pub kind: StreakKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreakState {
    pub current: Streak,
    pub longest: Streak,
    /// 0–100.
    pub break_probability: f64,
}

/// Analyse run lengths. Returns `None` for an empty series.
pub fn analyze_streaks(points: &[f64]) -> Option<StreakState> {
    let last = *points.last()?;

    // Current streak: walk backward from the last point.
    let kind = StreakKind::of(last);
    let count = points
        .iter()
        .rev()
        .take_while(|&&p| StreakKind::of(p) == kind)
        .count();
    let current = Streak { count, kind };

    // Longest streak: forward scan; the first maximal run wins ties.
    let mut longest = Streak {
        count: 0,
        kind: StreakKind::of(points[0]),
    };
    let mut run = Streak {
        count: 0,
        kind: StreakKind::of(points[0]),
    };
    for &p in points {
        let k = StreakKind::of(p);
        if k == run.kind {
            run.count += 1;
        } else {
            if run.count > longest.count {
                longest = run;
            }
            run = Streak { count: 1, kind: k };
        }
    }
    if run.count > longest.count {
        longest = run;
    }

    Some(StreakState {
        current,
        longest,
        break_probability: break_probability(current.count),
    })
}

/// 50 % base; from three in a row onward, 50 + 8 per streak member, capped
/// at 90 %.
pub fn break_probability(current_count: usize) -> f64 {
    if current_count < MIN_STREAK_FOR_ADJUSTMENT {
        return BASE_BREAK_PROBABILITY;
    }
    (BASE_BREAK_PROBABILITY + current_count as f64 * BREAK_PROBABILITY_STEP)
        .min(MAX_BREAK_PROBABILITY)
}
