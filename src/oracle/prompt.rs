// =============================================================================
// Prompt Builder — renders the analytics output into the oracle prompt
// =============================================================================
//
// The prompt is the only channel through which the analytics engine reaches
// the oracle. It ends with the exact JSON schema the vote decoder enforces.
// Secondary context (pattern summary, hash history) is passed through
// verbatim and never interpreted here.

use std::fmt::Write as _;

use crate::analytics::MarketAnalysis;
use crate::types::Strategy;

/// Caller-supplied context that rides along with the series.
#[derive(Debug, Clone, Default)]
pub struct PromptContext<'a> {
    pub strategy: Strategy,
    pub volatility_index: f64,
    pub pattern_summary: Option<&'a serde_json::Value>,
    pub hash_history: Option<&'a serde_json::Value>,
}

fn join_points(points: &[f64]) -> String {
    points
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn strategy_instructions(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Conservative => {
            "**CONSERVATIVE STRATEGY PARAMETERS**:
- Prioritize safety and risk minimization
- Favor predictions in 1.5x - 3.0x range
- High confidence threshold required
- Prefer \"Wait\" entry timing for uncertain conditions
- Risk level should not exceed 5/10
- Focus on pattern reliability over potential gains"
        }
        Strategy::Aggressive => {
            "**AGGRESSIVE STRATEGY PARAMETERS**:
- Maximize potential returns
- Consider higher crash point predictions (3x+)
- Accept higher risk levels (6-9/10)
- Favor \"Immediate\" entry timing
- Exploit streak break opportunities
- Weight momentum and volatility heavily"
        }
        Strategy::Balanced => {
            "**BALANCED STRATEGY PARAMETERS**:
- Balance risk and reward optimization
- Target 2.0x - 5.0x prediction range
- Moderate confidence and risk levels
- Adaptive entry timing based on conditions
- Consider both safety and opportunity
- Integrate multiple analytical approaches"
        }
    }
}

/// Render the full prompt. `recent` is the analysed window, most-recent-last.
pub fn build_prompt(recent: &[f64], analysis: &MarketAnalysis, ctx: &PromptContext<'_>) -> String {
    let s = &analysis.snapshot;
    let streaks = &analysis.streaks;
    let last10 = &recent[recent.len().saturating_sub(10)..];
    let last5 = &recent[recent.len().saturating_sub(5)..];

    // `write!` into a String cannot fail; results are discarded.
    let mut out = String::with_capacity(4096);

    let _ = writeln!(out, "# CRASH SERIES FORECAST REQUEST\n");
    let _ = writeln!(
        out,
        "You are a forecasting model for a repeating crash-multiplier process. Analyse the data below and answer with a single JSON object.\n"
    );

    let _ = writeln!(out, "## MISSION PARAMETERS");
    let _ = writeln!(out, "- **Strategy Mode**: {}", ctx.strategy);
    let _ = writeln!(out, "- **Volatility Index**: {}", ctx.volatility_index);
    let _ = writeln!(out, "- **Data Quality**: {} crash points available\n", recent.len());

    let _ = writeln!(out, "## HISTORICAL CRASH DATA (oldest first)");
    let _ = writeln!(out, "**Last {} Rounds**: [{}]", recent.len(), join_points(recent));
    let _ = writeln!(out, "**Last 10 Rounds**: [{}]", join_points(last10));
    let _ = writeln!(out, "**Last 5 Rounds**: [{}]\n", join_points(last5));

    let _ = writeln!(out, "## ADVANCED ANALYTICS");
    let _ = writeln!(out, "**Statistical Metrics**:");
    let _ = writeln!(out, "- Mean: {:.3}x", s.mean);
    let _ = writeln!(out, "- Median: {:.3}x", s.median);
    let _ = writeln!(out, "- Standard Deviation: {:.3}", s.std_dev);
    let _ = writeln!(out, "- Variance: {:.3}", s.variance);
    let _ = writeln!(out, "- Skewness: {:.3}", s.skewness);
    let _ = writeln!(out, "- Kurtosis: {:.3}\n", s.kurtosis);

    let _ = writeln!(out, "**Distribution Analysis**:");
    let _ = writeln!(out, "- Low crashes (<2.0x): {} ({:.1}%)", s.low.count, s.low.percentage);
    let _ = writeln!(out, "- Medium crashes (2.0x-5.0x): {} ({:.1}%)", s.mid.count, s.mid.percentage);
    let _ = writeln!(out, "- High crashes (>5.0x): {} ({:.1}%)\n", s.high.count, s.high.percentage);

    let _ = writeln!(out, "**Volatility Indicators**:");
    let _ = writeln!(out, "- Recent volatility: {:.3}", s.recent_volatility);
    let _ = writeln!(out, "- Trend direction: {}", s.trend_direction);
    let _ = writeln!(out, "- Momentum: {:.3}\n", s.momentum);

    let _ = writeln!(out, "## PATTERN RECOGNITION");
    let _ = writeln!(out, "**Detected Patterns**:");
    if analysis.patterns.is_empty() {
        let _ = writeln!(out, "- None");
    }
    for p in &analysis.patterns {
        let _ = writeln!(out, "- {}: {} (Confidence: {})", p.kind, p.description, p.confidence);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "**Streak Analysis**:");
    let _ = writeln!(out, "- Current streak: {} {} rounds", streaks.current.count, streaks.current.kind);
    let _ = writeln!(out, "- Longest streak: {} {} rounds", streaks.longest.count, streaks.longest.kind);
    let _ = writeln!(out, "- Streak break probability: {:.1}%\n", streaks.break_probability);

    let _ = writeln!(out, "**Cycle Analysis**:");
    match analysis.patterns.first() {
        Some(p) => {
            let _ = writeln!(out, "- Pattern cycle: {}", p.cycle);
        }
        None => {
            let _ = writeln!(out, "- Pattern cycle: No clear cycle");
        }
    }
    let _ = writeln!(out, "- Correction probability: {:.1}%\n", s.correction_probability);

    if ctx.pattern_summary.is_some() || ctx.hash_history.is_some() {
        let _ = writeln!(out, "## CALLER CONTEXT");
        if let Some(summary) = ctx.pattern_summary {
            let _ = writeln!(out, "- Pattern summary: {summary}");
        }
        if let Some(history) = ctx.hash_history {
            let _ = writeln!(out, "- Hash history: {history}");
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## STRATEGY-SPECIFIC INSTRUCTIONS\n");
    let _ = writeln!(out, "{}\n", strategy_instructions(ctx.strategy));

    let _ = writeln!(out, "## MATHEMATICAL MODELS");
    let _ = writeln!(out, "1. **Harmonic Mean Reversion**: {:.3}x", s.harmonic_mean);
    let _ = writeln!(out, "2. **Fibonacci Retracement**: {:.3}x", s.fibonacci_level);
    let _ = writeln!(out, "3. **Bollinger Band Midpoint**: {:.3}x", s.bollinger_prediction);
    let _ = writeln!(out, "4. **Monte Carlo Simulation**: {:.3}x\n", s.monte_carlo_estimate);

    let _ = writeln!(out, "## RISK ASSESSMENT MATRIX");
    let _ = writeln!(out, "- **Market Condition**: {}", s.market_condition);
    let _ = writeln!(out, "- **Entry Risk**: {}/10", s.entry_risk);
    let _ = writeln!(out, "- **Volatility Risk**: {}/10", ctx.volatility_index);
    let _ = writeln!(out, "- **Pattern Reliability**: {}/10\n", s.pattern_reliability);

    let _ = writeln!(out, "## OUTPUT REQUIREMENTS");
    let _ = writeln!(out, "Respond with EXACTLY this JSON format (no additional text):\n");
    let _ = write!(
        out,
        r#"{{
    "prediction": "X.XXx",
    "confidence": "Low|Medium|High|EXTREME",
    "comment": "Technical reasoning (max 150 chars)",
    "strategy": "{}",
    "entry_timing": "Immediate|Wait 1-2 rounds|Wait 3+ rounds",
    "risk_level": 1-10,
    "pattern_signal": "bullish|bearish|neutral",
    "mathematical_basis": "Primary model used for prediction",
    "streak_factor": "How current streak affects prediction",
    "volatility_adjustment": "How volatility influenced the prediction"
}}"#,
        ctx.strategy
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::analyze;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample() -> (Vec<f64>, MarketAnalysis) {
        let pts = vec![1.2, 3.0, 1.5, 4.0, 1.1, 2.2, 1.05, 6.4, 1.9, 2.7, 1.3, 1.4];
        let analysis = analyze(&pts, 100, &mut StdRng::seed_from_u64(1)).unwrap();
        (pts, analysis)
    }

    #[test]
    fn prompt_carries_schema_and_strategy() {
        let (pts, analysis) = sample();
        let ctx = PromptContext {
            strategy: Strategy::Aggressive,
            ..Default::default()
        };
        let prompt = build_prompt(&pts, &analysis, &ctx);
        assert!(prompt.contains("\"strategy\": \"Aggressive\""));
        assert!(prompt.contains("AGGRESSIVE STRATEGY PARAMETERS"));
        for field in [
            "prediction",
            "confidence",
            "comment",
            "entry_timing",
            "risk_level",
            "pattern_signal",
            "mathematical_basis",
            "streak_factor",
            "volatility_adjustment",
        ] {
            assert!(prompt.contains(&format!("\"{field}\"")), "missing {field}");
        }
    }

    #[test]
    fn prompt_includes_windows_and_streaks() {
        let (pts, analysis) = sample();
        let prompt = build_prompt(&pts, &analysis, &PromptContext::default());
        assert!(prompt.contains("**Last 5 Rounds**: [6.4, 1.9, 2.7, 1.3, 1.4]"));
        assert!(prompt.contains("Current streak: 2 low rounds"));
        assert!(prompt.contains("Alternating"));
        assert!(!prompt.contains("CALLER CONTEXT"));
    }

    #[test]
    fn caller_context_is_passed_through() {
        let (pts, analysis) = sample();
        let summary = serde_json::json!({ "note": "three lows" });
        let ctx = PromptContext {
            pattern_summary: Some(&summary),
            ..Default::default()
        };
        let prompt = build_prompt(&pts, &analysis, &ctx);
        assert!(prompt.contains("CALLER CONTEXT"));
        assert!(prompt.contains("three lows"));
    }
}
