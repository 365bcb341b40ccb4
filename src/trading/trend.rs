//! Trend analysis: pure momentum classifier over a price history.

use statrs::statistics::Statistics;

use crate::models::InsightAction;

/// Samples from the tail of the history treated as the short-term window.
const SHORT_WINDOW: usize = 10;

/// Momentum (percent vs baseline) below which the signal stays HOLD.
const MOMENTUM_THRESHOLD_PCT: f64 = 0.5;

/// Output of [`analyze_trend`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSignal {
    pub action: InsightAction,
    /// 0-100, monotone in momentum magnitude
    pub confidence: u8,
    pub reason: String,
}

/// Classify the short-term momentum of an ordered price history.
///
/// Pure: the same slice always yields the same signal. Callers enforce a
/// minimum history length (50 points for autonomous entries, 20 for the
/// advisory fallback); anything shorter degrades to a zero-confidence HOLD.
pub fn analyze_trend(history: &[f64]) -> TrendSignal {
    if history.len() < 2 {
        return TrendSignal {
            action: InsightAction::Hold,
            confidence: 0,
            reason: "insufficient history".to_string(),
        };
    }

    let baseline = history.mean();
    let short_start = history.len().saturating_sub(SHORT_WINDOW);
    let short = history[short_start..].mean();

    if baseline == 0.0 {
        return TrendSignal {
            action: InsightAction::Hold,
            confidence: 0,
            reason: "degenerate price history".to_string(),
        };
    }

    let momentum = (short - baseline) / baseline * 100.0;

    let action = if momentum > MOMENTUM_THRESHOLD_PCT {
        InsightAction::Buy
    } else if momentum < -MOMENTUM_THRESHOLD_PCT {
        InsightAction::Sell
    } else {
        InsightAction::Hold
    };

    let confidence = (50.0 + momentum.abs() * 12.5).min(100.0) as u8;

    let reason = format!(
        "short-term mean {:+.2}% vs baseline over {} samples",
        momentum,
        history.len()
    );

    TrendSignal {
        action,
        confidence,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_deterministic() {
        let history = ramp(100.0, 0.3, 60);
        let a = analyze_trend(&history);
        let b = analyze_trend(&history);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rising_history_buys() {
        let history = ramp(100.0, 0.5, 60);
        let signal = analyze_trend(&history);
        assert_eq!(signal.action, InsightAction::Buy);
        assert!(signal.confidence > 50);
    }

    #[test]
    fn test_falling_history_sells() {
        let history = ramp(200.0, -0.5, 60);
        let signal = analyze_trend(&history);
        assert_eq!(signal.action, InsightAction::Sell);
        assert!(signal.confidence > 50);
    }

    #[test]
    fn test_flat_history_holds() {
        let history = vec![100.0; 60];
        let signal = analyze_trend(&history);
        assert_eq!(signal.action, InsightAction::Hold);
    }

    #[test]
    fn test_confidence_bounded_and_monotone() {
        let weak = analyze_trend(&ramp(100.0, 0.2, 60));
        let strong = analyze_trend(&ramp(100.0, 2.0, 60));

        assert!(weak.confidence <= 100);
        assert!(strong.confidence <= 100);
        assert!(strong.confidence >= weak.confidence);
    }

    #[test]
    fn test_short_history_degrades_to_hold() {
        let signal = analyze_trend(&[100.0]);
        assert_eq!(signal.action, InsightAction::Hold);
        assert_eq!(signal.confidence, 0);
    }
}
