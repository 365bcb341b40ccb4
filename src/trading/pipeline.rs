//! Decision pipeline: races the external advisory service against a local
//! fallback, and audits closed-trade performance.

use std::time::Duration;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::api::{AdvisorClient, ReviewRequest};
use crate::models::{Insight, InsightAction, PerformanceAudit, Provenance, Rating, Trade};
use crate::trading::trend::analyze_trend;

/// How long the external advisory call may run before the fallback wins.
pub const ADVISORY_TIMEOUT: Duration = Duration::from_millis(6500);

/// Minimum history length for the trend-based fallback.
const MIN_FALLBACK_HISTORY: usize = 20;

/// 24h-change threshold (percent) for the minimal heuristic.
const HEURISTIC_CHANGE_PCT: f64 = 2.0;

/// Fixed confidence of the minimal heuristic.
const HEURISTIC_CONFIDENCE: u8 = 70;

/// Volatility constant used to synthesize support/resistance in fallbacks.
fn asset_volatility(pair: &str) -> Decimal {
    match pair {
        "BTC-USD" => dec!(0.025),
        "ETH-USD" => dec!(0.04),
        "SOL-USD" => dec!(0.06),
        _ => dec!(0.05),
    }
}

/// Orchestrates insight generation and performance audits.
pub struct DecisionPipeline {
    advisor: AdvisorClient,
}

impl DecisionPipeline {
    pub fn new(advisor: AdvisorClient) -> Self {
        Self { advisor }
    }

    /// Produce an insight for one pair. Never fails.
    ///
    /// One advisory request is raced against [`ADVISORY_TIMEOUT`]; the losing
    /// future is dropped. A response that fails schema validation is treated
    /// exactly like a timeout. Every failure path lands in the local
    /// fallback, so the caller always gets a usable insight, tagged with the
    /// provenance of whichever path produced it.
    pub async fn generate_insight(
        &self,
        pair: &str,
        price: Decimal,
        change_24h: f64,
        history: &[f64],
    ) -> Insight {
        let request = self.advisor.request_insight(pair, price, change_24h);

        match tokio::time::timeout(ADVISORY_TIMEOUT, request).await {
            Ok(Ok(response)) => {
                if let Some((action, confidence, levels)) = response.validate() {
                    debug!(pair = %pair, action = %action.as_str(), "Advisory insight accepted");
                    return Insight {
                        pair: pair.to_string(),
                        action,
                        confidence,
                        reasoning: response.reasoning.clone(),
                        support: levels.support,
                        resistance: levels.resistance,
                        timestamp: Utc::now(),
                        provenance: Provenance::External,
                    };
                }
                warn!(pair = %pair, "Malformed advisory response, using fallback");
            }
            Ok(Err(e)) => {
                warn!(pair = %pair, error = %e, "Advisory request failed, using fallback");
            }
            Err(_) => {
                warn!(pair = %pair, "Advisory request timed out, using fallback");
            }
        }

        self.fallback_insight(pair, price, change_24h, history)
    }

    /// Local insight: trend analysis when enough history exists, otherwise a
    /// minimal 24h-change heuristic.
    fn fallback_insight(
        &self,
        pair: &str,
        price: Decimal,
        change_24h: f64,
        history: &[f64],
    ) -> Insight {
        let (action, confidence, reasoning) = if history.len() >= MIN_FALLBACK_HISTORY {
            let signal = analyze_trend(history);
            (signal.action, signal.confidence, signal.reason)
        } else if change_24h > HEURISTIC_CHANGE_PCT {
            (
                InsightAction::Buy,
                HEURISTIC_CONFIDENCE,
                format!("24h change {:+.2}% above entry threshold", change_24h),
            )
        } else if change_24h < -HEURISTIC_CHANGE_PCT {
            (
                InsightAction::Sell,
                HEURISTIC_CONFIDENCE,
                format!("24h change {:+.2}% below exit threshold", change_24h),
            )
        } else {
            (
                InsightAction::Hold,
                HEURISTIC_CONFIDENCE,
                format!("24h change {:+.2}% within neutral band", change_24h),
            )
        };

        let volatility = asset_volatility(pair);

        Insight {
            pair: pair.to_string(),
            action,
            confidence,
            reasoning,
            support: price * (Decimal::ONE - volatility),
            resistance: price * (Decimal::ONE + volatility),
            timestamp: Utc::now(),
            provenance: Provenance::Fallback,
        }
    }

    /// Audit win rate and net PnL over the CLOSED portion of the history.
    ///
    /// An external review is attempted first (same timeout as insights); on
    /// any failure the deterministic rating rules apply.
    pub async fn audit_performance(&self, trades: &[Trade]) -> PerformanceAudit {
        let closed: Vec<&Trade> = trades.iter().filter(|t| !t.is_open()).collect();

        let wins = closed
            .iter()
            .filter(|t| t.pnl.unwrap_or(Decimal::ZERO) > Decimal::ZERO)
            .count();
        let losses = closed.len() - wins;
        let win_rate = if closed.is_empty() {
            0.0
        } else {
            wins as f64 / closed.len() as f64 * 100.0
        };
        let net_pnl: Decimal = closed.iter().filter_map(|t| t.pnl).sum();

        let stats = ReviewRequest {
            total_trades: closed.len(),
            wins,
            losses,
            win_rate,
            net_pnl,
        };

        match tokio::time::timeout(ADVISORY_TIMEOUT, self.advisor.request_review(&stats)).await {
            Ok(Ok(response)) => {
                if let Some(rating) = response.validate() {
                    return PerformanceAudit {
                        rating,
                        efficiency_score: response
                            .efficiency_score
                            .unwrap_or(win_rate.floor() as u32),
                        critique: response.critique,
                        recommended_adjustment: response.recommended_adjustment,
                    };
                }
                warn!("Malformed review response, using deterministic audit");
            }
            Ok(Err(e)) => warn!(error = %e, "Review request failed, using deterministic audit"),
            Err(_) => warn!("Review request timed out, using deterministic audit"),
        }

        Self::deterministic_audit(&stats)
    }

    fn deterministic_audit(stats: &ReviewRequest) -> PerformanceAudit {
        let rating = if stats.win_rate > 60.0 && stats.net_pnl > Decimal::ZERO {
            Rating::A
        } else if stats.net_pnl < Decimal::ZERO {
            Rating::F
        } else {
            Rating::C
        };

        let critique = if stats.total_trades == 0 {
            "No closed trades to evaluate yet".to_string()
        } else {
            format!(
                "{} closed trades: {:.1}% win rate, net PnL {:.2}",
                stats.total_trades,
                stats.win_rate,
                stats.net_pnl.to_f64().unwrap_or(0.0)
            )
        };

        let recommended_adjustment = match rating {
            Rating::A => "Maintain current risk parameters".to_string(),
            Rating::C => "Tighten stop-loss or wait for stronger signals".to_string(),
            Rating::F => "Reduce risk fraction until PnL stabilizes".to_string(),
        };

        PerformanceAudit {
            rating,
            efficiency_score: stats.win_rate.floor() as u32,
            critique,
            recommended_adjustment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountMode, RiskConfig, TradeSide};

    /// Pipeline whose advisory endpoint refuses connections instantly.
    fn offline_pipeline() -> DecisionPipeline {
        let advisor =
            AdvisorClient::with_base_url("http://127.0.0.1:9".to_string(), None).unwrap();
        DecisionPipeline::new(advisor)
    }

    fn closed_trade(pnl: Decimal) -> Trade {
        let mut trade = Trade::open(
            uuid::Uuid::new_v4().to_string(),
            "BTC-USD".to_string(),
            TradeSide::Buy,
            dec!(100),
            dec!(50000),
            &RiskConfig::default(),
            AccountMode::Trial,
        );
        trade.status = crate::models::TradeStatus::Closed;
        trade.pnl = Some(pnl);
        trade
    }

    #[tokio::test]
    async fn test_fallback_heuristic_thresholds() {
        let pipeline = offline_pipeline();
        let price = dec!(50000);

        let bullish = pipeline
            .generate_insight("BTC-USD", price, 2.5, &[])
            .await;
        assert_eq!(bullish.action, InsightAction::Buy);
        assert_eq!(bullish.confidence, 70);
        assert_eq!(bullish.provenance, Provenance::Fallback);

        let bearish = pipeline
            .generate_insight("BTC-USD", price, -2.5, &[])
            .await;
        assert_eq!(bearish.action, InsightAction::Sell);

        let neutral = pipeline.generate_insight("BTC-USD", price, 1.0, &[]).await;
        assert_eq!(neutral.action, InsightAction::Hold);
    }

    #[tokio::test]
    async fn test_fallback_key_levels_use_asset_volatility() {
        let pipeline = offline_pipeline();

        let insight = pipeline
            .generate_insight("BTC-USD", dec!(50000), 0.0, &[])
            .await;
        // BTC volatility constant is 2.5%
        assert_eq!(insight.support, dec!(48750));
        assert_eq!(insight.resistance, dec!(51250));
    }

    #[tokio::test]
    async fn test_fallback_prefers_trend_with_enough_history() {
        let pipeline = offline_pipeline();
        let history: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();

        // 24h change says sell, but the rising history must win
        let insight = pipeline
            .generate_insight("ETH-USD", dec!(130), -5.0, &history)
            .await;

        assert_eq!(insight.action, InsightAction::Buy);
        assert_eq!(insight.provenance, Provenance::Fallback);
    }

    #[tokio::test]
    async fn test_insight_returns_within_timeout_bound() {
        let pipeline = offline_pipeline();
        let started = std::time::Instant::now();

        let insight = pipeline
            .generate_insight("BTC-USD", dec!(50000), 0.0, &[])
            .await;

        assert!(started.elapsed() < ADVISORY_TIMEOUT + Duration::from_millis(500));
        assert_eq!(insight.provenance, Provenance::Fallback);
    }

    #[tokio::test]
    async fn test_audit_rating_a() {
        let pipeline = offline_pipeline();
        let trades = vec![
            closed_trade(dec!(50)),
            closed_trade(dec!(30)),
            closed_trade(dec!(20)),
            closed_trade(dec!(-10)),
        ];

        let audit = pipeline.audit_performance(&trades).await;
        assert_eq!(audit.rating, Rating::A);
        assert_eq!(audit.efficiency_score, 75);
    }

    #[tokio::test]
    async fn test_audit_rating_f_on_net_loss() {
        let pipeline = offline_pipeline();
        let trades = vec![closed_trade(dec!(10)), closed_trade(dec!(-100))];

        let audit = pipeline.audit_performance(&trades).await;
        assert_eq!(audit.rating, Rating::F);
        assert_eq!(audit.efficiency_score, 50);
    }

    #[tokio::test]
    async fn test_audit_rating_c_otherwise() {
        let pipeline = offline_pipeline();

        // No closed trades: neither A nor F rules apply
        let audit = pipeline.audit_performance(&[]).await;
        assert_eq!(audit.rating, Rating::C);
        assert_eq!(audit.efficiency_score, 0);

        // Positive net but mediocre win rate
        let trades = vec![
            closed_trade(dec!(100)),
            closed_trade(dec!(-20)),
            closed_trade(dec!(-30)),
        ];
        let audit = pipeline.audit_performance(&trades).await;
        assert_eq!(audit.rating, Rating::C);
    }

    #[tokio::test]
    async fn test_audit_ignores_open_trades() {
        let pipeline = offline_pipeline();
        let open = Trade::open(
            "open".to_string(),
            "BTC-USD".to_string(),
            TradeSide::Buy,
            dec!(100),
            dec!(50000),
            &RiskConfig::default(),
            AccountMode::Trial,
        );

        let trades = vec![open, closed_trade(dec!(-5))];
        let audit = pipeline.audit_performance(&trades).await;

        // Only the closed loser counts
        assert_eq!(audit.rating, Rating::F);
    }
}
