//! Wire types for the market-data and advisory APIs.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{InsightAction, Rating};

/// One entry of the simple-price endpoint, keyed by coin id.
#[derive(Debug, Clone, Deserialize)]
pub struct SimplePrice {
    pub usd: f64,
    #[serde(default)]
    pub usd_24h_change: Option<f64>,
}

/// Full simple-price response: coin id -> prices.
pub type SimplePriceResponse = HashMap<String, SimplePrice>;

/// Market-chart response; `prices` is a series of `[timestamp_ms, price]`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketChartResponse {
    #[serde(default)]
    pub prices: Vec<[f64; 2]>,
}

/// Request body for the advisory insight endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
    pub pair: String,
    pub price: Decimal,
    pub change_24h: f64,
}

/// Support/resistance block of an advisory response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyLevels {
    #[serde(default)]
    pub support: Decimal,
    #[serde(default)]
    pub resistance: Decimal,
}

/// Advisory insight response. Validated before use; anything malformed is
/// treated the same as a timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightResponse {
    #[serde(default)]
    pub pair: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub key_levels: Option<KeyLevels>,
}

impl InsightResponse {
    /// Schema gate for the advisory race winner.
    pub fn validate(&self) -> Option<(InsightAction, u8, &KeyLevels)> {
        let action = InsightAction::parse(&self.action)?;
        if !(0.0..=100.0).contains(&self.confidence) {
            return None;
        }
        if self.reasoning.trim().is_empty() {
            return None;
        }
        let levels = self.key_levels.as_ref()?;
        if levels.support <= Decimal::ZERO || levels.resistance <= Decimal::ZERO {
            return None;
        }
        Some((action, self.confidence as u8, levels))
    }
}

/// Request body for the advisory review endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub net_pnl: Decimal,
}

/// Advisory review response for the performance audit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub efficiency_score: Option<u32>,
    #[serde(default)]
    pub critique: String,
    #[serde(default)]
    pub recommended_adjustment: String,
}

impl ReviewResponse {
    pub fn validate(&self) -> Option<Rating> {
        let rating = Rating::parse(&self.rating)?;
        if self.critique.trim().is_empty() {
            return None;
        }
        Some(rating)
    }
}
