//! Advisory service client: AI-backed trade insights and performance reviews.
//!
//! The service is network-latent and allowed to fail; callers race every
//! request against a timeout and fall back locally. Nothing here retries.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use super::types::{InsightRequest, InsightResponse, ReviewRequest, ReviewResponse};

const ADVISOR_API_BASE: &str = "https://advisor.pairpilot.app/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the external recommendation service.
pub struct AdvisorClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AdvisorClient {
    /// Build from environment: `ADVISOR_API_URL` overrides the default
    /// endpoint, `ADVISOR_API_KEY` is attached when present.
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("ADVISOR_API_URL").unwrap_or_else(|_| ADVISOR_API_BASE.to_string());
        let api_key = env::var("ADVISOR_API_KEY").ok();
        Self::with_base_url(base_url, api_key)
    }

    pub fn with_base_url(base_url: String, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Request a trade insight for one pair.
    pub async fn request_insight(
        &self,
        pair: &str,
        price: Decimal,
        change_24h: f64,
    ) -> Result<InsightResponse> {
        let url = format!("{}/insight", self.base_url);
        let body = InsightRequest {
            pair: pair.to_string(),
            price,
            change_24h,
        };

        debug!(pair = %pair, url = %url, "Requesting advisory insight");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.context("Advisory request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("advisory request failed: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse advisory response")
    }

    /// Request a written review of closed-trade performance.
    pub async fn request_review(&self, stats: &ReviewRequest) -> Result<ReviewResponse> {
        let url = format!("{}/review", self.base_url);

        debug!(
            trades = stats.total_trades,
            win_rate = stats.win_rate,
            "Requesting performance review"
        );

        let mut request = self.client.post(&url).json(stats);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.context("Review request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("review request failed: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse review response")
    }
}
