//! Market data client: spot quotes and recent price history per pair.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backoff::ExponentialBackoff;
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::Quote;

use super::types::{MarketChartResponse, SimplePriceResponse};

const MARKET_API_BASE: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Window for transient-error retries within a single poll. Kept short so a
/// failing feed falls through to the synthetic walk instead of stalling ticks.
const RETRY_WINDOW: Duration = Duration::from_secs(3);

/// Map a pair symbol to the upstream coin id.
pub fn coin_id(pair: &str) -> Option<&'static str> {
    match pair {
        "BTC-USD" => Some("bitcoin"),
        "ETH-USD" => Some("ethereum"),
        "SOL-USD" => Some("solana"),
        _ => None,
    }
}

/// Client for the public market-data API (read-only).
pub struct MarketClient {
    client: Client,
    base_url: String,
}

impl MarketClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: MARKET_API_BASE.to_string(),
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch current quotes for the given pairs in one request.
    ///
    /// Pairs without a known coin id are skipped. Transient failures are
    /// retried briefly; the caller substitutes synthetic quotes when this
    /// still fails.
    pub async fn fetch_quotes(&self, pairs: &[String]) -> Result<HashMap<String, Quote>> {
        let known: Vec<(&String, &'static str)> = pairs
            .iter()
            .filter_map(|p| coin_id(p).map(|id| (p, id)))
            .collect();

        if known.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = known
            .iter()
            .map(|(_, id)| *id)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url, ids
        );

        debug!(url = %url, "Fetching quotes");

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(RETRY_WINDOW),
            ..ExponentialBackoff::default()
        };

        let body: SimplePriceResponse = backoff::future::retry(policy, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow!(e)))?;

            if !response.status().is_success() {
                return Err(backoff::Error::transient(anyhow!(
                    "quote request failed: {}",
                    response.status()
                )));
            }

            response
                .json::<SimplePriceResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(anyhow!(e)))
        })
        .await?;

        let mut quotes = HashMap::new();
        for (pair, id) in known {
            let Some(entry) = body.get(id) else { continue };
            let Some(price) = Decimal::try_from(entry.usd).ok() else {
                continue;
            };
            if price <= Decimal::ZERO {
                continue;
            }
            quotes.insert(
                pair.clone(),
                Quote::new(pair.clone(), price, entry.usd_24h_change.unwrap_or(0.0)),
            );
        }

        Ok(quotes)
    }

    /// Fetch ~24h of price history for one pair, oldest first.
    pub async fn fetch_history(&self, pair: &str) -> Result<Vec<f64>> {
        let id = coin_id(pair).ok_or_else(|| anyhow!("unknown pair: {}", pair))?;
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days=1",
            self.base_url, id
        );

        debug!(url = %url, "Fetching price history");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch price history")?;

        if !response.status().is_success() {
            anyhow::bail!("history request failed: {}", response.status());
        }

        let chart: MarketChartResponse = response
            .json()
            .await
            .context("Failed to parse price history")?;

        Ok(chart.prices.iter().map(|point| point[1]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_id_mapping() {
        assert_eq!(coin_id("BTC-USD"), Some("bitcoin"));
        assert_eq!(coin_id("ETH-USD"), Some("ethereum"));
        assert_eq!(coin_id("SOL-USD"), Some("solana"));
        assert_eq!(coin_id("DOGE-USD"), None);
    }

    #[tokio::test]
    async fn test_unknown_pairs_yield_empty_quotes() {
        let client = MarketClient::with_base_url("http://127.0.0.1:9".to_string()).unwrap();
        let quotes = client
            .fetch_quotes(&["DOGE-USD".to_string()])
            .await
            .unwrap();
        assert!(quotes.is_empty());
    }
}
