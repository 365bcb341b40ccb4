//! Market data feed: latest quotes plus a bounded price history per pair.
//!
//! The feed task is the only writer of the quote and history maps. When the
//! upstream API fails, quotes are substituted by a bounded synthetic random
//! walk so every downstream consumer keeps observing fresh, monotonically
//! timestamped data.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::MarketClient;
use crate::models::Quote;

/// Pairs tracked when the CLI does not override them.
pub const DEFAULT_PAIRS: [&str; 3] = ["BTC-USD", "ETH-USD", "SOL-USD"];

/// Poll period for the live feed.
pub const FEED_INTERVAL: Duration = Duration::from_secs(8);

/// Points of history kept per pair.
const HISTORY_CAP: usize = 500;

/// Largest per-step move (percent) the synthetic walk may take.
const MAX_WALK_STEP_PCT: f64 = 0.5;

/// Seed price used when a pair has never produced a live quote.
fn seed_price(pair: &str) -> Decimal {
    match pair {
        "BTC-USD" => dec!(60000),
        "ETH-USD" => dec!(2500),
        "SOL-USD" => dec!(150),
        _ => dec!(100),
    }
}

/// Immutable view of the market handed to scheduler ticks.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub quotes: HashMap<String, Quote>,
    pub history: HashMap<String, Vec<f64>>,
}

impl MarketSnapshot {
    pub fn quote(&self, pair: &str) -> Option<&Quote> {
        self.quotes.get(pair)
    }

    pub fn history(&self, pair: &str) -> &[f64] {
        self.history.get(pair).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Quote and history store for all tracked pairs.
pub struct MarketFeed {
    client: MarketClient,
    pairs: Vec<String>,
    quotes: RwLock<HashMap<String, Quote>>,
    history: RwLock<HashMap<String, VecDeque<f64>>>,
}

impl MarketFeed {
    pub fn new(client: MarketClient, pairs: Vec<String>) -> Self {
        Self {
            client,
            pairs,
            quotes: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Backfill history from the market-chart endpoint. Failures are logged
    /// and tolerated; history then accumulates from polling alone.
    pub async fn seed_history(&self) {
        let fetches = self.pairs.iter().map(|pair| async move {
            (pair.clone(), self.client.fetch_history(pair).await)
        });

        for (pair, result) in join_all(fetches).await {
            match result {
                Ok(points) if !points.is_empty() => {
                    let mut history = self.history.write().await;
                    let ring = history.entry(pair.clone()).or_default();
                    for point in points.iter().rev().take(HISTORY_CAP).rev() {
                        ring.push_back(*point);
                    }
                    debug!(pair = %pair, points = ring.len(), "Seeded price history");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(pair = %pair, error = %e, "History backfill failed");
                }
            }
        }
    }

    /// One poll of the upstream API. On failure every pair advances along the
    /// synthetic walk instead, so consumers never see a stalled feed.
    pub async fn refresh(&self) {
        match self.client.fetch_quotes(&self.pairs).await {
            Ok(quotes) if !quotes.is_empty() => {
                for pair in &self.pairs {
                    match quotes.get(pair) {
                        Some(quote) => self.apply_quote(quote.clone()).await,
                        // A pair can be missing from an otherwise good poll
                        None => self.synthesize(pair).await,
                    }
                }
            }
            Ok(_) => {
                warn!("Feed returned no quotes, using synthetic walk");
                self.synthesize_all().await;
            }
            Err(e) => {
                warn!(error = %e, "Feed poll failed, using synthetic walk");
                self.synthesize_all().await;
            }
        }
    }

    async fn apply_quote(&self, quote: Quote) {
        let price = quote.price.to_f64().unwrap_or(0.0);
        let pair = quote.pair.clone();

        self.quotes.write().await.insert(pair.clone(), quote);

        let mut history = self.history.write().await;
        let ring = history.entry(pair).or_default();
        ring.push_back(price);
        while ring.len() > HISTORY_CAP {
            ring.pop_front();
        }
    }

    async fn synthesize_all(&self) {
        for pair in &self.pairs {
            self.synthesize(pair).await;
        }
    }

    /// Advance one pair along a bounded random walk from its last known price.
    async fn synthesize(&self, pair: &str) {
        let (prev_price, prev_change) = {
            let quotes = self.quotes.read().await;
            match quotes.get(pair) {
                Some(q) => (q.price, q.change_24h),
                None => (seed_price(pair), 0.0),
            }
        };

        let step_pct = rand::thread_rng().gen_range(-MAX_WALK_STEP_PCT..=MAX_WALK_STEP_PCT);
        let factor = Decimal::try_from(1.0 + step_pct / 100.0).unwrap_or(Decimal::ONE);
        let price = prev_price * factor;

        let quote = Quote {
            pair: pair.to_string(),
            price,
            change_24h: prev_change,
            timestamp: Utc::now(),
            synthetic: true,
        };

        debug!(pair = %pair, price = %price, step_pct = step_pct, "Synthetic quote");
        self.apply_quote(quote).await;
    }

    pub async fn quote(&self, pair: &str) -> Option<Quote> {
        self.quotes.read().await.get(pair).cloned()
    }

    /// Clone the current market view for one scheduler tick.
    pub async fn snapshot(&self) -> MarketSnapshot {
        let quotes = self.quotes.read().await.clone();
        let history = self
            .history
            .read()
            .await
            .iter()
            .map(|(pair, ring)| (pair.clone(), ring.iter().copied().collect()))
            .collect();

        MarketSnapshot { quotes, history }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_feed() -> MarketFeed {
        let client = MarketClient::with_base_url("http://127.0.0.1:9".to_string()).unwrap();
        MarketFeed::new(
            client,
            DEFAULT_PAIRS.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_synthetic_walk_is_bounded() {
        let feed = test_feed();

        feed.synthesize_all().await;
        let first = feed.quote("BTC-USD").await.unwrap();
        assert!(first.synthetic);

        // Each step stays within the clamp relative to the previous price
        let mut prev = first.price.to_f64().unwrap();
        for _ in 0..50 {
            feed.synthesize("BTC-USD").await;
            let next = feed.quote("BTC-USD").await.unwrap().price.to_f64().unwrap();
            let step = ((next - prev) / prev * 100.0).abs();
            assert!(step <= MAX_WALK_STEP_PCT + 1e-9, "step {} too large", step);
            prev = next;
        }
    }

    #[tokio::test]
    async fn test_synthetic_timestamps_monotonic() {
        let feed = test_feed();

        feed.synthesize("ETH-USD").await;
        let t1 = feed.quote("ETH-USD").await.unwrap().timestamp;
        feed.synthesize("ETH-USD").await;
        let t2 = feed.quote("ETH-USD").await.unwrap().timestamp;

        assert!(t2 >= t1);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let feed = test_feed();

        for _ in 0..(HISTORY_CAP + 25) {
            feed.synthesize("SOL-USD").await;
        }

        let snapshot = feed.snapshot().await;
        assert_eq!(snapshot.history("SOL-USD").len(), HISTORY_CAP);
    }

    #[tokio::test]
    async fn test_snapshot_exposes_all_pairs() {
        let feed = test_feed();
        feed.synthesize_all().await;

        let snapshot = feed.snapshot().await;
        for pair in DEFAULT_PAIRS {
            assert!(snapshot.quote(pair).is_some());
            assert_eq!(snapshot.history(pair).len(), 1);
        }
    }
}
