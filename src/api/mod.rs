//! HTTP clients for market data and the advisory service.

mod advisor;
mod market;
mod types;

pub use advisor::AdvisorClient;
pub use market::{coin_id, MarketClient};
pub use types::{
    InsightRequest, InsightResponse, KeyLevels, MarketChartResponse, ReviewRequest,
    ReviewResponse, SimplePrice, SimplePriceResponse,
};
