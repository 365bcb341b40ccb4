//! Market quote model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest known quote for a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub pair: String,
    pub price: Decimal,
    /// 24h change in percent
    pub change_24h: f64,
    pub timestamp: DateTime<Utc>,
    /// True when produced by the synthetic walk instead of the live feed
    pub synthetic: bool,
}

impl Quote {
    pub fn new(pair: impl Into<String>, price: Decimal, change_24h: f64) -> Self {
        Self {
            pair: pair.into(),
            price,
            change_24h,
            timestamp: Utc::now(),
            synthetic: false,
        }
    }
}
