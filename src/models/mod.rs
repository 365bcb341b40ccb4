//! Data models for trades, quotes, insights, and risk state.

mod insight;
mod quote;
mod risk;
mod trade;

pub use insight::{Insight, InsightAction, PerformanceAudit, Provenance, Rating};
pub use quote::Quote;
pub use risk::{RiskConfig, SafetyState};
pub use trade::{AccountMode, Trade, TradeSide, TradeStatus};
