//! Advisory insight and performance audit models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Recommended action carried by an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InsightAction {
    Buy,
    Sell,
    Hold,
}

impl InsightAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightAction::Buy => "BUY",
            InsightAction::Sell => "SELL",
            InsightAction::Hold => "HOLD",
        }
    }

    /// Parse a wire-format action string. Unknown values are rejected so a
    /// malformed advisory response falls through to the local pipeline.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(InsightAction::Buy),
            "SELL" => Some(InsightAction::Sell),
            "HOLD" => Some(InsightAction::Hold),
            _ => None,
        }
    }
}

/// Where an insight came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provenance {
    /// External advisory service answered within the timeout
    External,
    /// Local trend/heuristic fallback
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::External => "EXTERNAL",
            Provenance::Fallback => "FALLBACK",
        }
    }
}

/// A trading recommendation for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub pair: String,
    pub action: InsightAction,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
    pub support: Decimal,
    pub resistance: Decimal,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
}

/// Letter rating assigned by the performance audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    A,
    C,
    F,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::A => "A",
            Rating::C => "C",
            Rating::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(Rating::A),
            "C" => Some(Rating::C),
            "F" => Some(Rating::F),
            _ => None,
        }
    }
}

/// Result of auditing the closed-trade history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAudit {
    pub rating: Rating,
    /// floor(win rate), 0-100
    pub efficiency_score: u32,
    pub critique: String,
    pub recommended_adjustment: String,
}

impl std::fmt::Display for PerformanceAudit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Rating:      {}", self.rating.as_str())?;
        writeln!(f, "Efficiency:  {}/100", self.efficiency_score)?;
        writeln!(f, "Critique:    {}", self.critique)?;
        write!(f, "Adjustment:  {}", self.recommended_adjustment)
    }
}
