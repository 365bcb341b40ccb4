//! Trade model and its lifecycle types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::RiskConfig;

/// Account a trade is booked against. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountMode {
    Trial,
    Live,
}

impl AccountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountMode::Trial => "TRIAL",
            AccountMode::Live => "LIVE",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LIVE" => AccountMode::Live,
            _ => AccountMode::Trial,
        }
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SELL" => TradeSide::Sell,
            _ => TradeSide::Buy,
        }
    }

    /// PnL sign: +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            TradeSide::Buy => Decimal::ONE,
            TradeSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Closed => "CLOSED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CLOSED" => TradeStatus::Closed,
            _ => TradeStatus::Open,
        }
    }
}

/// A single position over its whole lifecycle.
///
/// Stop-loss and take-profit thresholds are snapshotted from the risk
/// configuration in effect when the trade was opened. Settlement reads only
/// these snapshots; a later configuration change never touches an open trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,

    /// Pair symbol, e.g. "BTC-USD"
    pub pair: String,

    pub side: TradeSide,

    pub status: TradeStatus,

    /// Notional size in quote currency
    pub amount: Decimal,

    pub entry_price: Decimal,

    pub exit_price: Option<Decimal>,

    /// Realized PnL in quote currency, set on settle
    pub pnl: Option<Decimal>,

    /// Realized PnL as a percentage of entry, set on settle
    pub pnl_percent: Option<Decimal>,

    /// Stop-loss threshold (percent) snapshotted at open
    pub stop_loss_pct: Decimal,

    /// Take-profit threshold (percent) snapshotted at open
    pub take_profit_pct: Decimal,

    /// Price level at which the stop-loss threshold is met
    pub stop_price: Decimal,

    /// Price level at which the take-profit threshold is met
    pub take_profit_price: Decimal,

    pub mode: AccountMode,

    pub opened_at: DateTime<Utc>,

    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Create a new OPEN trade, snapshotting the given risk configuration.
    pub fn open(
        id: String,
        pair: String,
        side: TradeSide,
        amount: Decimal,
        entry_price: Decimal,
        config: &RiskConfig,
        mode: AccountMode,
    ) -> Self {
        let sl = config.stop_loss_pct / dec!(100);
        let tp = config.take_profit_pct / dec!(100);

        // Long positions stop out below entry, shorts above.
        let (stop_price, take_profit_price) = match side {
            TradeSide::Buy => (
                entry_price * (Decimal::ONE - sl),
                entry_price * (Decimal::ONE + tp),
            ),
            TradeSide::Sell => (
                entry_price * (Decimal::ONE + sl),
                entry_price * (Decimal::ONE - tp),
            ),
        };

        Self {
            id,
            pair,
            side,
            status: TradeStatus::Open,
            amount,
            entry_price,
            exit_price: None,
            pnl: None,
            pnl_percent: None,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            stop_price,
            take_profit_price,
            mode,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Signed return (percent) if the trade were closed at `price`.
    pub fn pnl_percent_at(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price * dec!(100)
    }

    /// Whether `price` breaches the snapshotted stop-loss or take-profit
    /// thresholds.
    pub fn exit_triggered(&self, price: Decimal) -> bool {
        let pct = self.pnl_percent_at(price);
        pct <= -self.stop_loss_pct || pct >= self.take_profit_pct
    }
}
