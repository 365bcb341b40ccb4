//! Risk configuration and safety state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk parameters governing trade exits and autonomous sizing.
///
/// A copy of the thresholds is snapshotted onto every trade at open time, so
/// editing this configuration only affects trades opened afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Close a trade once it loses this percent of entry
    pub stop_loss_pct: Decimal,

    /// Close a trade once it gains this percent of entry
    pub take_profit_pct: Decimal,

    /// Disable autopilot once cumulative PnL reaches this percent of balance
    pub max_drawdown_pct: Decimal,

    /// Fraction of balance the autonomous path risks per entry (0.0 to 1.0)
    pub risk_fraction: Decimal,

    /// Hard cap on a single autonomous position (quote currency)
    pub max_position: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: dec!(2),      // -2% stop
            take_profit_pct: dec!(5),    // +5% target
            max_drawdown_pct: dec!(15),  // kill switch at -15%
            risk_fraction: dec!(0.05),   // 5% of balance per entry
            max_position: dec!(500),     // $500 cap per entry
        }
    }
}

/// Kill-switch state maintained by the risk governor.
///
/// Mutated only by settlement reports and the operator's dismissal action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyState {
    pub consecutive_losses: u32,

    /// Sum of realized PnL across settlements. Not reset by alert dismissal.
    pub cumulative_pnl: Decimal,

    pub autopilot_enabled: bool,

    /// Active alert message, kept until the operator dismisses it
    pub alert: Option<String>,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            consecutive_losses: 0,
            cumulative_pnl: Decimal::ZERO,
            autopilot_enabled: true,
            alert: None,
        }
    }
}
