//! Risk governor: loss-streak and drawdown kill-switches for autopilot.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::models::SafetyState;

/// Consecutive losing settlements that trip the kill switch.
pub const MAX_CONSECUTIVE_LOSSES: u32 = 3;

const ALERT_LOSS_STREAK: &str = "max consecutive losses reached";
const ALERT_DRAWDOWN: &str = "drawdown limit reached";

/// Tracks settlement outcomes and disables autonomous trading on breach.
///
/// Settlement reports are the only input that moves the counters; the only
/// other mutation is the operator's dismissal, which clears the alert and the
/// loss streak but deliberately leaves cumulative PnL untouched.
#[derive(Debug)]
pub struct RiskGovernor {
    state: SafetyState,
}

impl RiskGovernor {
    pub fn new(state: SafetyState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn autopilot_enabled(&self) -> bool {
        self.state.autopilot_enabled
    }

    /// Operator toggle. Does not clear an active alert.
    pub fn set_autopilot(&mut self, enabled: bool) {
        self.state.autopilot_enabled = enabled;
    }

    /// Record one settlement outcome.
    pub fn record_settlement(&mut self, pnl: Decimal) {
        if pnl < Decimal::ZERO {
            self.state.consecutive_losses += 1;
        } else {
            self.state.consecutive_losses = 0;
        }
        self.state.cumulative_pnl += pnl;
    }

    /// Gate check run before each autonomous entry pass.
    ///
    /// Returns true when autonomous trading may proceed. On a breach the
    /// autopilot flag is forced off and an alert is raised; the alert then
    /// persists until the operator dismisses it.
    pub fn gate(&mut self, current_balance: Decimal, max_drawdown_pct: Decimal) -> bool {
        if self.state.consecutive_losses >= MAX_CONSECUTIVE_LOSSES {
            self.trip(ALERT_LOSS_STREAK);
            return false;
        }

        let drawdown_breached = if current_balance > Decimal::ZERO {
            let drawdown_pct = self.state.cumulative_pnl / current_balance * dec!(100);
            drawdown_pct <= -max_drawdown_pct
        } else {
            // Nothing left to draw down against; any accumulated loss blocks.
            self.state.cumulative_pnl < Decimal::ZERO
        };

        if drawdown_breached {
            self.trip(ALERT_DRAWDOWN);
            return false;
        }

        self.state.autopilot_enabled
    }

    fn trip(&mut self, message: &str) {
        if self.state.autopilot_enabled || self.state.alert.is_none() {
            warn!(alert = message, "Safety breach: autopilot disabled");
        }
        self.state.autopilot_enabled = false;
        self.state.alert = Some(message.to_string());
    }

    /// Operator dismissal: clears the alert and resets the loss streak.
    /// Cumulative PnL is intentionally not reset.
    pub fn dismiss_alert(&mut self) {
        self.state.alert = None;
        self.state.consecutive_losses = 0;
    }
}

impl Default for RiskGovernor {
    fn default() -> Self {
        Self::new(SafetyState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_streak_trips_at_exactly_three() {
        let mut gov = RiskGovernor::default();
        let balance = dec!(10000);
        let max_dd = dec!(15);

        gov.record_settlement(dec!(-10));
        assert!(gov.gate(balance, max_dd), "one loss must not trip");

        gov.record_settlement(dec!(-10));
        assert!(gov.gate(balance, max_dd), "two losses must not trip");

        gov.record_settlement(dec!(-10));
        assert!(!gov.gate(balance, max_dd), "third loss trips the gate");
        assert!(!gov.autopilot_enabled());
        assert_eq!(
            gov.state().alert.as_deref(),
            Some("max consecutive losses reached")
        );
    }

    #[test]
    fn test_win_resets_streak() {
        let mut gov = RiskGovernor::default();

        gov.record_settlement(dec!(-10));
        gov.record_settlement(dec!(-10));
        gov.record_settlement(dec!(5));
        assert_eq!(gov.state().consecutive_losses, 0);

        gov.record_settlement(dec!(-10));
        gov.record_settlement(dec!(-10));
        assert!(gov.gate(dec!(10000), dec!(15)));
    }

    #[test]
    fn test_drawdown_breach_blocks() {
        // Cumulative -16% of balance with a 15% limit blocks the gate
        let mut gov = RiskGovernor::default();
        gov.record_settlement(dec!(-1600));

        assert!(!gov.gate(dec!(10000), dec!(15)));
        assert!(!gov.autopilot_enabled());
        assert_eq!(gov.state().alert.as_deref(), Some("drawdown limit reached"));
    }

    #[test]
    fn test_drawdown_under_limit_passes() {
        let mut gov = RiskGovernor::default();
        gov.record_settlement(dec!(-1400)); // -14% of 10000

        assert!(gov.gate(dec!(10000), dec!(15)));
    }

    #[test]
    fn test_dismiss_resets_streak_but_not_cumulative_pnl() {
        let mut gov = RiskGovernor::default();
        gov.record_settlement(dec!(-10));
        gov.record_settlement(dec!(-10));
        gov.record_settlement(dec!(-10));
        assert!(!gov.gate(dec!(10000), dec!(15)));

        gov.dismiss_alert();

        assert!(gov.state().alert.is_none());
        assert_eq!(gov.state().consecutive_losses, 0);
        assert_eq!(gov.state().cumulative_pnl, dec!(-30));
        // Autopilot stays off until the operator re-enables it
        assert!(!gov.autopilot_enabled());

        gov.set_autopilot(true);
        assert!(gov.gate(dec!(10000), dec!(15)));
    }

    #[test]
    fn test_gate_respects_manual_disable() {
        let mut gov = RiskGovernor::default();
        gov.set_autopilot(false);
        assert!(!gov.gate(dec!(10000), dec!(15)));
        assert!(gov.state().alert.is_none(), "manual disable raises no alert");
    }
}
