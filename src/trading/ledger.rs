//! Trade ledger: owns all trade records and per-mode balances, and enforces
//! the open/settle lifecycle.

use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::models::{AccountMode, RiskConfig, Trade, TradeSide, TradeStatus};

/// Starting balance for the trial account.
pub const TRIAL_STARTING_BALANCE: Decimal = dec!(10000);

/// Report produced by a successful settlement, consumed by the risk governor.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub trade_id: String,
    pub pair: String,
    pub mode: AccountMode,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

/// Single owner of trade records and account balances.
///
/// Balances change only through `open` (debit) and `settle` (credit); nothing
/// else in the engine writes them.
#[derive(Debug)]
pub struct TradeLedger {
    trades: Vec<Trade>,
    balances: HashMap<AccountMode, Decimal>,
}

impl TradeLedger {
    /// Fresh ledger with default balances.
    pub fn new() -> Self {
        let mut balances = HashMap::new();
        balances.insert(AccountMode::Trial, TRIAL_STARTING_BALANCE);
        balances.insert(AccountMode::Live, Decimal::ZERO);

        Self {
            trades: Vec::new(),
            balances,
        }
    }

    /// Rebuild a ledger from persisted state.
    pub fn restore(trades: Vec<Trade>, balances: HashMap<AccountMode, Decimal>) -> Self {
        let mut ledger = Self::new();
        ledger.trades = trades;
        for (mode, amount) in balances {
            ledger.balances.insert(mode, amount);
        }
        ledger
    }

    pub fn balance(&self, mode: AccountMode) -> Decimal {
        self.balances.get(&mode).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn trade(&self, trade_id: &str) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id == trade_id)
    }

    /// Open trades for the caller's mode, newest first.
    pub fn open_trades(&self, mode: AccountMode) -> Vec<&Trade> {
        let mut open: Vec<&Trade> = self
            .trades
            .iter()
            .filter(|t| t.is_open() && t.mode == mode)
            .collect();
        open.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        open
    }

    /// Every open trade across both modes. The settlement sweep uses this:
    /// positions keep accruing PnL regardless of which mode the session is in.
    pub fn all_open_trades(&self) -> Vec<&Trade> {
        self.trades.iter().filter(|t| t.is_open()).collect()
    }

    pub fn has_open_trade(&self, pair: &str, mode: AccountMode) -> bool {
        self.trades
            .iter()
            .any(|t| t.is_open() && t.mode == mode && t.pair == pair)
    }

    /// Open a new trade, debiting its notional from the mode's balance.
    ///
    /// Stop-loss/take-profit thresholds are snapshotted from `config` here and
    /// never re-read afterwards.
    pub fn open(
        &mut self,
        pair: &str,
        side: TradeSide,
        amount: Decimal,
        entry_price: Decimal,
        config: &RiskConfig,
        mode: AccountMode,
    ) -> Result<Trade> {
        if amount <= Decimal::ZERO {
            bail!("trade amount must be positive, got {}", amount);
        }
        if entry_price <= Decimal::ZERO {
            bail!("entry price must be positive, got {}", entry_price);
        }

        let trade = Trade::open(
            uuid::Uuid::new_v4().to_string(),
            pair.to_string(),
            side,
            amount,
            entry_price,
            config,
            mode,
        );

        let balance = self.balance(mode);
        self.balances.insert(mode, balance - amount);

        info!(
            id = %trade.id,
            pair = %pair,
            side = %side.as_str(),
            amount = %amount,
            entry = %entry_price,
            mode = %mode.as_str(),
            "Opened trade"
        );

        self.trades.push(trade.clone());
        Ok(trade)
    }

    /// Settle an open trade at `exit_price`.
    ///
    /// Returns `None` without touching any state when the trade is unknown or
    /// already CLOSED. On success the trade transitions to CLOSED, the mode
    /// balance is credited with `amount + pnl`, and a settlement report is
    /// returned for the governor.
    pub fn settle(&mut self, trade_id: &str, exit_price: Decimal) -> Option<Settlement> {
        let trade = match self.trades.iter_mut().find(|t| t.id == trade_id) {
            Some(t) if t.is_open() => t,
            Some(_) => {
                warn!(id = %trade_id, "Ignoring settle on closed trade");
                return None;
            }
            None => {
                warn!(id = %trade_id, "Ignoring settle on unknown trade");
                return None;
            }
        };

        let pnl_percent = trade.pnl_percent_at(exit_price);
        let pnl = trade.amount * pnl_percent / dec!(100);
        let credit = trade.amount + pnl;
        let mode = trade.mode;

        trade.status = TradeStatus::Closed;
        trade.exit_price = Some(exit_price);
        trade.pnl = Some(pnl);
        trade.pnl_percent = Some(pnl_percent);
        trade.closed_at = Some(Utc::now());

        let report = Settlement {
            trade_id: trade.id.clone(),
            pair: trade.pair.clone(),
            mode,
            exit_price,
            pnl,
            pnl_percent,
        };

        let balance = self.balance(mode);
        self.balances.insert(mode, balance + credit);

        info!(
            id = %report.trade_id,
            pair = %report.pair,
            exit = %exit_price,
            pnl = %pnl,
            pnl_pct = %pnl_percent,
            mode = %mode.as_str(),
            "Settled trade"
        );

        Some(report)
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RiskConfig {
        RiskConfig::default()
    }

    #[test]
    fn test_open_debits_balance() {
        let mut ledger = TradeLedger::new();
        let before = ledger.balance(AccountMode::Trial);

        ledger
            .open(
                "BTC-USD",
                TradeSide::Buy,
                dec!(1000),
                dec!(50000),
                &config(),
                AccountMode::Trial,
            )
            .unwrap();

        assert_eq!(ledger.balance(AccountMode::Trial), before - dec!(1000));
        assert_eq!(ledger.open_trades(AccountMode::Trial).len(), 1);
    }

    #[test]
    fn test_open_rejects_non_positive_amount() {
        let mut ledger = TradeLedger::new();

        assert!(ledger
            .open(
                "BTC-USD",
                TradeSide::Buy,
                Decimal::ZERO,
                dec!(50000),
                &config(),
                AccountMode::Trial,
            )
            .is_err());
        assert!(ledger
            .open(
                "BTC-USD",
                TradeSide::Buy,
                dec!(-10),
                dec!(50000),
                &config(),
                AccountMode::Trial,
            )
            .is_err());

        // Nothing booked, nothing debited
        assert!(ledger.trades().is_empty());
        assert_eq!(ledger.balance(AccountMode::Trial), TRIAL_STARTING_BALANCE);
    }

    #[test]
    fn test_stop_loss_settlement_scenario() {
        // Open BUY amount=1000 at 50000 with 2%/5% thresholds; quote drops to
        // 49000 (-2%): pnl is exactly -20.00 and 980.00 comes back.
        let mut ledger = TradeLedger::new();
        let before = ledger.balance(AccountMode::Trial);

        let trade = ledger
            .open(
                "BTC-USD",
                TradeSide::Buy,
                dec!(1000),
                dec!(50000),
                &config(),
                AccountMode::Trial,
            )
            .unwrap();

        let report = ledger.settle(&trade.id, dec!(49000)).unwrap();

        assert_eq!(report.pnl, dec!(-20.00));
        assert_eq!(report.pnl_percent, dec!(-2));
        // Debited 1000, credited 980
        assert_eq!(ledger.balance(AccountMode::Trial), before - dec!(20.00));

        let closed = ledger.trade(&trade.id).unwrap();
        assert_eq!(closed.status, TradeStatus::Closed);
        assert_eq!(closed.exit_price, Some(dec!(49000)));
    }

    #[test]
    fn test_balance_conservation_per_mode() {
        // balance_after == balance_before_open + pnl, independently per mode
        let mut ledger = TradeLedger::new();
        let trial_before = ledger.balance(AccountMode::Trial);
        let live_before = ledger.balance(AccountMode::Live);

        let t1 = ledger
            .open(
                "ETH-USD",
                TradeSide::Buy,
                dec!(200),
                dec!(2000),
                &config(),
                AccountMode::Trial,
            )
            .unwrap();
        let t2 = ledger
            .open(
                "ETH-USD",
                TradeSide::Sell,
                dec!(300),
                dec!(2000),
                &config(),
                AccountMode::Live,
            )
            .unwrap();

        let r1 = ledger.settle(&t1.id, dec!(2100)).unwrap(); // +5%
        let r2 = ledger.settle(&t2.id, dec!(2100)).unwrap(); // -5% for the short

        assert_eq!(
            ledger.balance(AccountMode::Trial),
            trial_before + r1.pnl
        );
        assert_eq!(ledger.balance(AccountMode::Live), live_before + r2.pnl);
        assert_eq!(r1.pnl, dec!(10));
        assert_eq!(r2.pnl, dec!(-15));
    }

    #[test]
    fn test_settle_is_noop_on_closed_and_unknown() {
        let mut ledger = TradeLedger::new();
        let trade = ledger
            .open(
                "BTC-USD",
                TradeSide::Buy,
                dec!(100),
                dec!(50000),
                &config(),
                AccountMode::Trial,
            )
            .unwrap();

        assert!(ledger.settle(&trade.id, dec!(49000)).is_some());
        let balance_after = ledger.balance(AccountMode::Trial);
        let closed = ledger.trade(&trade.id).unwrap().clone();

        // Second settle at a different price: no state change anywhere
        assert!(ledger.settle(&trade.id, dec!(60000)).is_none());
        assert_eq!(ledger.balance(AccountMode::Trial), balance_after);
        let still_closed = ledger.trade(&trade.id).unwrap();
        assert_eq!(still_closed.exit_price, closed.exit_price);
        assert_eq!(still_closed.pnl, closed.pnl);

        // Unknown id: same story
        assert!(ledger.settle("no-such-trade", dec!(1)).is_none());
        assert_eq!(ledger.balance(AccountMode::Trial), balance_after);
    }

    #[test]
    fn test_open_trades_filters_by_mode_but_sweep_sees_all() {
        let mut ledger = TradeLedger::new();
        ledger
            .open(
                "BTC-USD",
                TradeSide::Buy,
                dec!(100),
                dec!(50000),
                &config(),
                AccountMode::Trial,
            )
            .unwrap();
        ledger
            .open(
                "ETH-USD",
                TradeSide::Buy,
                dec!(100),
                dec!(2000),
                &config(),
                AccountMode::Live,
            )
            .unwrap();

        assert_eq!(ledger.open_trades(AccountMode::Trial).len(), 1);
        assert_eq!(ledger.open_trades(AccountMode::Live).len(), 1);
        assert_eq!(ledger.all_open_trades().len(), 2);
        assert!(ledger.has_open_trade("BTC-USD", AccountMode::Trial));
        assert!(!ledger.has_open_trade("BTC-USD", AccountMode::Live));
    }
}
