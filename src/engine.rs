//! Engine: single owner of all mutable trading state, plus the periodic
//! schedulers that drive autopilot entries and settlement.
//!
//! Every mutation of the ledger, balances, or safety state goes through one
//! `RwLock<EngineState>` write guard, so a settlement can never race a
//! concurrent open on the same pair. Scheduler ticks receive an immutable
//! market snapshot, which keeps them deterministic and testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::feed::{MarketFeed, MarketSnapshot, FEED_INTERVAL};
use crate::models::{
    AccountMode, Insight, InsightAction, PerformanceAudit, Quote, RiskConfig, SafetyState,
    Trade, TradeSide,
};
use crate::trading::{
    analyze_trend, safe_size, DecisionPipeline, RiskGovernor, Settlement, TradeLedger,
};

/// Autopilot entry pass period.
pub const AUTOPILOT_INTERVAL: Duration = Duration::from_secs(10);

/// Settlement sweep period.
pub const SETTLEMENT_INTERVAL: Duration = Duration::from_secs(5);

/// History points required before autopilot will act on a pair.
pub const MIN_AUTOPILOT_HISTORY: usize = 50;

/// Smallest notional the autopilot will open.
pub const MIN_NOTIONAL: Decimal = dec!(10);

/// All mutable trading state, owned by the engine behind a single lock.
pub struct EngineState {
    pub ledger: TradeLedger,
    pub governor: RiskGovernor,
    pub risk_config: RiskConfig,
    pub mode: AccountMode,
}

/// Orchestrator for the trading session.
pub struct Engine {
    state: Arc<RwLock<EngineState>>,
    feed: MarketFeed,
    pipeline: DecisionPipeline,
    db: Database,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    /// Build an engine, restoring persisted state where it exists.
    pub async fn new(
        db: Database,
        feed: MarketFeed,
        pipeline: DecisionPipeline,
        mode: AccountMode,
    ) -> Result<Self> {
        let trades = db.load_trades().await;
        let balances = db.load_balances().await;
        let risk_config = db.load_risk_config().await;
        let safety = db.load_safety_state().await;

        let open_count = trades.iter().filter(|t| t.is_open()).count();
        info!(
            trades = trades.len(),
            open = open_count,
            mode = %mode.as_str(),
            "Restoring engine state"
        );

        db.save_session(mode).await?;

        let state = EngineState {
            ledger: TradeLedger::restore(trades, balances),
            governor: RiskGovernor::new(safety),
            risk_config,
            mode,
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            feed,
            pipeline,
            db,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shutdown flag for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Main loop: one cooperative scheduler over the feed poll, the
    /// settlement sweep, and the autopilot pass. Exiting the loop cancels all
    /// periodic work as a unit.
    pub async fn run(&self) -> Result<()> {
        info!(pairs = ?self.feed.pairs(), "Starting engine");

        self.feed.seed_history().await;
        self.feed.refresh().await;

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        let mut feed_timer = interval(FEED_INTERVAL);
        let mut settlement_timer = interval(SETTLEMENT_INTERVAL);
        let mut autopilot_timer = interval(AUTOPILOT_INTERVAL);

        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::select! {
                _ = feed_timer.tick() => {
                    self.feed.refresh().await;
                }
                _ = settlement_timer.tick() => {
                    let snapshot = self.feed.snapshot().await;
                    if let Err(e) = self.settlement_tick(&snapshot).await {
                        error!(error = %e, "Settlement tick failed");
                    }
                }
                _ = autopilot_timer.tick() => {
                    let snapshot = self.feed.snapshot().await;
                    if let Err(e) = self.autopilot_tick(&snapshot).await {
                        error!(error = %e, "Autopilot tick failed");
                    }
                }
            }
        }

        info!("Engine stopped");
        Ok(())
    }

    /// One autopilot pass: gate first, then scan pairs for long entries.
    pub async fn autopilot_tick(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let mut state = self.state.write().await;
        let mode = state.mode;
        let balance = state.ledger.balance(mode);
        let max_drawdown = state.risk_config.max_drawdown_pct;

        if !state.governor.gate(balance, max_drawdown) {
            let safety = state.governor.state().clone();
            debug!("Autopilot gated");
            self.db.save_safety_state(&safety).await?;
            return Ok(());
        }

        for pair in self.feed.pairs().to_vec() {
            let history = snapshot.history(&pair);
            if history.len() < MIN_AUTOPILOT_HISTORY {
                continue;
            }
            if state.ledger.has_open_trade(&pair, mode) {
                continue;
            }

            let signal = analyze_trend(history);
            // Only long entries are generated autonomously
            if signal.action != InsightAction::Buy {
                continue;
            }

            let Some(quote) = snapshot.quote(&pair) else {
                continue;
            };

            let balance = state.ledger.balance(mode);
            let size = safe_size(
                balance,
                state.risk_config.risk_fraction,
                state.risk_config.max_position,
            );
            if size <= MIN_NOTIONAL {
                debug!(pair = %pair, size = %size, "Autopilot size below minimum");
                continue;
            }

            let config = state.risk_config.clone();
            let trade = state
                .ledger
                .open(&pair, TradeSide::Buy, size, quote.price, &config, mode)?;

            info!(
                pair = %pair,
                size = %size,
                confidence = signal.confidence,
                reason = %signal.reason,
                "Autopilot entry"
            );

            let balance = state.ledger.balance(mode);
            self.db.save_trade(&trade).await?;
            self.db.save_balance(mode, balance).await?;
        }

        Ok(())
    }

    /// One settlement sweep over every open trade in both modes.
    ///
    /// Exit thresholds come from each trade's snapshot taken at open time,
    /// never from the live configuration.
    pub async fn settlement_tick(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let mut state = self.state.write().await;

        let candidates: Vec<(String, String)> = state
            .ledger
            .all_open_trades()
            .iter()
            .map(|t| (t.id.clone(), t.pair.clone()))
            .collect();

        for (trade_id, pair) in candidates {
            let Some(quote) = snapshot.quote(&pair) else {
                continue;
            };

            let triggered = state
                .ledger
                .trade(&trade_id)
                .map(|t| t.exit_triggered(quote.price))
                .unwrap_or(false);
            if !triggered {
                continue;
            }

            if let Some(report) = state.ledger.settle(&trade_id, quote.price) {
                state.governor.record_settlement(report.pnl);
                self.persist_settlement(&state, &report).await?;
            }
        }

        Ok(())
    }

    async fn persist_settlement(&self, state: &EngineState, report: &Settlement) -> Result<()> {
        if let Some(trade) = state.ledger.trade(&report.trade_id) {
            self.db.save_trade(trade).await?;
        }
        self.db
            .save_balance(report.mode, state.ledger.balance(report.mode))
            .await?;
        self.db.save_safety_state(state.governor.state()).await?;
        Ok(())
    }

    // ==================== Command surface ====================

    /// Operator-initiated open at the latest quote. Bypasses the position
    /// sizer: manual size is deliberately unbounded.
    pub async fn open_trade(
        &self,
        pair: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> Result<Trade> {
        let Some(quote) = self.feed.quote(pair).await else {
            bail!("no quote available for {} yet", pair);
        };

        let mut state = self.state.write().await;
        let mode = state.mode;
        let config = state.risk_config.clone();
        let trade = state
            .ledger
            .open(pair, side, amount, quote.price, &config, mode)?;

        let balance = state.ledger.balance(mode);
        self.db.save_trade(&trade).await?;
        self.db.save_balance(mode, balance).await?;

        Ok(trade)
    }

    /// Operator-initiated close at the latest quote. No-op (returns `None`)
    /// for unknown or already closed trades.
    pub async fn close_trade(&self, trade_id: &str) -> Result<Option<Settlement>> {
        let mut state = self.state.write().await;

        let Some(pair) = state.ledger.trade(trade_id).map(|t| t.pair.clone()) else {
            warn!(id = %trade_id, "Close requested for unknown trade");
            return Ok(None);
        };

        let Some(quote) = self.feed.quote(&pair).await else {
            bail!("no quote available for {} yet", pair);
        };

        let Some(report) = state.ledger.settle(trade_id, quote.price) else {
            return Ok(None);
        };

        state.governor.record_settlement(report.pnl);
        self.persist_settlement(&state, &report).await?;

        Ok(Some(report))
    }

    pub async fn toggle_autopilot(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.governor.set_autopilot(enabled);
        info!(enabled = enabled, "Autopilot toggled");
        self.db.save_safety_state(state.governor.state()).await?;
        Ok(())
    }

    /// Replace the live risk configuration. Open trades keep the thresholds
    /// snapshotted when they were opened.
    pub async fn update_risk_config(&self, config: RiskConfig) -> Result<()> {
        if config.stop_loss_pct <= Decimal::ZERO
            || config.take_profit_pct <= Decimal::ZERO
            || config.max_drawdown_pct <= Decimal::ZERO
        {
            bail!("risk thresholds must be positive");
        }
        if config.risk_fraction <= Decimal::ZERO || config.risk_fraction > Decimal::ONE {
            bail!("risk fraction must be in (0, 1]");
        }
        if config.max_position <= Decimal::ZERO {
            bail!("max position must be positive");
        }

        let mut state = self.state.write().await;
        state.risk_config = config.clone();
        info!(
            stop_loss = %config.stop_loss_pct,
            take_profit = %config.take_profit_pct,
            max_drawdown = %config.max_drawdown_pct,
            "Risk configuration updated"
        );
        self.db.save_risk_config(&config).await?;
        Ok(())
    }

    /// Clear the active alert and reset the loss streak. Cumulative PnL is
    /// left as-is; re-enabling autopilot is a separate operator action.
    pub async fn dismiss_alert(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.governor.dismiss_alert();
        info!("Alert dismissed");
        self.db.save_safety_state(state.governor.state()).await?;
        Ok(())
    }

    /// Generate an insight for one pair and log it.
    pub async fn insight(&self, pair: &str) -> Result<Insight> {
        let snapshot = self.feed.snapshot().await;
        let Some(quote) = snapshot.quote(pair) else {
            bail!("no quote available for {} yet", pair);
        };

        let insight = self
            .pipeline
            .generate_insight(pair, quote.price, quote.change_24h, snapshot.history(pair))
            .await;

        if let Err(e) = self.db.record_insight(&insight).await {
            warn!(error = %e, "Failed to record insight");
        }

        Ok(insight)
    }

    /// Audit the closed-trade history.
    pub async fn audit(&self) -> PerformanceAudit {
        let trades = self.state.read().await.ledger.trades().to_vec();
        self.pipeline.audit_performance(&trades).await
    }

    /// Trade list for the presentation layer: current mode, or everything.
    pub async fn trades(&self, all_modes: bool) -> Vec<Trade> {
        let state = self.state.read().await;
        state
            .ledger
            .trades()
            .iter()
            .filter(|t| all_modes || t.mode == state.mode)
            .cloned()
            .collect()
    }

    /// Snapshot of session state for the presentation layer.
    pub async fn status(&self) -> EngineStatus {
        let state = self.state.read().await;
        let mode = state.mode;

        EngineStatus {
            mode,
            balance: state.ledger.balance(mode),
            open_trades: state
                .ledger
                .open_trades(mode)
                .into_iter()
                .cloned()
                .collect(),
            safety: state.governor.state().clone(),
            risk_config: state.risk_config.clone(),
        }
    }

    /// Latest quote per tracked pair, for the presentation layer.
    pub async fn quotes(&self) -> Vec<Quote> {
        let mut quotes = Vec::new();
        for pair in self.feed.pairs() {
            if let Some(quote) = self.feed.quote(pair).await {
                quotes.push(quote);
            }
        }
        quotes
    }

    /// Refresh the feed once (used by one-shot CLI commands).
    pub async fn refresh_market(&self) {
        self.feed.refresh().await;
    }
}

/// Point-in-time session status.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub mode: AccountMode,
    pub balance: Decimal,
    pub open_trades: Vec<Trade>,
    pub safety: SafetyState,
    pub risk_config: RiskConfig,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Status ===")?;
        writeln!(f, "Mode:               {}", self.mode.as_str())?;
        writeln!(f, "Balance:            ${:.2}", self.balance)?;
        writeln!(
            f,
            "Autopilot:          {}",
            if self.safety.autopilot_enabled {
                "enabled"
            } else {
                "disabled"
            }
        )?;
        writeln!(
            f,
            "Consecutive losses: {}",
            self.safety.consecutive_losses
        )?;
        writeln!(f, "Cumulative PnL:     ${:.2}", self.safety.cumulative_pnl)?;
        if let Some(alert) = &self.safety.alert {
            writeln!(f, "ALERT:              {}", alert)?;
        }
        writeln!(
            f,
            "Risk:               stop {}% / target {}% / drawdown {}%",
            self.risk_config.stop_loss_pct,
            self.risk_config.take_profit_pct,
            self.risk_config.max_drawdown_pct
        )?;

        writeln!(f, "\nOpen trades ({}):", self.open_trades.len())?;
        for trade in &self.open_trades {
            writeln!(
                f,
                "  {}  {} {} ${:.2} @ {:.2} (stop {:.2} / target {:.2})",
                trade.id,
                trade.pair,
                trade.side.as_str(),
                trade.amount,
                trade.entry_price,
                trade.stop_price,
                trade.take_profit_price
            )?;
        }

        Ok(())
    }
}
