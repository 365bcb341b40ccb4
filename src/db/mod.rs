//! Database persistence for engine state.
//!
//! Stores everything needed to resume after restart: trades, per-mode
//! balances, risk configuration, safety state, session, and an append-only
//! insight log. A missing or corrupt row falls back to documented defaults
//! instead of crashing.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::warn;

use crate::models::{
    AccountMode, Insight, RiskConfig, SafetyState, Trade, TradeSide, TradeStatus,
};

/// Database connection pool with full state management.
pub struct Database {
    pool: SqlitePool,
}

/// Stored trade row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredTrade {
    id: String,
    pair: String,
    side: String,
    status: String,
    amount: f64,
    entry_price: f64,
    exit_price: Option<f64>,
    pnl: Option<f64>,
    pnl_percent: Option<f64>,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    stop_price: f64,
    take_profit_price: f64,
    mode: String,
    opened_at: String,
    closed_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredBalance {
    mode: String,
    amount: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredRiskConfig {
    stop_loss_pct: f64,
    take_profit_pct: f64,
    max_drawdown_pct: f64,
    risk_fraction: f64,
    max_position: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredSafetyState {
    consecutive_losses: i64,
    cumulative_pnl: f64,
    autopilot_enabled: bool,
    alert: Option<String>,
}

impl Database {
    /// Open (or create) a database at the given URL.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Ephemeral in-memory database. A single connection keeps every query
    /// on the same sqlite memory instance.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to create in-memory database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                pair TEXT NOT NULL,
                side TEXT NOT NULL,
                status TEXT NOT NULL,
                amount REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                pnl REAL,
                pnl_percent REAL,
                stop_loss_pct REAL NOT NULL,
                take_profit_pct REAL NOT NULL,
                stop_price REAL NOT NULL,
                take_profit_price REAL NOT NULL,
                mode TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balances (
                mode TEXT PRIMARY KEY,
                amount REAL NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                stop_loss_pct REAL NOT NULL,
                take_profit_pct REAL NOT NULL,
                max_drawdown_pct REAL NOT NULL,
                risk_fraction REAL NOT NULL,
                max_position REAL NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS safety_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                consecutive_losses INTEGER NOT NULL DEFAULT 0,
                cumulative_pnl REAL NOT NULL DEFAULT 0,
                autopilot_enabled INTEGER NOT NULL DEFAULT 1,
                alert TEXT,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                mode TEXT NOT NULL DEFAULT 'TRIAL',
                started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS insights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence INTEGER NOT NULL,
                reasoning TEXT NOT NULL,
                support REAL NOT NULL,
                resistance REAL NOT NULL,
                provenance TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Trades ====================

    pub async fn save_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO trades
            (id, pair, side, status, amount, entry_price, exit_price, pnl,
             pnl_percent, stop_loss_pct, take_profit_pct, stop_price,
             take_profit_price, mode, opened_at, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.pair)
        .bind(trade.side.as_str())
        .bind(trade.status.as_str())
        .bind(trade.amount.to_f64().unwrap_or(0.0))
        .bind(trade.entry_price.to_f64().unwrap_or(0.0))
        .bind(trade.exit_price.and_then(|p| p.to_f64()))
        .bind(trade.pnl.and_then(|p| p.to_f64()))
        .bind(trade.pnl_percent.and_then(|p| p.to_f64()))
        .bind(trade.stop_loss_pct.to_f64().unwrap_or(0.0))
        .bind(trade.take_profit_pct.to_f64().unwrap_or(0.0))
        .bind(trade.stop_price.to_f64().unwrap_or(0.0))
        .bind(trade.take_profit_price.to_f64().unwrap_or(0.0))
        .bind(trade.mode.as_str())
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.closed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load all trades. A corrupt table yields an empty history.
    pub async fn load_trades(&self) -> Vec<Trade> {
        let rows: Vec<StoredTrade> =
            match sqlx::query_as("SELECT * FROM trades ORDER BY opened_at ASC")
                .fetch_all(&self.pool)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, "Failed to load trades, starting empty");
                    return Vec::new();
                }
            };

        rows.into_iter().map(Self::convert_trade).collect()
    }

    fn convert_trade(stored: StoredTrade) -> Trade {
        Trade {
            id: stored.id,
            pair: stored.pair,
            side: TradeSide::from_str(&stored.side),
            status: TradeStatus::from_str(&stored.status),
            amount: Decimal::try_from(stored.amount).unwrap_or(Decimal::ZERO),
            entry_price: Decimal::try_from(stored.entry_price).unwrap_or(Decimal::ZERO),
            exit_price: stored.exit_price.and_then(|p| Decimal::try_from(p).ok()),
            pnl: stored.pnl.and_then(|p| Decimal::try_from(p).ok()),
            pnl_percent: stored.pnl_percent.and_then(|p| Decimal::try_from(p).ok()),
            stop_loss_pct: Decimal::try_from(stored.stop_loss_pct).unwrap_or(Decimal::ZERO),
            take_profit_pct: Decimal::try_from(stored.take_profit_pct).unwrap_or(Decimal::ZERO),
            stop_price: Decimal::try_from(stored.stop_price).unwrap_or(Decimal::ZERO),
            take_profit_price: Decimal::try_from(stored.take_profit_price)
                .unwrap_or(Decimal::ZERO),
            mode: AccountMode::from_str(&stored.mode),
            opened_at: parse_timestamp(&stored.opened_at),
            closed_at: stored.closed_at.as_deref().map(parse_timestamp),
        }
    }

    // ==================== Balances ====================

    pub async fn save_balance(&self, mode: AccountMode, amount: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO balances (mode, amount, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(mode.as_str())
        .bind(amount.to_f64().unwrap_or(0.0))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load persisted balances. Missing modes are absent from the map; the
    /// ledger fills those with its defaults.
    pub async fn load_balances(&self) -> HashMap<AccountMode, Decimal> {
        let rows: Vec<StoredBalance> = match sqlx::query_as("SELECT mode, amount FROM balances")
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to load balances, using defaults");
                return HashMap::new();
            }
        };

        rows.into_iter()
            .map(|row| {
                (
                    AccountMode::from_str(&row.mode),
                    Decimal::try_from(row.amount).unwrap_or(Decimal::ZERO),
                )
            })
            .collect()
    }

    // ==================== Risk configuration ====================

    pub async fn save_risk_config(&self, config: &RiskConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO risk_config
            (id, stop_loss_pct, take_profit_pct, max_drawdown_pct, risk_fraction,
             max_position, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.stop_loss_pct.to_f64().unwrap_or(0.0))
        .bind(config.take_profit_pct.to_f64().unwrap_or(0.0))
        .bind(config.max_drawdown_pct.to_f64().unwrap_or(0.0))
        .bind(config.risk_fraction.to_f64().unwrap_or(0.0))
        .bind(config.max_position.to_f64().unwrap_or(0.0))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_risk_config(&self) -> RiskConfig {
        let row: Option<StoredRiskConfig> = match sqlx::query_as(
            "SELECT stop_loss_pct, take_profit_pct, max_drawdown_pct, risk_fraction, \
             max_position FROM risk_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Failed to load risk config, using defaults");
                None
            }
        };

        let defaults = RiskConfig::default();
        match row {
            Some(stored) => RiskConfig {
                stop_loss_pct: Decimal::try_from(stored.stop_loss_pct)
                    .unwrap_or(defaults.stop_loss_pct),
                take_profit_pct: Decimal::try_from(stored.take_profit_pct)
                    .unwrap_or(defaults.take_profit_pct),
                max_drawdown_pct: Decimal::try_from(stored.max_drawdown_pct)
                    .unwrap_or(defaults.max_drawdown_pct),
                risk_fraction: Decimal::try_from(stored.risk_fraction)
                    .unwrap_or(defaults.risk_fraction),
                max_position: Decimal::try_from(stored.max_position)
                    .unwrap_or(defaults.max_position),
            },
            None => defaults,
        }
    }

    // ==================== Safety state ====================

    pub async fn save_safety_state(&self, state: &SafetyState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO safety_state
            (id, consecutive_losses, cumulative_pnl, autopilot_enabled, alert, updated_at)
            VALUES (1, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(state.consecutive_losses as i64)
        .bind(state.cumulative_pnl.to_f64().unwrap_or(0.0))
        .bind(state.autopilot_enabled)
        .bind(&state.alert)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_safety_state(&self) -> SafetyState {
        let row: Option<StoredSafetyState> = match sqlx::query_as(
            "SELECT consecutive_losses, cumulative_pnl, autopilot_enabled, alert \
             FROM safety_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Failed to load safety state, using defaults");
                None
            }
        };

        match row {
            Some(stored) => SafetyState {
                consecutive_losses: stored.consecutive_losses.max(0) as u32,
                cumulative_pnl: Decimal::try_from(stored.cumulative_pnl)
                    .unwrap_or(Decimal::ZERO),
                autopilot_enabled: stored.autopilot_enabled,
                alert: stored.alert,
            },
            None => SafetyState::default(),
        }
    }

    // ==================== Session ====================

    pub async fn save_session(&self, mode: AccountMode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO session (id, mode, started_at)
            VALUES (1, ?, ?)
            "#,
        )
        .bind(mode.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_session_mode(&self) -> AccountMode {
        let mode: Option<(String,)> =
            match sqlx::query_as("SELECT mode FROM session WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "Failed to load session, defaulting to trial");
                    None
                }
            };

        mode.map(|(m,)| AccountMode::from_str(&m))
            .unwrap_or(AccountMode::Trial)
    }

    // ==================== Insight log ====================

    pub async fn record_insight(&self, insight: &Insight) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO insights
            (pair, action, confidence, reasoning, support, resistance, provenance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&insight.pair)
        .bind(insight.action.as_str())
        .bind(insight.confidence as i64)
        .bind(&insight.reasoning)
        .bind(insight.support.to_f64().unwrap_or(0.0))
        .bind(insight.resistance.to_f64().unwrap_or(0.0))
        .bind(insight.provenance.as_str())
        .bind(insight.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_trade_round_trip() {
        let db = Database::in_memory().await.unwrap();

        let mut trade = Trade::open(
            "t1".to_string(),
            "BTC-USD".to_string(),
            TradeSide::Buy,
            dec!(1000),
            dec!(50000),
            &RiskConfig::default(),
            AccountMode::Trial,
        );
        db.save_trade(&trade).await.unwrap();

        trade.status = TradeStatus::Closed;
        trade.exit_price = Some(dec!(49000));
        trade.pnl = Some(dec!(-20));
        trade.pnl_percent = Some(dec!(-2));
        trade.closed_at = Some(Utc::now());
        db.save_trade(&trade).await.unwrap();

        let loaded = db.load_trades().await;
        assert_eq!(loaded.len(), 1);

        let got = &loaded[0];
        assert_eq!(got.id, "t1");
        assert_eq!(got.status, TradeStatus::Closed);
        assert_eq!(got.side, TradeSide::Buy);
        assert_eq!(got.amount, dec!(1000));
        assert_eq!(got.exit_price, Some(dec!(49000)));
        assert_eq!(got.pnl, Some(dec!(-20)));
        assert_eq!(got.stop_loss_pct, dec!(2));
        assert_eq!(got.mode, AccountMode::Trial);
    }

    #[tokio::test]
    async fn test_defaults_when_tables_empty() {
        let db = Database::in_memory().await.unwrap();

        assert!(db.load_trades().await.is_empty());
        assert!(db.load_balances().await.is_empty());
        assert_eq!(db.load_risk_config().await, RiskConfig::default());
        assert_eq!(db.load_safety_state().await, SafetyState::default());
        assert_eq!(db.load_session_mode().await, AccountMode::Trial);
    }

    #[tokio::test]
    async fn test_balance_round_trip() {
        let db = Database::in_memory().await.unwrap();

        db.save_balance(AccountMode::Trial, dec!(9500)).await.unwrap();
        db.save_balance(AccountMode::Live, dec!(120)).await.unwrap();

        let balances = db.load_balances().await;
        assert_eq!(balances.get(&AccountMode::Trial), Some(&dec!(9500)));
        assert_eq!(balances.get(&AccountMode::Live), Some(&dec!(120)));
    }

    #[tokio::test]
    async fn test_risk_config_round_trip() {
        let db = Database::in_memory().await.unwrap();

        let config = RiskConfig {
            stop_loss_pct: dec!(3),
            take_profit_pct: dec!(8),
            max_drawdown_pct: dec!(10),
            risk_fraction: dec!(0.25),
            max_position: dec!(750),
        };
        db.save_risk_config(&config).await.unwrap();

        assert_eq!(db.load_risk_config().await, config);
    }

    #[tokio::test]
    async fn test_safety_state_round_trip() {
        let db = Database::in_memory().await.unwrap();

        let state = SafetyState {
            consecutive_losses: 2,
            cumulative_pnl: dec!(-120.5),
            autopilot_enabled: false,
            alert: Some("drawdown limit reached".to_string()),
        };
        db.save_safety_state(&state).await.unwrap();

        assert_eq!(db.load_safety_state().await, state);
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let db = Database::in_memory().await.unwrap();

        db.save_session(AccountMode::Live).await.unwrap();
        assert_eq!(db.load_session_mode().await, AccountMode::Live);
    }
}
