//! PairPilot trading bot
//!
//! Simulated trading over a small set of crypto pairs: trend-driven autopilot
//! entries, advisory insights with a local fallback, and autonomous
//! settlement against stop-loss/take-profit/drawdown rules.

mod api;
mod db;
mod engine;
mod feed;
mod models;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{AdvisorClient, MarketClient};
use crate::db::Database;
use crate::engine::Engine;
use crate::feed::{MarketFeed, DEFAULT_PAIRS};
use crate::models::{AccountMode, RiskConfig, TradeSide};
use crate::trading::DecisionPipeline;

/// PairPilot CLI.
#[derive(Parser)]
#[command(name = "pairpilot")]
#[command(about = "Risk-managed autonomous trading over crypto pairs", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./pairpilot.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: feed polling, autopilot entries, settlement
    Run {
        /// Trade against the live account instead of the trial account
        #[arg(long)]
        live: bool,

        /// Pairs to track (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        pairs: Vec<String>,
    },

    /// Show session status
    Status,

    /// List trades for the session mode
    Trades {
        /// Include both account modes
        #[arg(long)]
        all: bool,
    },

    /// Open a trade manually at the latest quote
    Open {
        /// Pair symbol, e.g. BTC-USD
        #[arg(short, long)]
        pair: String,

        /// buy or sell
        #[arg(short, long, default_value = "buy")]
        side: String,

        /// Notional amount in quote currency
        #[arg(short, long)]
        amount: f64,
    },

    /// Close an open trade at the latest quote
    Close {
        /// Trade id
        trade_id: String,
    },

    /// Generate an advisory insight for a pair
    Insight {
        /// Pair symbol, e.g. BTC-USD
        pair: String,
    },

    /// Audit closed-trade performance
    Audit,

    /// Enable or disable autopilot
    Autopilot {
        /// on or off
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Update the risk configuration (affects trades opened afterwards)
    SetRisk {
        #[arg(long)]
        stop_loss: Option<f64>,

        #[arg(long)]
        take_profit: Option<f64>,

        #[arg(long)]
        max_drawdown: Option<f64>,

        #[arg(long)]
        risk_fraction: Option<f64>,

        #[arg(long)]
        max_position: Option<f64>,
    },

    /// Dismiss the active safety alert
    DismissAlert,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database
    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::Run { live, pairs } => {
            let mode = if live {
                AccountMode::Live
            } else {
                AccountMode::Trial
            };
            let pairs = if pairs.is_empty() {
                DEFAULT_PAIRS.iter().map(|p| p.to_string()).collect()
            } else {
                pairs
            };

            info!(mode = %mode.as_str(), pairs = ?pairs, "Starting engine");

            let engine = build_engine(db, pairs.clone(), mode).await?;
            let status = engine.status().await;

            println!("\n=== PairPilot ===");
            println!("Mode:      {}", mode.as_str());
            println!("Pairs:     {}", pairs.join(", "));
            println!("Balance:   ${:.2}", status.balance);
            println!(
                "Autopilot: {}",
                if status.safety.autopilot_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            engine.run().await?;

            println!("\n{}", engine.status().await);
        }

        Commands::Status => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, default_pairs(), mode).await?;
            engine.refresh_market().await;

            println!("\n{}", engine.status().await);

            println!("Quotes:");
            for quote in engine.quotes().await {
                println!(
                    "  {:<9} {:>12.2}  24h {:+.2}%{}",
                    quote.pair,
                    quote.price,
                    quote.change_24h,
                    if quote.synthetic { "  (synthetic)" } else { "" }
                );
            }
        }

        Commands::Trades { all } => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, default_pairs(), mode).await?;
            let trades = engine.trades(all).await;

            if trades.is_empty() {
                println!("No trades recorded.");
                return Ok(());
            }

            println!(
                "\n{:<36} {:<9} {:<4} {:<6} {:>10} {:>12} {:>12} {:>10}",
                "ID", "PAIR", "SIDE", "MODE", "AMOUNT", "ENTRY", "EXIT", "PNL"
            );
            println!("{}", "-".repeat(106));

            for trade in trades {
                println!(
                    "{:<36} {:<9} {:<4} {:<6} {:>10.2} {:>12.2} {:>12} {:>10}",
                    trade.id,
                    trade.pair,
                    trade.side.as_str(),
                    trade.mode.as_str(),
                    trade.amount,
                    trade.entry_price,
                    trade
                        .exit_price
                        .map(|p| format!("{:.2}", p))
                        .unwrap_or_else(|| "-".to_string()),
                    trade
                        .pnl
                        .map(|p| format!("{:.2}", p))
                        .unwrap_or_else(|| "open".to_string()),
                );
            }
        }

        Commands::Open { pair, side, amount } => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, vec![pair.clone()], mode).await?;
            engine.refresh_market().await;

            let side = TradeSide::from_str(&side);
            let amount = Decimal::try_from(amount)?;
            let trade = engine.open_trade(&pair, side, amount).await?;

            println!("Opened {} {} ${:.2} @ {:.2}", trade.pair, trade.side.as_str(), trade.amount, trade.entry_price);
            println!("Trade id: {}", trade.id);
            println!(
                "Stop: {:.2}  Target: {:.2}",
                trade.stop_price, trade.take_profit_price
            );
        }

        Commands::Close { trade_id } => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, default_pairs(), mode).await?;
            engine.refresh_market().await;

            match engine.close_trade(&trade_id).await? {
                Some(report) => {
                    println!(
                        "Closed {} @ {:.2}: PnL {:.2} ({:.2}%)",
                        report.pair, report.exit_price, report.pnl, report.pnl_percent
                    );
                }
                None => println!("Trade {} is unknown or already closed.", trade_id),
            }
        }

        Commands::Insight { pair } => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, vec![pair.clone()], mode).await?;
            engine.refresh_market().await;

            let insight = engine.insight(&pair).await?;

            println!("\n=== Insight: {} ===", insight.pair);
            println!("Action:      {}", insight.action.as_str());
            println!("Confidence:  {}/100", insight.confidence);
            println!("Provenance:  {}", insight.provenance.as_str());
            println!("Support:     {:.2}", insight.support);
            println!("Resistance:  {:.2}", insight.resistance);
            println!("Reasoning:   {}", insight.reasoning);
        }

        Commands::Audit => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, default_pairs(), mode).await?;

            let audit = engine.audit().await;
            println!("\n=== Performance Audit ===");
            println!("{}", audit);
        }

        Commands::Autopilot { state } => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, default_pairs(), mode).await?;

            let enabled = state == "on";
            engine.toggle_autopilot(enabled).await?;
            println!(
                "Autopilot {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }

        Commands::SetRisk {
            stop_loss,
            take_profit,
            max_drawdown,
            risk_fraction,
            max_position,
        } => {
            let mode = db.load_session_mode().await;
            let current = db.load_risk_config().await;
            let engine = build_engine(db, default_pairs(), mode).await?;

            let config = RiskConfig {
                stop_loss_pct: override_or(stop_loss, current.stop_loss_pct),
                take_profit_pct: override_or(take_profit, current.take_profit_pct),
                max_drawdown_pct: override_or(max_drawdown, current.max_drawdown_pct),
                risk_fraction: override_or(risk_fraction, current.risk_fraction),
                max_position: override_or(max_position, current.max_position),
            };

            engine.update_risk_config(config.clone()).await?;
            print_risk_config(&config);
        }

        Commands::DismissAlert => {
            let mode = db.load_session_mode().await;
            let engine = build_engine(db, default_pairs(), mode).await?;

            engine.dismiss_alert().await?;
            println!("Alert dismissed. Loss streak reset; re-enable autopilot to resume.");
        }

        Commands::Config => {
            let config = db.load_risk_config().await;
            print_risk_config(&config);
        }
    }

    Ok(())
}

/// Wire up the engine from its parts.
async fn build_engine(db: Database, pairs: Vec<String>, mode: AccountMode) -> Result<Engine> {
    let market = MarketClient::new()?;
    let feed = MarketFeed::new(market, pairs);
    let advisor = AdvisorClient::from_env()?;
    let pipeline = DecisionPipeline::new(advisor);

    Engine::new(db, feed, pipeline, mode).await
}

fn default_pairs() -> Vec<String> {
    DEFAULT_PAIRS.iter().map(|p| p.to_string()).collect()
}

fn override_or(value: Option<f64>, current: Decimal) -> Decimal {
    value
        .and_then(|v| Decimal::try_from(v).ok())
        .unwrap_or(current)
}

fn print_risk_config(config: &RiskConfig) {
    println!("\n=== Risk Configuration ===");
    println!("Stop Loss:      {}%", config.stop_loss_pct);
    println!("Take Profit:    {}%", config.take_profit_pct);
    println!("Max Drawdown:   {}%", config.max_drawdown_pct);
    println!("Risk Fraction:  {}", config.risk_fraction);
    println!("Max Position:   ${}", config.max_position);
}
