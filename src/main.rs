use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use momtrader::api::{venue_errors, DmaClient, MarketDataSource, TokenRefresher};
use momtrader::execution::{Ledger, OrderExecutor, PriceFeed};
use momtrader::strategy::MomentumSelector;
use momtrader::{AppConfig, MomentumTrader};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "momtrader")]
#[command(about = "Momentum rotation trader over DMA", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// DMA user id (overrides MOMTRADER__USER_ID)
    #[arg(long, global = true)]
    uid: Option<String>,

    /// DMA password (overrides MOMTRADER__PASSWORD)
    #[arg(long, global = true)]
    pass: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading loop until Ctrl+C
    Run {
        /// Collect data and rank assets but never submit orders
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the consolidated order book touch for one asset
    Book {
        #[arg(short, long)]
        asset: String,
    },
    /// Print the balance of one asset at one venue
    Balance {
        #[arg(short, long)]
        venue: String,
        #[arg(short, long)]
        asset: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(uid) = cli.uid {
        config.user_id = uid;
    }
    if let Some(pass) = cli.pass {
        config.password = pass;
    }
    config.require_credentials()?;

    match cli.command {
        Command::Run { dry_run } => {
            if dry_run {
                config.execution_safety = true;
            }
            run_trader(config).await
        }
        Command::Book { asset } => show_book(config, &asset).await,
        Command::Balance { venue, asset } => show_balance(config, &venue, &asset).await,
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("momtrader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_trader(config: AppConfig) -> Result<()> {
    tracing::info!("🚀 momtrader starting");
    tracing::info!("  Assets: {} / {}", config.assets.join(", "), config.base_asset);
    tracing::info!("  Capital per entry: {}", config.capital);
    tracing::info!(
        "  Gainer window: {}, deviation window: {}, min deviation: {}",
        config.gainer_periods,
        config.deviation_periods,
        config.min_deviation
    );
    if config.execution_safety {
        tracing::warn!("⚠️  Execution safety on, no orders will be submitted");
    }

    let client = DmaClient::connect(config.dma_settings())
        .await
        .context("DMA login failed")?;
    let refresher = TokenRefresher::start(client.clone(), config.token_refresh_interval());
    let client = Arc::new(client);

    let feed = PriceFeed::new(
        client.clone(),
        config.assets.clone(),
        config.base_asset.clone(),
        config.history_capacity,
    );
    let (executor, faults) =
        OrderExecutor::new(client, Ledger::shared(), config.execution_settings());

    let mut trader = MomentumTrader::new(
        feed,
        MomentumSelector::new(config.momentum_params()),
        executor,
        faults,
        config.trader_settings()?,
    );

    tracing::info!("Press Ctrl+C to stop...");

    let result = trader
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    refresher.stop().await;

    for position in trader.ledger().positions() {
        tracing::info!(
            "  Open position: {} {} @ {}",
            position.size,
            position.asset,
            position.entry_price
        );
    }

    result.context("Trading halted with an order in an unknown state")?;
    tracing::info!("👋 momtrader stopped");
    Ok(())
}

async fn show_book(config: AppConfig, asset: &str) -> Result<()> {
    let client = DmaClient::connect(config.dma_settings())
        .await
        .context("DMA login failed")?;

    let book = client
        .order_book(asset, &config.base_asset)
        .await
        .with_context(|| format!("Failed to fetch order book for {}", asset))?;

    match (book.best_bid(), book.best_offer()) {
        (Some(bid), Some(offer)) => {
            tracing::info!("{}/{}", asset, config.base_asset);
            tracing::info!("  Best bid:   {} ({})", bid.price, bid.venue);
            tracing::info!("  Best offer: {} ({})", offer.price, offer.venue);
            if let Some(mid) = book.mid_price(Decimal::ZERO) {
                tracing::info!("  Mid:        {}", mid);
            }
        }
        _ => tracing::warn!("Order book for {} has an empty side", asset),
    }

    Ok(())
}

async fn show_balance(config: AppConfig, venue: &str, asset: &str) -> Result<()> {
    let client = DmaClient::connect(config.dma_settings())
        .await
        .context("DMA login failed")?;

    let balance = client
        .balance(venue, asset)
        .await
        .with_context(|| format!("Failed to fetch {} balance at {}", asset, venue))?;

    if let Some(reason) = venue_errors(&balance.errors) {
        anyhow::bail!("Venue rejected balance request: {}", reason);
    }

    tracing::info!("{} at {}: {}", balance.asset, balance.venue, balance.amount);
    Ok(())
}
