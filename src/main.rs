//! Prediction Round Operator CLI
//!
//! Meant to be invoked by an external scheduler: `genesis` once per
//! contract deployment, `round` once per round interval.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use round_operator::flows::{self, RoundPlan, RoundReport};
use round_operator::{Config, HttpPriceFeed, JsonRpcNode, Transactor};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "round-operator")]
#[command(about = "Operator tool for prediction-market rounds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start the genesis round
    Genesis,

    /// Execute the current round and place house bets on the next one
    Round {
        /// Do nothing if the current round has not reached its end timestamp
        #[arg(long)]
        require_round_ended: bool,

        /// Execute the round only; place no house bets
        #[arg(long)]
        skip_house_bets: bool,
    },

    /// Fetch and show the scaled settlement price without sending anything
    Price,

    /// Show chain, operator and current round state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    let node = Arc::new(JsonRpcNode::new(&config.rpc_url)?);
    let transactor = Transactor::connect(
        node,
        config.signer.clone(),
        config.contract,
        config.receipt,
        config.retry.clone(),
    )
    .await
    .context("Failed to connect to node")?;

    match cli.command {
        Commands::Genesis => genesis(&config, &transactor).await?,
        Commands::Round { require_round_ended, skip_house_bets } => {
            round(&config, &transactor, require_round_ended, skip_house_bets).await?
        }
        Commands::Price => price(&config, &transactor).await?,
        Commands::Status => status(&transactor).await?,
    }

    Ok(())
}

async fn genesis(config: &Config, transactor: &Transactor) -> Result<()> {
    let report = flows::run_genesis(transactor, config.genesis_gas, config.genesis_start_offset)
        .await
        .context("Genesis failed")?;

    info!(
        "Genesis complete: create={:?} start={:?}",
        report.create.tx_hash, report.start.tx_hash
    );
    Ok(())
}

async fn round(
    config: &Config,
    transactor: &Transactor,
    require_round_ended: bool,
    skip_house_bets: bool,
) -> Result<()> {
    let feed = HttpPriceFeed::new(&config.price.ticker_url, &config.price.klines_url)?;
    let plan = RoundPlan {
        gas: config.round_gas,
        settle_delay: config.settle_delay,
        house_bet_wei: config.house_bet_wei,
        require_round_ended,
        skip_house_bets,
    };

    let report = flows::run_round(transactor, &feed, &config.price, &plan)
        .await
        .context("Round execution failed")?;

    match report {
        RoundReport::NotDue { round_end, now } => {
            info!("Round not executed: ends at {} (now {})", round_end, now);
        }
        RoundReport::Executed { price, execute, house_bets } => {
            info!("Round executed at price {} ({:?})", price.scaled, execute.tx_hash);
            if let Some(bets) = house_bets {
                info!(
                    "House bets on round {}: bull={:?} bear={:?}",
                    bets.round_id, bets.bull.tx_hash, bets.bear.tx_hash
                );
            }
        }
    }
    Ok(())
}

async fn price(config: &Config, transactor: &Transactor) -> Result<()> {
    let feed = HttpPriceFeed::new(&config.price.ticker_url, &config.price.klines_url)?;
    let price = flows::fetch_settlement_price(transactor, &feed, &config.price)
        .await
        .context("Price fetch failed")?;

    println!("Symbol:   {}", config.price.symbol);
    println!("Source:   {:?}", config.price.source);
    println!("Raw:      {}", price.raw);
    println!("Scaling:  {}", config.price.scaling);
    println!("Scaled:   {}", price.scaled);
    Ok(())
}

async fn status(transactor: &Transactor) -> Result<()> {
    let nonce = transactor.nonce().await.context("Failed to read nonce")?;
    let round_id = flows::read_current_round_id(transactor)
        .await
        .context("Failed to read currentRoundId")?;
    let round_end = flows::read_current_round_end(transactor)
        .await
        .context("Failed to read getCurrentRoundEndTimestamp")?;

    println!("Chain ID:          {}", transactor.chain_id());
    println!("Operator:          {:?}", transactor.operator());
    println!("Next nonce:        {}", nonce);
    println!("Current round:     {}", round_id);
    println!("Current round end: {}", round_end);
    Ok(())
}
