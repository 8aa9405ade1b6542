//! rusty-bridge: headless wallet session and cross-chain bridge status tool

use alloy::primitives::{Address, B256};
use clap::{Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use futures::StreamExt;
use rusty_bridge_adapters::{AdapterConfig, BridgeRuntime, Deployments};
use rusty_bridge_core::bridge::HIGH_GAS_PRICE_GWEI;
use rusty_bridge_core::domain::find_token;
use rusty_bridge_core::{ChainName, OrderRef, TimestampMs};

#[derive(Parser)]
#[command(
    name = "rusty-bridge",
    about = "Wallet session and cross-chain bridge status tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resume the persisted wallet kind and print the session.
    Status,
    /// Print the supported (source, destination) routes.
    Pairs,
    /// Print the chain registry.
    Chains,
    /// Quote the bridge fee for a token on a route.
    Fee {
        from: ChainName,
        to: ChainName,
        symbol: String,
    },
    /// List a wallet's past bridge transfers.
    History { address: Address },
    /// Report whether Ethereum gas is currently expensive.
    Gas,
    /// Read the on-chain status of an order-book trade.
    OrderStatus {
        /// Chain code, e.g. ETH, BSC or POLYGON.
        chain: ChainName,
        contract: Address,
        memo: B256,
        /// Stop date in milliseconds since the epoch.
        stop_date_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AdapterConfig::from_env();
    let deployments = Deployments::from_config(&config).wrap_err("loading deployments")?;
    let runtime =
        BridgeRuntime::from_config(&config, deployments).wrap_err("assembling bridge runtime")?;

    match cli.command {
        Commands::Status => status(&runtime).await,
        Commands::Pairs => {
            for route in runtime.registry.routes() {
                println!("{} -> {}  {}", route.from, route.to, route.kind);
            }
            Ok(())
        }
        Commands::Chains => {
            for chain in runtime.connector.chains().iter() {
                println!(
                    "{:<16} {:>10}  {:<5} {}",
                    chain.name.as_str(),
                    chain.id,
                    chain.native_coin.symbol,
                    chain.rpc_endpoint
                );
            }
            Ok(())
        }
        Commands::Fee { from, to, symbol } => {
            let provider = runtime.registry.require(from, to)?;
            let tokens = provider
                .tokens()
                .next()
                .await
                .ok_or_else(|| eyre!("{from} -> {to} listed no tokens"))?
                .wrap_err_with(|| format!("loading {from} -> {to} tokens"))?;
            let token = find_token(&tokens, &symbol)?;
            let fee = provider.quote_fee(token, to).await?;
            println!("{} {from} -> {to}: {fee}", token.symbol);
            Ok(())
        }
        Commands::History { address } => {
            let entries = runtime
                .history
                .transactions(address)
                .await
                .wrap_err_with(|| format!("loading history of {address}"))?;
            for entry in entries {
                println!(
                    "{} -> {}  {} {} -> {}  {}",
                    entry.from_network,
                    entry.to_network,
                    entry.amount,
                    entry.from_symbol,
                    entry.to_symbol,
                    entry.status
                );
            }
            Ok(())
        }
        Commands::Gas => {
            let high = runtime
                .context
                .gas_price_is_high(ChainName::Ethereum)
                .await
                .wrap_err("reading Ethereum gas price")?;
            if high {
                println!("gas is above {HIGH_GAS_PRICE_GWEI} gwei");
            } else {
                println!("gas is at or below {HIGH_GAS_PRICE_GWEI} gwei");
            }
            Ok(())
        }
        Commands::OrderStatus {
            chain,
            contract,
            memo,
            stop_date_ms,
        } => {
            let order = OrderRef {
                chain,
                contract,
                memo,
                stop_date: TimestampMs(stop_date_ms),
            };
            let status = runtime
                .order_book
                .status_of(&order)
                .await
                .wrap_err_with(|| format!("reading order {memo} on {chain}"))?;
            println!("{}", serde_json::to_string(&status)?);
            Ok(())
        }
    }
}

async fn status(runtime: &BridgeRuntime) -> Result<()> {
    let Some(kind) = runtime.connector.install_from_storage().await? else {
        println!("no persisted wallet");
        return Ok(());
    };
    let session = runtime
        .connector
        .session()
        .ok_or_else(|| eyre!("{kind} connected without a session"))?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}
