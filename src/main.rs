//! Electrum SPV Client CLI
//!
//! Runs single chain queries against the configured server pool and prints
//! the result as JSON.
//!
//! Configuration comes from `ELECTRUM_*` environment variables (a `.env`
//! file is loaded first); `--server` replaces the configured pool.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use electrum_spv::logging;
use electrum_spv::{ClientConfig, ElectrumClient, ElectrumError, RawTx, ServerConfig, TxHash};

#[derive(Parser)]
#[command(name = "electrum-spv")]
#[command(about = "Bitcoin chain queries and SPV proofs over Electrum servers")]
struct Cli {
    /// Server URL such as ssl://electrum.blockstream.info:50002 (repeatable, tried in order)
    #[arg(short, long = "server", global = true, value_parser = ServerConfig::parse)]
    servers: Vec<ServerConfig>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the network served by the pool
    Network,

    /// List unspent outputs of an address
    Utxos { address: String },

    /// List confirmed transactions of an address, oldest first
    History {
        address: String,

        /// Only the most recent N transactions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fetch and decode a transaction
    Tx { tx_hash: TxHash },

    /// Fetch a serialized transaction
    RawTx { tx_hash: TxHash },

    /// Reconstruct the confirmation depth of a transaction
    Confirmations { tx_hash: TxHash },

    /// Show the chain tip height
    Tip,

    /// Fetch LENGTH + 1 headers starting at FROM
    Headers { from: u32, length: u32 },

    /// Fetch the merkle branch of a transaction in the block at HEIGHT
    Merkle { tx_hash: TxHash, height: u32 },

    /// Broadcast a hex-encoded transaction
    Broadcast { hex: String },

    /// Assemble a verified SPV proof
    Proof {
        tx_hash: TxHash,

        /// Confirmations required before a proof is assembled
        #[arg(short, long, default_value = "6")]
        confirmations: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if !cli.servers.is_empty() {
        config.servers = cli.servers;
    }

    if let Err(e) = logging::init_from_config(&config, cli.json_logs) {
        eprintln!("Warning: {}", e);
    }

    match run(cli.command, config).await {
        Ok(output) => {
            println!("{:#}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error [{}]: {}", err.error_code(), err);
            ExitCode::FAILURE
        }
    }
}

/// Execute one command and render its result
async fn run(command: Commands, config: ClientConfig) -> Result<Value, ElectrumError> {
    let client = ElectrumClient::new(config)?;

    let output = match command {
        Commands::Network => json!({ "network": client.get_network().await? }),
        Commands::Utxos { address } => json!(client.find_unspent_outputs(&address).await?),
        Commands::History { address, limit } => {
            json!(client.get_transaction_history(&address, limit).await?)
        }
        Commands::Tx { tx_hash } => json!(client.get_transaction(&tx_hash).await?),
        Commands::RawTx { tx_hash } => json!({
            "tx_hash": tx_hash,
            "hex": client.get_raw_transaction(&tx_hash).await?,
        }),
        Commands::Confirmations { tx_hash } => json!({
            "tx_hash": tx_hash,
            "confirmations": client.get_confirmations(&tx_hash).await?,
        }),
        Commands::Tip => json!({ "height": client.latest_height().await? }),
        Commands::Headers { from, length } => {
            json!(client.get_headers_chain(from, length).await?)
        }
        Commands::Merkle { tx_hash, height } => {
            json!(client.get_transaction_merkle(&tx_hash, height).await?)
        }
        Commands::Broadcast { hex } => {
            let raw_tx = RawTx::from_hex(&hex)
                .map_err(|e| ElectrumError::invalid_input(format!("invalid transaction hex: {}", e)))?;
            json!({ "tx_hash": client.broadcast(&raw_tx).await? })
        }
        Commands::Proof {
            tx_hash,
            confirmations,
        } => json!(client.assemble_proof(&tx_hash, confirmations).await?),
    };

    Ok(output)
}
