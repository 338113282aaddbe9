//! Safe Signer CLI Application
//!
//! Collects owner signatures for a multisig account transaction and relays it.

use clap::{Parser, Subcommand};
use safe_signer::cli::{self, AppState};
use safe_signer::config::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "safe-signer")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Off-chain signature collection for multisig accounts", long_about = None)]
struct Cli {
    /// Config file with accounts, signers and transaction parameters
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Account name or address (defaults to the first configured)
    #[arg(short, long)]
    safe: Option<String>,

    /// Signature store file (defaults to signatures.json next to the config)
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config file
    CheckConfig,

    /// Show the transaction hashes and collected signatures
    Hash,

    /// Print the EIP-712 typed data document
    TypedData,

    /// Sign the transaction as an owner
    Sign {
        /// Signer name or address
        #[arg(short, long)]
        signer: String,
    },

    /// Print the relay transaction before signing
    UnsignedTx {
        /// Relayer name or address
        #[arg(short, long)]
        relayer: String,
    },

    /// Sign the relay transaction without sending it
    SignedTx {
        /// Relayer name or address
        #[arg(short, long)]
        relayer: String,
    },

    /// Sign and broadcast the relay transaction
    Broadcast {
        /// Relayer name or address
        #[arg(short, long)]
        relayer: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Config check never touches the node
    if let Commands::CheckConfig = cli.command {
        return cli::cmd_check_config(&cli.config);
    }

    let mut state = AppState::new(&cli.config, cli.safe.as_deref(), cli.store.clone())?;

    match cli.command {
        Commands::CheckConfig => unreachable!(),

        Commands::Hash => {
            cli::cmd_hash(&mut state)?;
        }

        Commands::TypedData => {
            cli::cmd_typed_data(&mut state)?;
        }

        Commands::Sign { signer } => {
            cli::cmd_sign(&mut state, &signer)?;
        }

        Commands::UnsignedTx { relayer } => {
            cli::cmd_unsigned_tx(&mut state, &relayer)?;
        }

        Commands::SignedTx { relayer } => {
            cli::cmd_signed_tx(&mut state, &relayer)?;
        }

        Commands::Broadcast { relayer } => {
            cli::cmd_broadcast(&mut state, &relayer)?;
        }
    }

    Ok(())
}
