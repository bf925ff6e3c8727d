//! ADL CLI - attested decision ledger tooling
//!
//! Key generation, digest and signature helpers for the attestation authority and enclave
//! operators, plus an in-process demo deployment.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// ADL: attested decision ledger
///
/// Decisions produced inside an attested enclave are accepted only when signed by a key the
/// attestation authority bound to an allowlisted code identity.
#[derive(Parser)]
#[command(name = "adl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (JSON)
    #[arg(short, long, global = true, env = "ADL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a secp256k1 key and print its secret and address
    Keygen {
        /// Derive from this 32-byte secret instead of generating one
        #[arg(long)]
        seed_hex: Option<String>,
    },

    /// Print the domain separator for a deployment
    Domain {
        /// Chain id (defaults to the configured one)
        #[arg(long)]
        chain_id: Option<u64>,

        /// Verifying contract address
        #[arg(long)]
        contract: String,
    },

    /// Sign an enclave registration as the attestation authority
    SignRegistration {
        /// Attestation authority secret (hex)
        #[arg(long, env = "ADL_AUTHORITY_KEY", hide_env_values = true)]
        authority_key: String,

        /// Enclave signing key address being vouched for
        #[arg(long)]
        signing_key_address: String,

        /// Code identity hash (hex)
        #[arg(long)]
        code_identity: String,

        /// Expiry, unix seconds
        #[arg(long)]
        expiry: u64,

        /// Chain id (defaults to the configured one)
        #[arg(long)]
        chain_id: Option<u64>,

        /// Registry contract address (defaults to the configured one)
        #[arg(long)]
        registry: Option<String>,
    },

    /// Sign a decision submission as the enclave
    SignDecision {
        /// Enclave signing secret (hex)
        #[arg(long, env = "ADL_ENCLAVE_KEY", hide_env_values = true)]
        enclave_key: String,

        /// Decision submission file (JSON)
        #[arg(short, long)]
        decision: PathBuf,

        /// Chain id (defaults to the configured one)
        #[arg(long)]
        chain_id: Option<u64>,

        /// Ledger contract address (defaults to the configured one)
        #[arg(long)]
        ledger: Option<String>,
    },

    /// Recover the signer of a digest
    Recover {
        /// 32-byte digest (hex)
        #[arg(long)]
        digest: String,

        /// 65-byte r||s||v signature (hex)
        #[arg(long)]
        signature: String,
    },

    /// Run an end-to-end registration and decision against an in-process deployment
    Demo {
        /// Append every emitted event to this hash-chained JSONL journal
        #[arg(long)]
        journal: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.clone())?;

    // Initialize logging
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    if config.logging.json_output {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Keygen { seed_hex } => commands::keys::keygen(seed_hex),
        Commands::Domain { chain_id, contract } => {
            commands::domain::run(&config, chain_id, contract)
        }
        Commands::SignRegistration {
            authority_key,
            signing_key_address,
            code_identity,
            expiry,
            chain_id,
            registry,
        } => commands::sign::registration(
            &config,
            commands::sign::RegistrationArgs {
                authority_key,
                signing_key_address,
                code_identity,
                expiry,
                chain_id,
                registry,
            },
        ),
        Commands::SignDecision {
            enclave_key,
            decision,
            chain_id,
            ledger,
        } => commands::sign::decision(&config, enclave_key, decision, chain_id, ledger),
        Commands::Recover { digest, signature } => commands::keys::recover(digest, signature),
        Commands::Demo { journal } => commands::demo::run(&config, journal),
    }
}
