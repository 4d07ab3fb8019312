//! Credential vault CLI
//!
//! Secrets are read from environment variables named on the command line,
//! never from the arguments themselves.

use alloy::hex;
use alloy::primitives::{Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use chrono::Utc;
use clap::{Parser, Subcommand};
use keyvault_signer::crypto::PassphraseCipher;
use keyvault_signer::registry::{parse_address, SystemClock};
use keyvault_signer::sequencer::{
    JsonlLedger, PassphraseAuthenticator, StandbyRecord, StandbyRecordFactory,
};
use keyvault_signer::storage::FileStorage;
use keyvault_signer::{
    Config, CredentialRegistry, Error, GatedSigningAccount, Network, Result, RpcConfig,
    TransactionSequencer, TransportRegistry, PASSPHRASE_ENV,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "vault")]
#[command(about = "Self-custodial Ethereum credential vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored accounts, oldest first
    Accounts,

    /// Import a private key
    Import {
        /// Environment variable holding the private key (hex)
        #[arg(long, default_value = "PRIVATE_KEY")]
        key_env: String,

        /// Environment variable holding the passphrase
        #[arg(long, default_value = PASSPHRASE_ENV)]
        passphrase_env: String,
    },

    /// Re-seal an account under a new passphrase
    ChangePassphrase {
        /// Account address
        address: String,

        #[arg(long, default_value = PASSPHRASE_ENV)]
        passphrase_env: String,

        /// Environment variable holding the new passphrase
        #[arg(long, default_value = "VAULT_NEW_PASSPHRASE")]
        new_passphrase_env: String,
    },

    /// Sign an EIP-191 personal message
    SignMessage {
        /// Account address
        address: String,

        /// Message text
        message: String,

        #[arg(long, default_value = PASSPHRASE_ENV)]
        passphrase_env: String,
    },

    /// Sign and broadcast a transaction
    Send {
        /// Sender address
        address: String,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Value in wei
        #[arg(long, default_value = "0")]
        value: String,

        /// Calldata (hex encoded, with or without 0x prefix)
        #[arg(long)]
        data: Option<String>,

        /// Network (ethereum, arbitrum, optimism, base, polygon)
        #[arg(short, long, default_value = "ethereum")]
        network: String,

        #[arg(long, default_value_t = 21_000)]
        gas_limit: u64,

        /// Max fee per gas in wei
        #[arg(long)]
        max_fee: u128,

        /// Max priority fee per gas in wei
        #[arg(long)]
        priority_fee: u128,

        #[arg(long, default_value = PASSPHRASE_ENV)]
        passphrase_env: String,
    },

    /// Delete every stored account
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Accounts => {
            let registry = open_registry(&config).await?;
            let accounts = registry.accounts().await;
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
        Commands::Import {
            key_env,
            passphrase_env,
        } => {
            let registry = open_registry(&config).await?;
            let key = read_secret(&key_env)?;
            let passphrase = read_secret(&passphrase_env)?;
            let account = registry
                .add_account(key.expose_secret(), &passphrase)
                .await?;
            println!("{}", account.address);
        }
        Commands::ChangePassphrase {
            address,
            passphrase_env,
            new_passphrase_env,
        } => {
            let registry = open_registry(&config).await?;
            let old = read_secret(&passphrase_env)?;
            let new = read_secret(&new_passphrase_env)?;
            if !registry.update_passphrase(&address, &old, &new).await? {
                return Err(Error::AccountNotFound(address));
            }
            println!("Passphrase updated");
        }
        Commands::SignMessage {
            address,
            message,
            passphrase_env,
        } => {
            let registry = open_registry(&config).await?;
            let passphrase = read_secret(&passphrase_env)?;
            let window = Duration::from_secs(config.default_unlock_secs);
            if !registry.unlock(&address, &passphrase, window).await? {
                return Err(Error::AccountNotFound(address));
            }
            let account = signing_account(&registry, &address).await?;
            let signature = account.sign_message(message.as_bytes()).await?;
            println!("0x{}", hex::encode(signature.as_bytes()));
        }
        Commands::Send {
            address,
            to,
            value,
            data,
            network,
            gas_limit,
            max_fee,
            priority_fee,
            passphrase_env,
        } => {
            let request = build_request(
                &to,
                &value,
                data.as_deref(),
                gas_limit,
                max_fee,
                priority_fee,
            )?;
            run_send(&config, &address, &network, request, &passphrase_env).await?;
        }
        Commands::Clear { yes } => {
            if !yes {
                return Err(Error::InvalidArgument(
                    "refusing to delete accounts without --yes".to_string(),
                ));
            }
            let registry = open_registry(&config).await?;
            let deleted = registry.clear_all().await?;
            println!("Deleted {} account(s)", deleted);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn open_registry(config: &Config) -> Result<Arc<CredentialRegistry>> {
    let storage = Arc::new(FileStorage::new(&config.storage_path));
    let registry = Arc::new(CredentialRegistry::new(
        storage,
        PassphraseCipher::new(config.kdf),
        Arc::new(SystemClock),
    ));
    registry.load_existing_accounts().await?;
    Ok(registry)
}

async fn signing_account(
    registry: &Arc<CredentialRegistry>,
    address: &str,
) -> Result<GatedSigningAccount> {
    registry
        .get_signing_account(address)
        .await?
        .ok_or_else(|| Error::AccountNotFound(address.to_string()))
}

fn read_secret(name: &str) -> Result<SecretString> {
    std::env::var(name)
        .map(SecretString::from)
        .map_err(|_| Error::Config(format!("Environment variable {} is not set", name)))
}

fn build_request(
    to: &str,
    value: &str,
    data: Option<&str>,
    gas_limit: u64,
    max_fee: u128,
    priority_fee: u128,
) -> Result<TransactionRequest> {
    let to = parse_address(to)
        .ok_or_else(|| Error::InvalidArgument(format!("Invalid recipient: {}", to)))?;
    let value: U256 = value
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("Invalid value: {}", e)))?;

    let mut request = TransactionRequest::default()
        .to(to)
        .value(value)
        .gas_limit(gas_limit)
        .max_fee_per_gas(max_fee)
        .max_priority_fee_per_gas(priority_fee);
    if let Some(data) = data {
        let calldata = hex::decode(data)
            .map_err(|e| Error::InvalidArgument(format!("Invalid calldata: {}", e)))?;
        request = request.input(Bytes::from(calldata).into());
    }
    Ok(request)
}

async fn run_send(
    config: &Config,
    address: &str,
    network: &str,
    request: TransactionRequest,
    passphrase_env: &str,
) -> Result<()> {
    let network = Network::from_name(network)?;
    let chain_id = network.chain_id();
    if !config.networks.contains(&network) {
        return Err(Error::UnsupportedChain(chain_id));
    }

    let registry = open_registry(config).await?;
    let account = signing_account(&registry, address).await?;

    let chain_ids: Vec<u64> = config.networks.iter().map(Network::chain_id).collect();
    let transports = TransportRegistry::from_rpc_config(&RpcConfig::from_env(), &chain_ids)?;
    let authenticator = PassphraseAuthenticator::new(
        std::env::var(passphrase_env).ok().map(SecretString::from),
        Duration::from_secs(config.default_unlock_secs),
    );
    let ledger = Arc::new(JsonlLedger::new(&config.ledger_path));
    let sequencer = TransactionSequencer::new(
        transports,
        config.transport,
        Arc::new(authenticator),
        ledger,
    );

    tracing::info!(
        from = %account.address(),
        network = network.name(),
        transport = %config.transport,
        "Sending transaction"
    );

    let from = account.address();
    let factory: StandbyRecordFactory<StandbyRecord> = Box::new(move |hash| {
        Some(StandbyRecord {
            hash,
            chain_id,
            from,
            created_at: Utc::now(),
            kind: "send".to_string(),
            metadata: serde_json::Value::Null,
        })
    });

    let hashes = sequencer
        .send(vec![request], chain_id, &account, vec![factory])
        .await?;
    for hash in hashes {
        println!("{}", hash);
    }
    Ok(())
}
