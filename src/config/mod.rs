//! Configuration for the credential vault

pub mod rpc;

use crate::crypto::KdfParams;
use crate::transport::TransportKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Re-export RPC config
pub use rpc::RpcConfig;

/// Passphrase environment variable read by the CLI
pub const PASSPHRASE_ENV: &str = "VAULT_PASSPHRASE";

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
    Polygon,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Ethereum,
        Network::Arbitrum,
        Network::Optimism,
        Network::Base,
        Network::Polygon,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => rpc::chains::ETHEREUM,
            Network::Arbitrum => rpc::chains::ARBITRUM,
            Network::Optimism => rpc::chains::OPTIMISM,
            Network::Base => rpc::chains::BASE,
            Network::Polygon => rpc::chains::POLYGON,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Arbitrum => "arbitrum",
            Network::Optimism => "optimism",
            Network::Base => "base",
            Network::Polygon => "polygon",
        }
    }

    /// Parse a network from its name (`mainnet` is accepted for Ethereum)
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "ethereum" | "mainnet" => Ok(Network::Ethereum),
            "arbitrum" => Ok(Network::Arbitrum),
            "optimism" => Ok(Network::Optimism),
            "base" => Ok(Network::Base),
            "polygon" => Ok(Network::Polygon),
            _ => Err(Error::InvalidArgument(format!("Unknown network: {}", name))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Secure storage file holding the encrypted key records
    pub storage_path: PathBuf,
    /// Local transaction ledger (JSONL) for standby records
    pub ledger_path: PathBuf,
    /// Unlock window used when the caller does not pick one (seconds)
    pub default_unlock_secs: u64,
    /// Argon2id parameters for newly written records
    #[serde(default)]
    pub kdf: KdfParams,
    /// Which family of RPC endpoints to broadcast through
    #[serde(default)]
    pub transport: TransportKind,
    /// Networks the vault builds transports for
    pub networks: Vec<Network>,
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("vault.json"),
            ledger_path: PathBuf::from("standby.jsonl"),
            default_unlock_secs: 300, // 5 minutes
            kdf: KdfParams::default(),
            transport: TransportKind::External,
            networks: Network::ALL.to_vec(),
        }
    }
}
