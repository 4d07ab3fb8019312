//! RPC endpoint configuration
//!
//! Endpoints are grouped by [`TransportKind`]:
//! - External endpoints follow Ethereum ecosystem conventions:
//!   1. Per-chain env vars (ETH_RPC_URL, ARBITRUM_RPC_URL, etc.) - highest priority
//!   2. ALCHEMY_API_KEY - builds URLs for every chain
//!   3. Public RPC fallbacks - for testing only
//! - Internal endpoints come from the wallet backend proxy at
//!   `VAULT_INTERNAL_RPC_URL`, one path segment per chain ID.
//!
//! # Examples
//!
//! ```bash
//! export ETH_RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! export VAULT_INTERNAL_RPC_URL="https://rpc.wallet.internal"
//! ```

use crate::transport::TransportKind;
use std::collections::HashMap;

/// RPC configuration for multiple chains
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    /// RPC URLs indexed by chain ID and transport kind
    urls: HashMap<(u64, TransportKind), String>,
}

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const ARBITRUM: u64 = 42161;
    pub const OPTIMISM: u64 = 10;
    pub const BASE: u64 = 8453;
    pub const POLYGON: u64 = 137;

    pub const ALL: [u64; 5] = [ETHEREUM, ARBITRUM, OPTIMISM, BASE, POLYGON];
}

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const ARBITRUM_RPC_URL: &str = "ARBITRUM_RPC_URL";
    pub const OPTIMISM_RPC_URL: &str = "OPTIMISM_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";
    pub const POLYGON_RPC_URL: &str = "POLYGON_RPC_URL";

    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";

    pub const INTERNAL_RPC_URL: &str = "VAULT_INTERNAL_RPC_URL";
}

/// Public RPC endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const ARBITRUM: &str = "https://arb1.arbitrum.io/rpc";
    pub const OPTIMISM: &str = "https://mainnet.optimism.io";
    pub const BASE: &str = "https://mainnet.base.org";
    pub const POLYGON: &str = "https://polygon-rpc.com";
}

fn per_chain_var(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        chains::ETHEREUM => Some(env_vars::ETH_RPC_URL),
        chains::ARBITRUM => Some(env_vars::ARBITRUM_RPC_URL),
        chains::OPTIMISM => Some(env_vars::OPTIMISM_RPC_URL),
        chains::BASE => Some(env_vars::BASE_RPC_URL),
        chains::POLYGON => Some(env_vars::POLYGON_RPC_URL),
        _ => None,
    }
}

fn alchemy_url(chain_id: u64, key: &str) -> Option<String> {
    let host = match chain_id {
        chains::ETHEREUM => "eth-mainnet",
        chains::ARBITRUM => "arb-mainnet",
        chains::OPTIMISM => "opt-mainnet",
        chains::BASE => "base-mainnet",
        chains::POLYGON => "polygon-mainnet",
        _ => return None,
    };
    Some(format!("https://{}.g.alchemy.com/v2/{}", host, key))
}

fn public_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        chains::ETHEREUM => Some(public_rpcs::ETHEREUM),
        chains::ARBITRUM => Some(public_rpcs::ARBITRUM),
        chains::OPTIMISM => Some(public_rpcs::OPTIMISM),
        chains::BASE => Some(public_rpcs::BASE),
        chains::POLYGON => Some(public_rpcs::POLYGON),
        _ => None,
    }
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create RPC config from an arbitrary variable lookup
    ///
    /// External priority per chain:
    /// 1. Per-chain var
    /// 2. ALCHEMY_API_KEY
    /// 3. Public RPC fallback
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut urls = HashMap::new();
        let alchemy_key = lookup(env_vars::ALCHEMY_API_KEY);
        let internal_base = lookup(env_vars::INTERNAL_RPC_URL);

        for chain_id in chains::ALL {
            let external = per_chain_var(chain_id)
                .and_then(&lookup)
                .inspect(|_| tracing::debug!(chain_id, "Using per-chain RPC URL"))
                .or_else(|| {
                    alchemy_key
                        .as_deref()
                        .and_then(|key| alchemy_url(chain_id, key))
                })
                .or_else(|| {
                    tracing::warn!(chain_id, "No RPC configured, using public RPC (rate limited)");
                    public_url(chain_id).map(str::to_string)
                });
            if let Some(url) = external {
                urls.insert((chain_id, TransportKind::External), url);
            }

            if let Some(base) = internal_base.as_deref() {
                urls.insert(
                    (chain_id, TransportKind::Internal),
                    format!("{}/{}", base.trim_end_matches('/'), chain_id),
                );
            }
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<(u64, TransportKind), String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain and transport kind
    pub fn get(&self, chain_id: u64, kind: TransportKind) -> Option<&str> {
        self.urls.get(&(chain_id, kind)).map(|s| s.as_str())
    }

    /// Iterate over every configured endpoint
    pub fn endpoints(&self) -> impl Iterator<Item = (u64, TransportKind, &str)> {
        self.urls
            .iter()
            .map(|((chain_id, kind), url)| (*chain_id, *kind, url.as_str()))
    }

    /// Check if a chain is configured for a transport kind
    pub fn has_chain(&self, chain_id: u64, kind: TransportKind) -> bool {
        self.urls.contains_key(&(chain_id, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_public_rpc_fallbacks() {
        let config = RpcConfig::from_lookup(lookup_from(&[]));

        assert_eq!(
            config.get(chains::ETHEREUM, TransportKind::External),
            Some(public_rpcs::ETHEREUM)
        );
        assert_eq!(
            config.get(chains::ARBITRUM, TransportKind::External),
            Some(public_rpcs::ARBITRUM)
        );
        assert!(!config.has_chain(chains::ETHEREUM, TransportKind::Internal));
    }

    #[test]
    fn test_per_chain_var_beats_alchemy() {
        let config = RpcConfig::from_lookup(lookup_from(&[
            ("ETH_RPC_URL", "https://custom.rpc"),
            ("ALCHEMY_API_KEY", "KEY"),
        ]));

        assert_eq!(
            config.get(chains::ETHEREUM, TransportKind::External),
            Some("https://custom.rpc")
        );
        assert_eq!(
            config.get(chains::BASE, TransportKind::External),
            Some("https://base-mainnet.g.alchemy.com/v2/KEY")
        );
    }

    #[test]
    fn test_internal_urls_per_chain() {
        let config = RpcConfig::from_lookup(lookup_from(&[(
            "VAULT_INTERNAL_RPC_URL",
            "https://rpc.wallet.internal/",
        )]));

        assert_eq!(
            config.get(chains::POLYGON, TransportKind::Internal),
            Some("https://rpc.wallet.internal/137")
        );
    }

    #[test]
    fn test_get_returns_url() {
        let mut urls = HashMap::new();
        urls.insert((1, TransportKind::External), "https://custom.rpc".to_string());
        let config = RpcConfig::with_urls(urls);

        assert_eq!(config.get(1, TransportKind::External), Some("https://custom.rpc"));
        assert_eq!(config.get(999, TransportKind::External), None);
    }
}
