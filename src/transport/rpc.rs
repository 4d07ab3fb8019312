//! JSON-RPC transport over HTTP

use super::Transport;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;

pub struct RpcTransport {
    chain_id: u64,
    url: url::Url,
    provider: DynProvider,
}

impl RpcTransport {
    /// Connect lazily to `rpc_url`; no request is made until first use
    pub fn new(chain_id: u64, rpc_url: &str) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL for chain {}: {}", chain_id, e)))?;
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();

        Ok(Self {
            chain_id,
            url,
            provider,
        })
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| Error::Network(format!("Failed to get nonce: {}", e)))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| Error::Network(format!("Failed to broadcast: {}", e)))?;
        Ok(*pending.tx_hash())
    }
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Hosted endpoint URLs can embed API keys
        f.debug_struct("RpcTransport")
            .field("chain_id", &self.chain_id)
            .field("host", &self.url.host_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            RpcTransport::new(1, "not a url"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let transport =
            RpcTransport::new(1, "https://eth-mainnet.g.alchemy.com/v2/secret-key").unwrap();
        let debug_str = format!("{:?}", transport);
        assert!(debug_str.contains("eth-mainnet.g.alchemy.com"));
        assert!(!debug_str.contains("secret-key"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let transport = RpcTransport::new(1, "http://127.0.0.1:1").unwrap();
        let err = transport.pending_nonce(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
