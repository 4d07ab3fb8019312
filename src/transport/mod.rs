//! Chain transports
//!
//! A [`Transport`] is the narrow slice of JSON-RPC the vault needs: the
//! chain it is bound to, the pending nonce of an address, and raw
//! transaction broadcast. Transports are looked up by chain ID and
//! [`TransportKind`] in a [`TransportRegistry`].

mod rpc;

pub use rpc::RpcTransport;

use crate::config::RpcConfig;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Family of RPC endpoints a transaction is broadcast through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The wallet backend's own proxy
    Internal,
    /// Public or third-party providers
    #[default]
    External,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Internal => write!(f, "internal"),
            TransportKind::External => write!(f, "external"),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Chain this transport is connected to
    fn chain_id(&self) -> u64;

    /// Next nonce for `address`, counting pending transactions
    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    /// Broadcast an EIP-2718 encoded signed transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;
}

/// Transports indexed by chain and kind
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<(u64, TransportKind), Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build RPC transports for every configured endpoint of `chain_ids`
    pub fn from_rpc_config(config: &RpcConfig, chain_ids: &[u64]) -> Result<Self> {
        let mut registry = Self::new();
        for (chain_id, kind, url) in config.endpoints() {
            if !chain_ids.contains(&chain_id) {
                continue;
            }
            registry.insert(kind, Arc::new(RpcTransport::new(chain_id, url)?));
        }
        tracing::debug!(count = registry.transports.len(), "Built transports");
        Ok(registry)
    }

    /// Register a transport under its own chain ID, replacing any previous one
    pub fn insert(&mut self, kind: TransportKind, transport: Arc<dyn Transport>) {
        self.transports.insert((transport.chain_id(), kind), transport);
    }

    pub fn resolve(&self, chain_id: u64, kind: TransportKind) -> Result<Arc<dyn Transport>> {
        self.transports
            .get(&(chain_id, kind))
            .cloned()
            .ok_or(Error::UnsupportedChain(chain_id))
    }

    /// Chain IDs with a transport of `kind`, ascending
    pub fn chains(&self, kind: TransportKind) -> Vec<u64> {
        let mut chains: Vec<u64> = self
            .transports
            .keys()
            .filter(|(_, k)| *k == kind)
            .map(|(chain_id, _)| *chain_id)
            .collect();
        chains.sort_unstable();
        chains
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("endpoints", &self.transports.keys().collect::<Vec<_>>())
            .finish()
    }
}
