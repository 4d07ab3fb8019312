//! Secure storage
//!
//! The platform secure store is opaque to the vault: a string-keyed blob
//! store shared with unrelated data. [`EncryptedKeyStore`] layers the
//! account record layout on top of it.

mod file;
mod key_store;

pub use file::FileStorage;
pub use key_store::{EncryptedKeyStore, KeyRecord, StorageKey, StoredKey, ACCOUNT_KEY_PREFIX};

use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Opaque key-value secure storage
#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn keys(&self) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process storage, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
