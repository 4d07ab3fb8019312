//! Encrypted key records on top of [`SecureStorage`]
//!
//! Record keys have the form
//! `account--<ISO-8601 created_at>--<40 lowercase hex address>` and must
//! stay byte-compatible with vaults written by earlier releases. The value
//! under each key is `{"password": "<ciphertext>"}`. Records written by
//! other tools with a looser timestamp or uppercase hex are still found and
//! rewritten under the exact key they were stored with.

use super::SecureStorage;
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::Address;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prefix shared by every account record key
pub const ACCOUNT_KEY_PREFIX: &str = "account--";

const SEPARATOR: &str = "--";

/// Parsed account record key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageKey {
    pub created_at: DateTime<Utc>,
    pub address: Address,
}

impl StorageKey {
    pub fn new(created_at: DateTime<Utc>, address: Address) -> Self {
        Self {
            created_at,
            address,
        }
    }

    /// Parse a raw storage key, returning `None` for keys that are not
    /// account records
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(ACCOUNT_KEY_PREFIX)?;
        let (timestamp, address) = rest.rsplit_once(SEPARATOR)?;

        if address.len() != 40 || !address.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let address = address.parse::<Address>().ok()?;
        let created_at = DateTime::parse_from_rfc3339(timestamp)
            .ok()?
            .with_timezone(&Utc);

        Some(Self {
            created_at,
            address,
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            ACCOUNT_KEY_PREFIX,
            self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            SEPARATOR,
            hex::encode(self.address.as_slice())
        )
    }
}

/// Value stored under an account key
#[derive(Debug, Serialize, Deserialize)]
struct StoredSecret {
    password: String,
}

/// An account record key as found in storage
///
/// `raw` is the exact string the record lives under. Vaults written by
/// other tools may use a non-canonical timestamp or address case, so reads
/// and rewrites of an existing record always go through `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub raw: String,
    pub key: StorageKey,
}

/// A record located in storage
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub raw: String,
    pub key: StorageKey,
    pub ciphertext: String,
}

/// Keyed ciphertext store
#[derive(Clone)]
pub struct EncryptedKeyStore {
    storage: Arc<dyn SecureStorage>,
}

impl EncryptedKeyStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Write a new record under the canonical rendering of `key`
    pub async fn put(&self, key: &StorageKey, ciphertext: &str) -> Result<()> {
        self.put_raw(&key.to_string(), ciphertext).await
    }

    /// Replace the ciphertext of an existing record in place
    pub async fn overwrite(&self, record: &KeyRecord, ciphertext: &str) -> Result<()> {
        self.put_raw(&record.raw, ciphertext).await
    }

    pub async fn get(&self, key: &StorageKey) -> Result<Option<String>> {
        self.get_raw(&key.to_string()).await
    }

    pub async fn list_keys(&self) -> Result<Vec<String>> {
        self.storage.keys().await
    }

    /// Delete every entry whose key starts with `prefix`, returning the count
    pub async fn delete_all(&self, prefix: &str) -> Result<usize> {
        let mut deleted = 0;
        for key in self.list_keys().await? {
            if key.starts_with(prefix) {
                self.storage.delete(&key).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete every account record, returning the count
    ///
    /// Only keys that parse as account records are touched; other entries
    /// sharing the prefix are left alone.
    pub async fn delete_records(&self) -> Result<usize> {
        let records = self.records().await?;
        for record in &records {
            self.storage.delete(&record.raw).await?;
        }
        Ok(records.len())
    }

    /// Every account record key, oldest first
    pub async fn records(&self) -> Result<Vec<StoredKey>> {
        let mut keys: Vec<StoredKey> = self
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|raw| StorageKey::parse(&raw).map(|key| StoredKey { raw, key }))
            .collect();
        keys.sort_by_key(|k| k.key.created_at);
        Ok(keys)
    }

    /// Locate the record for an address
    pub async fn find(&self, address: Address) -> Result<Option<KeyRecord>> {
        let mut matches = self
            .records()
            .await?
            .into_iter()
            .filter(|k| k.key.address == address);

        let Some(StoredKey { raw, key }) = matches.next() else {
            return Ok(None);
        };
        if matches.next().is_some() {
            tracing::warn!(address = %address, "Multiple key records for one address, using the oldest");
        }

        let ciphertext = self
            .get_raw(&raw)
            .await?
            .ok_or_else(|| Error::Storage(format!("Record {} vanished", raw)))?;
        Ok(Some(KeyRecord {
            raw,
            key,
            ciphertext,
        }))
    }

    async fn put_raw(&self, raw: &str, ciphertext: &str) -> Result<()> {
        let value = serde_json::to_string(&StoredSecret {
            password: ciphertext.to_string(),
        })?;
        self.storage.set(raw, value).await
    }

    async fn get_raw(&self, raw: &str) -> Result<Option<String>> {
        let Some(value) = self.storage.get(raw).await? else {
            return Ok(None);
        };
        let stored: StoredSecret = serde_json::from_str(&value)
            .map_err(|e| Error::Storage(format!("Malformed record {}: {}", raw, e)))?;
        Ok(Some(stored.password))
    }
}

impl fmt::Debug for EncryptedKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKeyStore").finish_non_exhaustive()
    }
}
