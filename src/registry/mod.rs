//! Credential registry
//!
//! Owns the account index and the in-memory unlock state. Unlock state is
//! never persisted: every address starts locked when the process starts.
//!
//! Each address has its own async mutex ("slot"). Unlocking and signing for
//! the same address serialize on it, so an expiry check and the signature
//! that follows it always observe the same unlock.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use crate::crypto::{signer_from_key, PassphraseCipher};
use crate::storage::{EncryptedKeyStore, KeyRecord, SecureStorage, StorageKey, StoredKey};
use crate::wallet::GatedSigningAccount;
use crate::{Error, Result};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use chrono::{DateTime, SubsecRound, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

/// A known account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Account {
    pub address: Address,
    pub created_at: DateTime<Utc>,
}

impl From<StorageKey> for Account {
    fn from(key: StorageKey) -> Self {
        Self {
            address: key.address,
            created_at: key.created_at,
        }
    }
}

/// Unlock state for one address
#[derive(Default)]
pub(crate) struct UnlockSlot {
    expires_at: Option<DateTime<Utc>>,
    signer: Option<PrivateKeySigner>,
}

impl UnlockSlot {
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now < expiry)
    }

    /// The signer from the last unlock, if that unlock has not expired
    pub(crate) fn active_signer(&self, now: DateTime<Utc>) -> Option<&PrivateKeySigner> {
        if self.is_active(now) {
            self.signer.as_ref()
        } else {
            None
        }
    }

    fn grant(&mut self, signer: PrivateKeySigner, expires_at: DateTime<Utc>) {
        self.signer = Some(signer);
        self.expires_at = Some(expires_at);
    }

    fn revoke(&mut self) {
        self.signer = None;
        self.expires_at = None;
    }
}

impl std::fmt::Debug for UnlockSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockSlot")
            .field("expires_at", &self.expires_at)
            .field("signer", &self.signer.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Parse an address case-insensitively, with or without `0x`
pub fn parse_address(address: &str) -> Option<Address> {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    digits.to_ascii_lowercase().parse().ok()
}

pub struct CredentialRegistry {
    store: EncryptedKeyStore,
    cipher: PassphraseCipher,
    clock: Arc<dyn Clock>,
    /// Known accounts, oldest first
    accounts: RwLock<Vec<Account>>,
    slots: RwLock<HashMap<Address, Arc<Mutex<UnlockSlot>>>>,
    /// Serializes the exists-check and write of `add_account`
    add_lock: Mutex<()>,
}

impl CredentialRegistry {
    pub fn new(
        storage: Arc<dyn SecureStorage>,
        cipher: PassphraseCipher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: EncryptedKeyStore::new(storage),
            cipher,
            clock,
            accounts: RwLock::new(Vec::new()),
            slots: RwLock::new(HashMap::new()),
            add_lock: Mutex::new(()),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Rebuild the account index from storage
    ///
    /// Keys that are not account records are ignored.
    pub async fn load_existing_accounts(&self) -> Result<Vec<Account>> {
        let mut loaded: Vec<Account> = Vec::new();
        for StoredKey { key, .. } in self.store.records().await? {
            if loaded.iter().any(|a| a.address == key.address) {
                warn!(address = %key.address, "Skipping duplicate key record");
                continue;
            }
            loaded.push(key.into());
        }

        info!(count = loaded.len(), "Loaded accounts");
        *self.accounts.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Snapshot of the account index
    pub async fn accounts(&self) -> Vec<Account> {
        self.accounts.read().await.clone()
    }

    /// Import a private key, sealing it under `passphrase`
    pub async fn add_account(
        &self,
        private_key_hex: &str,
        passphrase: &SecretString,
    ) -> Result<Account> {
        let (normalized, signer) = signer_from_key(private_key_hex)?;
        let address = signer.address();

        let _guard = self.add_lock.lock().await;
        if self.store.find(address).await?.is_some() {
            return Err(Error::AccountExists(address));
        }

        let ciphertext = self.cipher.encrypt(&normalized, passphrase)?;
        let key = StorageKey::new(self.clock.now().trunc_subsecs(3), address);
        self.store.put(&key, &ciphertext).await?;

        let account = Account::from(key);
        self.remember(account).await;
        info!(address = %address, "Added account");
        Ok(account)
    }

    pub async fn is_unlocked(&self, address: &str) -> bool {
        let Some(address) = parse_address(address) else {
            return false;
        };
        let slot = self.slots.read().await.get(&address).cloned();
        match slot {
            Some(slot) => slot.lock().await.is_active(self.clock.now()),
            None => false,
        }
    }

    /// Unlock an account for `duration`
    ///
    /// Returns `Ok(false)` when no record exists for the address. A wrong
    /// passphrase or a corrupted record is an [`Error::Decryption`].
    pub async fn unlock(
        &self,
        address: &str,
        passphrase: &SecretString,
        duration: Duration,
    ) -> Result<bool> {
        let Some(address) = parse_address(address) else {
            return Ok(false);
        };
        let Some(record) = self.store.find(address).await? else {
            debug!(address = %address, "Unlock requested for unknown account");
            return Ok(false);
        };
        let duration = chrono::Duration::from_std(duration)
            .map_err(|_| Error::InvalidArgument("unlock duration out of range".to_string()))?;

        let slot = self.slot(address).await;
        let mut slot = slot.lock().await;

        let (_, signer) = self.open_record(&record, passphrase)?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(duration)
            .ok_or_else(|| Error::InvalidArgument("unlock duration out of range".to_string()))?;
        slot.grant(signer, expires_at);
        drop(slot);

        self.remember(record.key.into()).await;
        info!(address = %address, expires_at = %expires_at, "Account unlocked");
        Ok(true)
    }

    /// Revoke an unlock immediately
    pub async fn lock(&self, address: &str) {
        let Some(address) = parse_address(address) else {
            return;
        };
        let slot = self.slots.read().await.get(&address).cloned();
        if let Some(slot) = slot {
            slot.lock().await.revoke();
            info!(address = %address, "Account locked");
        }
    }

    /// Re-seal an account under a new passphrase
    ///
    /// Returns `Ok(false)` for unknown addresses. Does not require the
    /// account to be unlocked.
    pub async fn update_passphrase(
        &self,
        address: &str,
        old_passphrase: &SecretString,
        new_passphrase: &SecretString,
    ) -> Result<bool> {
        let Some(address) = parse_address(address) else {
            return Ok(false);
        };
        let Some(record) = self.store.find(address).await? else {
            return Ok(false);
        };

        let (normalized, _) = self.open_record(&record, old_passphrase)?;
        let ciphertext = self.cipher.encrypt(&normalized, new_passphrase)?;
        self.store.overwrite(&record, &ciphertext).await?;

        info!(address = %address, "Passphrase updated");
        Ok(true)
    }

    /// Capability for signing with `address`, or `None` if unknown
    pub async fn get_signing_account(
        self: &Arc<Self>,
        address: &str,
    ) -> Result<Option<GatedSigningAccount>> {
        let Some(address) = parse_address(address) else {
            return Ok(None);
        };
        let Some(record) = self.store.find(address).await? else {
            return Ok(None);
        };
        Ok(Some(GatedSigningAccount::new(
            Arc::clone(self),
            record.key.into(),
        )))
    }

    /// Delete every account record and drop all unlock state
    ///
    /// Only keys matching the account record layout are deleted; unrelated
    /// entries in the shared storage are left alone.
    pub async fn clear_all(&self) -> Result<usize> {
        let deleted = self.store.delete_records().await?;

        for slot in self.slots.write().await.drain().map(|(_, slot)| slot) {
            slot.lock().await.revoke();
        }
        self.accounts.write().await.clear();

        warn!(deleted, "Cleared all accounts");
        Ok(deleted)
    }

    /// Drop signers whose unlock has expired
    ///
    /// Expiry is already enforced on every read; this only releases key
    /// material early. Slots busy with a signing call are skipped.
    pub async fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        for slot in self.slots.read().await.values() {
            if let Ok(mut slot) = slot.try_lock() {
                if slot.signer.is_some() && !slot.is_active(now) {
                    slot.revoke();
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            debug!(evicted, "Evicted expired signers");
        }
        evicted
    }

    pub(crate) async fn lock_slot(&self, address: Address) -> OwnedMutexGuard<UnlockSlot> {
        self.slot(address).await.lock_owned().await
    }

    async fn slot(&self, address: Address) -> Arc<Mutex<UnlockSlot>> {
        if let Some(slot) = self.slots.read().await.get(&address) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().await.entry(address).or_default())
    }

    async fn remember(&self, account: Account) {
        let mut accounts = self.accounts.write().await;
        if !accounts.iter().any(|a| a.address == account.address) {
            accounts.push(account);
            accounts.sort_by_key(|a| a.created_at);
        }
    }

    /// Decrypt a record and rebuild its signer
    fn open_record(
        &self,
        record: &KeyRecord,
        passphrase: &SecretString,
    ) -> Result<(SecretString, PrivateKeySigner)> {
        let decrypted = self.cipher.decrypt(&record.ciphertext, passphrase)?;
        let (normalized, signer) = signer_from_key(decrypted.expose_secret())
            .map_err(|e| Error::Decryption(format!("decrypted key is malformed: {}", e)))?;

        if signer.address() != record.key.address {
            return Err(Error::Decryption(format!(
                "record {} holds a key for a different address",
                record.key
            )));
        }
        Ok((normalized, signer))
    }
}

impl std::fmt::Debug for CredentialRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRegistry")
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}
