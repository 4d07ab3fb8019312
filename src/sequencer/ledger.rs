//! Local transaction ledger
//!
//! Broadcast transactions are remembered locally as "standby" records until
//! the wallet sees them mined.

use crate::Result;
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Sink for records produced after each broadcast
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    type Record: Send + 'static;

    async fn append(&self, record: Self::Record) -> Result<()>;
}

/// A broadcast transaction awaiting confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandbyRecord {
    pub hash: B256,
    pub chain_id: u64,
    pub from: Address,
    pub created_at: DateTime<Utc>,
    /// Caller-defined description (swap, transfer, approval, ...)
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Append-only JSON lines file of [`StandbyRecord`]s
pub struct JsonlLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlLedger {
    /// # Arguments
    /// * `path` - Ledger file (JSONL format), created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, oldest first
    pub async fn records(&self) -> Result<Vec<StandbyRecord>> {
        let _guard = self.lock.lock().await;
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl TransactionLedger for JsonlLedger {
    type Record = StandbyRecord;

    async fn append(&self, record: StandbyRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(&record)?;
        writeln!(file, "{}", json)?;

        tracing::debug!(hash = %record.hash, chain_id = record.chain_id, "Standby record written");
        Ok(())
    }
}

impl std::fmt::Debug for JsonlLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlLedger").field("path", &self.path).finish()
    }
}
