//! Error types for the credential vault

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("account already exists: {0}")]
    AccountExists(Address),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("authentication needed: password or unlock ({0})")]
    AuthenticationRequired(Address),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("batch mismatch: {transactions} transactions but {factories} standby record factories")]
    BatchMismatch { transactions: usize, factories: usize },

    #[error("user cancelled authentication")]
    UserCancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
