//! Self-custodial credential vault
//!
//! Keeps Ethereum private keys encrypted at rest and signs with them only
//! inside a time-boxed unlock window:
//! - Encrypted key store over pluggable secure storage
//! - Credential registry with per-address unlock state
//! - Gated signing accounts for messages, typed data and transactions
//! - Transaction sequencer for ordered batches with consecutive nonces
//!
//! # Security Model
//!
//! - Keys are sealed with Argon2id + AES-256-GCM under a user passphrase
//! - Unlock state lives only in memory and expires on its own
//! - Every signing call re-checks the unlock under the address's mutex
//! - Key material and passphrases are never logged or serialized

pub mod config;
pub mod crypto;
pub mod registry;
pub mod sequencer;
pub mod storage;
pub mod transport;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, RpcConfig, PASSPHRASE_ENV};
pub use error::{Error, Result};
pub use registry::{Account, CredentialRegistry};
pub use sequencer::TransactionSequencer;
pub use transport::{Transport, TransportKind, TransportRegistry};
pub use wallet::GatedSigningAccount;
