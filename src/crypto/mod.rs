//! Key material handling
//!
//! Passphrase encryption of private keys and normalization of key strings.
//! Nothing in here persists or logs plaintext.

mod cipher;
mod keys;

pub use cipher::{KdfParams, PassphraseCipher};
pub use keys::{normalize_private_key, signer_from_key};

#[cfg(test)]
pub(crate) use cipher::test_params;
