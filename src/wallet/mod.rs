//! Gated signing
//!
//! This module performs every operation that uses a private key.
//! Key material is only reachable through an unlocked registry slot.

mod signer;

pub use signer::{GatedSigningAccount, SignedTransaction};

#[cfg(test)]
pub(crate) use signer::tests::{transfer_request, RecordingTransport};
