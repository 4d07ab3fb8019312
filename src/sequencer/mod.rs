//! Transaction sequencer
//!
//! Signs and broadcasts an ordered batch with consecutive nonces taken from
//! a single pending-nonce read. There is no rollback: when transaction `i`
//! fails, transactions `0..i` have already been broadcast and stay sent.

mod auth;
mod ledger;

pub use auth::{AuthOutcome, Authenticator, PassphraseAuthenticator};
pub use ledger::{JsonlLedger, StandbyRecord, TransactionLedger};

use crate::transport::{TransportKind, TransportRegistry};
use crate::wallet::GatedSigningAccount;
use crate::{Error, Result};
use alloy::primitives::B256;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds the ledger record for a broadcast transaction, given its hash
pub type StandbyRecordFactory<R> = Box<dyn FnOnce(B256) -> Option<R> + Send>;

/// Receives every successfully broadcast hash
#[async_trait]
pub trait ReferralReporter: Send + Sync {
    async fn report(&self, chain_id: u64, hash: B256) -> Result<()>;
}

pub struct TransactionSequencer<L: TransactionLedger> {
    transports: TransportRegistry,
    kind: TransportKind,
    authenticator: Arc<dyn Authenticator>,
    ledger: Arc<L>,
    referral: Option<Arc<dyn ReferralReporter>>,
}

impl<L: TransactionLedger> TransactionSequencer<L> {
    pub fn new(
        transports: TransportRegistry,
        kind: TransportKind,
        authenticator: Arc<dyn Authenticator>,
        ledger: Arc<L>,
    ) -> Self {
        Self {
            transports,
            kind,
            authenticator,
            ledger,
            referral: None,
        }
    }

    pub fn with_referral(mut self, reporter: Arc<dyn ReferralReporter>) -> Self {
        self.referral = Some(reporter);
        self
    }

    /// Sign and broadcast `prepared` in order on `chain_id`
    ///
    /// `prepared[i]` gets nonce `base + i` where `base` is the pending
    /// nonce read once before the first signature; any nonce already set
    /// on a request is replaced. Requests must carry gas and fee fields.
    /// `factories[i]` is called with the hash of `prepared[i]` and a
    /// returned record is appended to the ledger.
    ///
    /// Returns the hashes in submission order.
    pub async fn send(
        &self,
        prepared: Vec<TransactionRequest>,
        chain_id: u64,
        account: &GatedSigningAccount,
        factories: Vec<StandbyRecordFactory<L::Record>>,
    ) -> Result<Vec<B256>> {
        if prepared.len() != factories.len() {
            return Err(Error::BatchMismatch {
                transactions: prepared.len(),
                factories: factories.len(),
            });
        }

        let transport = self.transports.resolve(chain_id, self.kind)?;

        match self.authenticator.ensure_authenticated(account).await? {
            AuthOutcome::Authenticated => {}
            AuthOutcome::Cancelled => {
                info!(address = %account.address(), "Batch cancelled by user");
                return Err(Error::UserCancelled);
            }
        }

        let base_nonce = transport.pending_nonce(account.address()).await?;
        debug!(
            address = %account.address(),
            chain_id,
            base_nonce,
            count = prepared.len(),
            "Sequencing batch"
        );

        let mut hashes = Vec::with_capacity(prepared.len());
        for (offset, (mut request, factory)) in prepared.into_iter().zip(factories).enumerate() {
            let nonce = base_nonce
                .checked_add(offset as u64)
                .ok_or_else(|| Error::InvalidArgument("nonce overflow".to_string()))?;
            request.nonce = Some(nonce);
            if request.chain_id.is_none() {
                request.chain_id = Some(transport.chain_id());
            }

            let signed = account.sign_transaction(request).await?;
            let hash = transport.send_raw_transaction(signed.raw).await?;
            info!(chain_id, nonce, hash = %hash, "Transaction broadcast");

            if let Some(record) = factory(hash) {
                self.ledger.append(record).await?;
            }
            if let Some(referral) = &self.referral {
                referral.report(chain_id, hash).await?;
            }
            hashes.push(hash);
        }

        Ok(hashes)
    }
}
