//! Gated signing account
//!
//! SECURITY: signing goes through the registry's unlock slot for the
//! account's address on every call.
//! - The signer only exists in memory, inside the slot, between an unlock
//!   and its expiry
//! - No operation touches a transport or key material while locked
//! - Keys are never serialized or logged

use crate::registry::{Account, CredentialRegistry};
use crate::transport::Transport;
use crate::{Error, Result};
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::{Signature, SignerSync};
use alloy::sol_types::SolCall;
use std::sync::Arc;

/// A signed, EIP-2718 encoded transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: B256,
    pub nonce: u64,
    pub raw: Bytes,
}

/// Signing capability for one account, bound to the registry that
/// tracks its unlock state
#[derive(Clone)]
pub struct GatedSigningAccount {
    registry: Arc<CredentialRegistry>,
    account: Account,
}

impl GatedSigningAccount {
    pub(crate) fn new(registry: Arc<CredentialRegistry>, account: Account) -> Self {
        Self { registry, account }
    }

    pub fn address(&self) -> Address {
        self.account.address
    }

    /// Get the address as a checksummed string
    pub fn address_string(&self) -> String {
        self.account.address.to_checksum(None)
    }

    pub fn account(&self) -> Account {
        self.account
    }

    pub fn registry(&self) -> &Arc<CredentialRegistry> {
        &self.registry
    }

    pub async fn is_unlocked(&self) -> bool {
        let slot = self.registry.lock_slot(self.account.address).await;
        slot.active_signer(self.registry.now()).is_some()
    }

    async fn ensure_unlocked(&self) -> Result<()> {
        if self.is_unlocked().await {
            Ok(())
        } else {
            Err(Error::AuthenticationRequired(self.account.address))
        }
    }

    /// Sign an EIP-191 personal message
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        let slot = self.registry.lock_slot(self.account.address).await;
        let signer = slot
            .active_signer(self.registry.now())
            .ok_or(Error::AuthenticationRequired(self.account.address))?;

        signer
            .sign_message_sync(message)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    /// Sign EIP-712 typed data
    pub async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        let slot = self.registry.lock_slot(self.account.address).await;
        let signer = slot
            .active_signer(self.registry.now())
            .ok_or(Error::AuthenticationRequired(self.account.address))?;

        let hash = typed_data
            .eip712_signing_hash()
            .map_err(|e| Error::InvalidArgument(format!("Invalid typed data: {}", e)))?;
        signer
            .sign_hash_sync(&hash)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    /// Sign a fee-complete transaction request
    ///
    /// `from` is filled with this account's address; the request must
    /// already carry its nonce, chain ID, gas limit and fee fields.
    pub async fn sign_transaction(&self, request: TransactionRequest) -> Result<SignedTransaction> {
        let request = self.bind_sender(request)?;

        let slot = self.registry.lock_slot(self.account.address).await;
        let signer = slot
            .active_signer(self.registry.now())
            .ok_or(Error::AuthenticationRequired(self.account.address))?;

        let wallet = EthereumWallet::from(signer.clone());
        let envelope: TxEnvelope =
            <TransactionRequest as TransactionBuilder<Ethereum>>::build(request, &wallet)
                .await
                .map_err(|e| Error::Signing(e.to_string()))?;
        drop(slot);

        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            nonce: envelope.nonce(),
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }

    /// Sign and broadcast a transaction request
    ///
    /// Missing nonce and chain ID are taken from the transport.
    pub async fn send_transaction(
        &self,
        transport: &dyn Transport,
        mut request: TransactionRequest,
    ) -> Result<B256> {
        self.ensure_unlocked().await?;

        if request.chain_id.is_none() {
            request.chain_id = Some(transport.chain_id());
        }
        if request.nonce.is_none() {
            request.nonce = Some(transport.pending_nonce(self.account.address).await?);
        }

        let signed = self.sign_transaction(request).await?;
        let hash = transport.send_raw_transaction(signed.raw).await?;
        if hash != signed.hash {
            tracing::warn!(
                local = %signed.hash,
                remote = %hash,
                "Transport reported a different transaction hash"
            );
        }

        tracing::info!(
            address = %self.account.address,
            chain_id = transport.chain_id(),
            nonce = signed.nonce,
            hash = %hash,
            "Transaction broadcast"
        );
        Ok(hash)
    }

    /// ABI-encode `call` as the input of `request`, then sign and broadcast
    pub async fn write_contract<C: SolCall>(
        &self,
        transport: &dyn Transport,
        contract: Address,
        call: &C,
        request: TransactionRequest,
    ) -> Result<B256> {
        let request = request
            .to(contract)
            .input(Bytes::from(call.abi_encode()).into());
        self.send_transaction(transport, request).await
    }

    fn bind_sender(&self, mut request: TransactionRequest) -> Result<TransactionRequest> {
        match request.from {
            Some(from) if from != self.account.address => Err(Error::InvalidArgument(format!(
                "Request is from {} but account is {}",
                from, self.account.address
            ))),
            _ => {
                request.from = Some(self.account.address);
                Ok(request)
            }
        }
    }
}

// Implement Debug manually to avoid exposing the registry internals
impl std::fmt::Debug for GatedSigningAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedSigningAccount")
            .field("address", &self.account.address)
            .field("created_at", &self.account.created_at)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::consensus::transaction::SignerRecoverable;
    use crate::registry::tests::{secret, test_registry, TEST_ADDRESS, TEST_KEY};
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::{address, U256};
    use alloy::sol;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    sol! {
        function transfer(address to, uint256 amount) returns (bool);
    }

    /// Transport that records broadcasts instead of sending them
    pub(crate) struct RecordingTransport {
        pub chain_id: u64,
        pub nonce: u64,
        pub sent: Mutex<Vec<Bytes>>,
        pub nonce_queries: Mutex<u32>,
        /// Fail the broadcast with this index (0-based)
        pub fail_at: Option<usize>,
    }

    impl RecordingTransport {
        pub(crate) fn new(chain_id: u64, nonce: u64) -> Self {
            Self {
                chain_id,
                nonce,
                sent: Mutex::new(Vec::new()),
                nonce_queries: Mutex::new(0),
                fail_at: None,
            }
        }

        pub(crate) fn sent_envelopes(&self) -> Vec<TxEnvelope> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|raw| TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap())
                .collect()
        }

        pub(crate) fn touched(&self) -> bool {
            *self.nonce_queries.lock().unwrap() > 0 || !self.sent.lock().unwrap().is_empty()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn chain_id(&self) -> u64 {
            self.chain_id
        }

        async fn pending_nonce(&self, _address: Address) -> Result<u64> {
            *self.nonce_queries.lock().unwrap() += 1;
            Ok(self.nonce)
        }

        async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_at == Some(sent.len()) {
                return Err(Error::Network("nonce too low".to_string()));
            }
            let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
                .map_err(|e| Error::Network(e.to_string()))?;
            sent.push(raw);
            Ok(*envelope.tx_hash())
        }
    }

    pub(crate) fn transfer_request(value: u64) -> TransactionRequest {
        TransactionRequest::default()
            .to(address!("0x70997970c51812dc3a010c7d01b50e0d17dc79c8"))
            .value(U256::from(value))
            .gas_limit(21_000)
            .max_fee_per_gas(30_000_000_000)
            .max_priority_fee_per_gas(1_000_000_000)
    }

    async fn unlocked_account() -> (GatedSigningAccount, crate::registry::ManualClock) {
        let (registry, _, clock) = test_registry();
        registry.add_account(TEST_KEY, &secret("password")).await.unwrap();
        registry
            .unlock(TEST_ADDRESS, &secret("password"), Duration::from_secs(100))
            .await
            .unwrap();
        let account = registry.get_signing_account(TEST_ADDRESS).await.unwrap().unwrap();
        (account, clock)
    }

    #[tokio::test]
    async fn test_sign_message_recovers_address() {
        let (account, _) = unlocked_account().await;

        let signature = account.sign_message(b"hello vault").await.unwrap();
        let recovered = signature.recover_address_from_msg(b"hello vault").unwrap();

        assert_eq!(recovered, account.address());
    }

    #[tokio::test]
    async fn test_sign_message_after_expiry_requires_auth() {
        let (account, clock) = unlocked_account().await;
        clock.advance(chrono::Duration::seconds(101));

        assert!(!account.registry().is_unlocked(TEST_ADDRESS).await);
        let err = account.sign_message(b"late").await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationRequired(_)));
        assert!(err.to_string().contains("authentication needed: password or unlock"));
    }

    #[tokio::test]
    async fn test_signing_waits_for_held_slot() {
        let (account, clock) = unlocked_account().await;
        let guard = account.registry().lock_slot(account.address()).await;

        let mut task = {
            let account = account.clone();
            tokio::spawn(async move { account.sign_message(b"queued").await })
        };
        assert!(tokio::time::timeout(Duration::from_millis(100), &mut task)
            .await
            .is_err());

        // Expiry is judged once the slot is acquired, not when the call started
        clock.advance(chrono::Duration::seconds(101));
        drop(guard);
        assert!(matches!(
            task.await.unwrap(),
            Err(Error::AuthenticationRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_locked_account_never_touches_transport() {
        let (registry, _, _) = test_registry();
        registry.add_account(TEST_KEY, &secret("pw")).await.unwrap();
        let account = registry.get_signing_account(TEST_ADDRESS).await.unwrap().unwrap();
        let transport = RecordingTransport::new(1, 0);

        let err = account
            .send_transaction(&transport, transfer_request(1))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthenticationRequired(_)));
        assert!(!transport.touched());
        assert!(matches!(
            account.sign_transaction(transfer_request(1).nonce(0)).await,
            Err(Error::AuthenticationRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_transaction_sets_sender_and_nonce() {
        let (account, _) = unlocked_account().await;

        let signed = account
            .sign_transaction(transfer_request(5).nonce(7).with_chain_id(1))
            .await
            .unwrap();

        let envelope = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
        assert_eq!(signed.nonce, 7);
        assert_eq!(envelope.nonce(), 7);
        assert_eq!(*envelope.tx_hash(), signed.hash);
        assert_eq!(envelope.recover_signer().unwrap(), account.address());
    }

    #[tokio::test]
    async fn test_sign_transaction_rejects_foreign_sender() {
        let (account, _) = unlocked_account().await;
        let request = transfer_request(1)
            .nonce(0)
            .with_chain_id(1)
            .from(Address::ZERO);

        assert!(matches!(
            account.sign_transaction(request).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_send_transaction_fills_nonce_and_chain() {
        let (account, _) = unlocked_account().await;
        let transport = RecordingTransport::new(8453, 42);

        let hash = account
            .send_transaction(&transport, transfer_request(9))
            .await
            .unwrap();

        let sent = transport.sent_envelopes();
        assert_eq!(sent.len(), 1);
        assert_eq!(*sent[0].tx_hash(), hash);
        assert_eq!(sent[0].nonce(), 42);
        assert_eq!(sent[0].chain_id(), Some(8453));
    }

    #[tokio::test]
    async fn test_write_contract_encodes_call() {
        let (account, _) = unlocked_account().await;
        let transport = RecordingTransport::new(1, 0);
        let token = address!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        let call = transferCall {
            to: address!("0x70997970c51812dc3a010c7d01b50e0d17dc79c8"),
            amount: U256::from(1_000_000u64),
        };

        account
            .write_contract(
                &transport,
                token,
                &call,
                TransactionRequest::default()
                    .gas_limit(60_000)
                    .max_fee_per_gas(30_000_000_000)
                    .max_priority_fee_per_gas(1_000_000_000),
            )
            .await
            .unwrap();

        let sent = transport.sent_envelopes();
        assert_eq!(sent[0].to(), Some(token));
        assert_eq!(sent[0].input().as_ref(), call.abi_encode().as_slice());
    }

    #[tokio::test]
    async fn test_sign_typed_data() {
        let (account, _) = unlocked_account().await;
        let typed: TypedData = serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "chainId", "type": "uint256" }
                ],
                "Mail": [
                    { "name": "contents", "type": "string" }
                ]
            },
            "primaryType": "Mail",
            "domain": { "name": "Vault", "chainId": 1 },
            "message": { "contents": "hello" }
        }))
        .unwrap();

        let signature = account.sign_typed_data(&typed).await.unwrap();
        let hash = typed.eip712_signing_hash().unwrap();
        assert_eq!(
            signature.recover_address_from_prehash(&hash).unwrap(),
            account.address()
        );
    }

    #[tokio::test]
    async fn test_debug_redacts_key() {
        let (account, _) = unlocked_account().await;

        let debug_str = format!("{:?}", account);

        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("address"));
    }
}
