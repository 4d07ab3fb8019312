//! Pre-batch authentication

use crate::wallet::GatedSigningAccount;
use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;

/// Result of asking the user to connect and unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Cancelled,
}

/// Makes sure an account is unlocked before a batch is signed
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn ensure_authenticated(&self, account: &GatedSigningAccount) -> Result<AuthOutcome>;
}

/// Unlocks with a passphrase supplied up front
///
/// With no passphrase a locked account counts as a cancellation.
pub struct PassphraseAuthenticator {
    passphrase: Option<SecretString>,
    duration: Duration,
}

impl PassphraseAuthenticator {
    pub fn new(passphrase: Option<SecretString>, duration: Duration) -> Self {
        Self {
            passphrase,
            duration,
        }
    }
}

#[async_trait]
impl Authenticator for PassphraseAuthenticator {
    async fn ensure_authenticated(&self, account: &GatedSigningAccount) -> Result<AuthOutcome> {
        if account.is_unlocked().await {
            return Ok(AuthOutcome::Authenticated);
        }
        let Some(passphrase) = &self.passphrase else {
            tracing::info!(address = %account.address(), "No passphrase supplied, cancelling");
            return Ok(AuthOutcome::Cancelled);
        };

        let unlocked = account
            .registry()
            .unlock(&account.address_string(), passphrase, self.duration)
            .await?;
        if !unlocked {
            return Err(Error::AccountNotFound(account.address_string()));
        }
        Ok(AuthOutcome::Authenticated)
    }
}

impl std::fmt::Debug for PassphraseAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseAuthenticator")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("duration", &self.duration)
            .finish()
    }
}
