//! Passphrase encryption for key records
//!
//! Argon2id stretches the passphrase into an AES-256-GCM key. The KDF
//! parameters, salt and nonce are written alongside the ciphertext so a
//! record can always be opened with the parameters it was sealed under:
//!
//! ```text
//! a2gcm1$<m_cost>,<t_cost>,<p_cost>$<salt hex>$<nonce hex>$<ciphertext hex>
//! ```

use crate::{Error, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use alloy::hex;
use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const SCHEME: &str = "a2gcm1";
/// Base64 of `Salted__`, the header of OpenSSL/CryptoJS passphrase output
const OPENSSL_SALTED_PREFIX: &str = "U2FsdGVkX1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Argon2id parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Time cost (iterations)
    pub t_cost: u32,
    /// Parallelism
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456, // 19 MiB
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    fn derive(&self, passphrase: &SecretString, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| Error::Config(format!("Invalid Argon2 parameters: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key[..])
            .map_err(|e| Error::Encryption(format!("Argon2id derivation failed: {}", e)))?;
        Ok(key)
    }
}

/// Symmetric passphrase cipher for private key strings
#[derive(Debug, Clone, Copy, Default)]
pub struct PassphraseCipher {
    params: KdfParams,
}

impl PassphraseCipher {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Seal `plaintext` under `passphrase`
    pub fn encrypt(&self, plaintext: &SecretString, passphrase: &SecretString) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = self.params.derive(passphrase, &salt)?;

        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.expose_secret().as_bytes())
            .map_err(|_| Error::Encryption("AES-GCM seal failed".to_string()))?;

        Ok(format!(
            "{}${},{},{}${}${}${}",
            SCHEME,
            self.params.m_cost,
            self.params.t_cost,
            self.params.p_cost,
            hex::encode(salt),
            hex::encode(nonce),
            hex::encode(ciphertext)
        ))
    }

    /// Open a sealed string. Wrong passphrases and malformed input both
    /// surface as [`Error::Decryption`].
    pub fn decrypt(&self, sealed: &str, passphrase: &SecretString) -> Result<SecretString> {
        let envelope = Envelope::parse(sealed)?;
        let key = envelope
            .params
            .derive(passphrase, &envelope.salt)
            .map_err(|e| Error::Decryption(e.to_string()))?;

        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Decryption(e.to_string()))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref())
                .map_err(|_| Error::Decryption("wrong passphrase or corrupted record".to_string()))?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::Decryption("plaintext is not UTF-8".to_string()))?;
        Ok(SecretString::from(text.to_string()))
    }
}

struct Envelope {
    params: KdfParams,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    fn parse(sealed: &str) -> Result<Self> {
        let malformed = |what: &str| Error::Decryption(format!("malformed ciphertext: {}", what));

        if sealed.starts_with(OPENSSL_SALTED_PREFIX) {
            return Err(Error::Decryption(
                "record uses the retired OpenSSL salted format, re-import the key".to_string(),
            ));
        }

        let mut parts = sealed.split('$');
        if parts.next() != Some(SCHEME) {
            return Err(malformed("unknown scheme"));
        }

        let params = parts.next().ok_or_else(|| malformed("missing parameters"))?;
        let costs: Vec<u32> = params
            .split(',')
            .map(|c| c.parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| malformed("bad parameters"))?;
        let &[m_cost, t_cost, p_cost] = costs.as_slice() else {
            return Err(malformed("bad parameters"));
        };

        let mut field = |name: &str| -> Result<Vec<u8>> {
            let value = parts.next().ok_or_else(|| malformed(name))?;
            hex::decode(value).map_err(|_| malformed(name))
        };
        let salt = field("salt")?;
        let nonce = field("nonce")?;
        let ciphertext = field("ciphertext")?;

        if parts.next().is_some() {
            return Err(malformed("trailing data"));
        }
        if nonce.len() != NONCE_LEN {
            return Err(malformed("nonce length"));
        }

        Ok(Self {
            params: KdfParams {
                m_cost,
                t_cost,
                p_cost,
            },
            salt,
            nonce,
            ciphertext,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = PassphraseCipher::new(test_params());
        let sealed = cipher.encrypt(&secret("0xdeadbeef"), &secret("password")).unwrap();

        assert!(sealed.starts_with("a2gcm1$256,1,1$"));
        assert!(!sealed.contains("deadbeef"));

        let opened = cipher.decrypt(&sealed, &secret("password")).unwrap();
        assert_eq!(opened.expose_secret(), "0xdeadbeef");
    }

    #[test]
    fn test_wrong_passphrase_is_decryption_error() {
        let cipher = PassphraseCipher::new(test_params());
        let sealed = cipher.encrypt(&secret("0xdeadbeef"), &secret("password")).unwrap();

        let err = cipher.decrypt(&sealed, &secret("letmein")).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[test]
    fn test_record_params_win_over_cipher_params() {
        let sealed = PassphraseCipher::new(test_params())
            .encrypt(&secret("payload"), &secret("pw"))
            .unwrap();

        // A cipher tuned differently still opens older records.
        let retuned = PassphraseCipher::new(KdfParams {
            m_cost: 512,
            t_cost: 2,
            p_cost: 1,
        });
        let opened = retuned.decrypt(&sealed, &secret("pw")).unwrap();
        assert_eq!(opened.expose_secret(), "payload");
    }

    #[test]
    fn test_malformed_input_is_decryption_error() {
        let cipher = PassphraseCipher::new(test_params());
        for input in [
            "",
            "a2gcm1$256,1$00$00$00",
            "a2gcm1$256,1,1$zz$000000000000000000000000$00",
            "a2gcm1$256,1,1$00112233445566778899aabbccddeeff$0011$00",
        ] {
            let err = cipher.decrypt(input, &secret("pw")).unwrap_err();
            assert!(matches!(err, Error::Decryption(_)), "input {:?}", input);
        }
    }

    #[test]
    fn test_openssl_salted_record_is_reported_as_retired() {
        let cipher = PassphraseCipher::new(test_params());
        let err = cipher
            .decrypt("U2FsdGVkX1+vupppZksvRf5pq5g5XjFRIipRkwB0K1Y=", &secret("pw"))
            .unwrap_err();

        assert!(matches!(err, Error::Decryption(_)));
        assert!(err.to_string().contains("retired OpenSSL salted format"));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = PassphraseCipher::new(test_params());
        let mut sealed = cipher.encrypt(&secret("payload"), &secret("pw")).unwrap();
        let last = sealed.pop().unwrap();
        sealed.push(if last == '0' { '1' } else { '0' });

        assert!(matches!(
            cipher.decrypt(&sealed, &secret("pw")),
            Err(Error::Decryption(_))
        ));
    }
}
