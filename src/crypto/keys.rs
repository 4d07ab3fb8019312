//! Private key string handling
//!
//! Keys are carried as `0x` + 64 lowercase hex characters. Older vaults
//! stored keys whose leading zero nibble had been dropped, leaving 63
//! characters; those are padded back on every read.

use crate::{Error, Result};
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;

const KEY_HEX_LEN: usize = 64;

/// Normalize a private key string to `0x` + 64 hex characters
///
/// Accepts input with or without the `0x` marker, and 63-character input
/// which is left-padded with a single `0`.
pub fn normalize_private_key(key_hex: &str) -> Result<SecretString> {
    let trimmed = key_hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidKey("key is not hex".to_string()));
    }

    let normalized = match digits.len() {
        KEY_HEX_LEN => format!("0x{}", digits.to_ascii_lowercase()),
        len if len == KEY_HEX_LEN - 1 => format!("0x0{}", digits.to_ascii_lowercase()),
        len => {
            return Err(Error::InvalidKey(format!(
                "expected 64 hex characters, got {}",
                len
            )))
        }
    };

    Ok(SecretString::from(normalized))
}

/// Build a signer from a key string, normalizing it first
///
/// Fails with [`Error::InvalidKey`] when the key is not a valid secp256k1
/// scalar (zero or above the curve order).
pub fn signer_from_key(key_hex: &str) -> Result<(SecretString, PrivateKeySigner)> {
    let normalized = normalize_private_key(key_hex)?;
    let signer = PrivateKeySigner::from_str(&normalized.expose_secret()[2..])
        .map_err(|e| Error::InvalidKey(e.to_string()))?;
    Ok((normalized, signer))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test private key (DO NOT use in production!)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_normalize_accepts_prefix_and_bare() {
        let with = normalize_private_key(TEST_KEY).unwrap();
        let without = normalize_private_key(&TEST_KEY[2..]).unwrap();

        assert_eq!(with.expose_secret(), TEST_KEY);
        assert_eq!(without.expose_secret(), TEST_KEY);
        assert_eq!(with.expose_secret().len(), 66);
    }

    #[test]
    fn test_normalize_pads_legacy_63_chars() {
        let legacy = "caa40f19ab1fd2b40da2e9c641a46e4e8ef2f7c7c65b5b5e1bb8a2a60e7fc9f";
        assert_eq!(legacy.len(), 63);

        let normalized = normalize_private_key(legacy).unwrap();
        assert_eq!(normalized.expose_secret().len(), 66);
        assert_eq!(&normalized.expose_secret()[..3], "0x0");
        assert_eq!(&normalized.expose_secret()[3..], legacy);
        assert_eq!(
            normalized.expose_secret(),
            "0x0caa40f19ab1fd2b40da2e9c641a46e4e8ef2f7c7c65b5b5e1bb8a2a60e7fc9f"
        );
    }

    #[test]
    fn test_normalize_lowercases() {
        let upper = TEST_KEY[2..].to_ascii_uppercase();
        let normalized = normalize_private_key(&upper).unwrap();
        assert_eq!(normalized.expose_secret(), TEST_KEY);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(matches!(
            normalize_private_key("0x1234"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            normalize_private_key(&format!("0x{}", "g".repeat(64))),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            normalize_private_key(&"a".repeat(65)),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_signer_from_key_derives_address() {
        let (_, signer) = signer_from_key(TEST_KEY).unwrap();
        assert_eq!(
            format!("{:?}", signer.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_signer_rejects_zero_scalar() {
        let zero = "0".repeat(64);
        assert!(matches!(signer_from_key(&zero), Err(Error::InvalidKey(_))));
    }
}
