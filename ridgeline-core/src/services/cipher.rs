//! Field cipher - AES-256-GCM encryption for individual entity fields
//!
//! Ciphertext is a single printable string `hex(nonce):hex(cipherbytes)`.
//! The nonce travels with the value, so a stored field is self-describing;
//! the key is process-wide from [`SecurityConfig`].
//!
//! A fresh random nonce per call makes ciphertext non-deterministic. That is
//! required for semantic security, and it means equality search over
//! encrypted columns is impossible - lookups like find-by-email must
//! decrypt-and-compare instead (see the repository adapter).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rust_decimal::Decimal;

use crate::config::SecurityConfig;
use crate::domain::result::{Error, Result};

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Separator between the nonce and cipherbytes halves of the envelope
const DELIMITER: char = ':';

/// Encrypts and decrypts designated entity fields
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(config: &SecurityConfig) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&config.encryption_key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a plaintext string into the `hex(nonce):hex(cipher)` envelope.
    /// Every call draws a fresh nonce; equal plaintexts yield distinct
    /// ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipherbytes = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::encryption(format!("encrypt failed: {}", e)))?;

        Ok(format!(
            "{}{}{}",
            hex::encode(nonce_bytes),
            DELIMITER,
            hex::encode(cipherbytes)
        ))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// A value that does not parse as an envelope is returned unchanged -
    /// data written before encryption was enabled is stored as plaintext and
    /// must keep reading back as-is. A well-formed envelope that fails
    /// authentication is an error; garbage is never returned silently.
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let (nonce_bytes, cipherbytes) = match parse_envelope(value) {
            Some(parts) => parts,
            None => return Ok(value.to_string()),
        };

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plainbytes = self
            .cipher
            .decrypt(nonce, cipherbytes.as_ref())
            .map_err(|e| Error::encryption(format!("decrypt failed: {}", e)))?;

        String::from_utf8(plainbytes)
            .map_err(|_| Error::encryption("decrypted field is not valid UTF-8"))
    }

    /// Encrypt a monetary amount via its decimal string form
    pub fn encrypt_amount(&self, amount: Decimal) -> Result<String> {
        self.encrypt(&amount.to_string())
    }

    /// Decrypt a monetary amount. A decrypted value that fails to parse as a
    /// decimal yields zero rather than an error.
    pub fn decrypt_amount(&self, value: &str) -> Result<Decimal> {
        let plaintext = self.decrypt(value)?;
        Ok(plaintext.trim().parse().unwrap_or(Decimal::ZERO))
    }
}

/// Parse `hex(nonce):hex(cipher)`; anything else is legacy plaintext
fn parse_envelope(value: &str) -> Option<([u8; NONCE_LEN], Vec<u8>)> {
    let (nonce_hex, cipher_hex) = value.split_once(DELIMITER)?;
    if nonce_hex.len() != NONCE_LEN * 2 || cipher_hex.is_empty() {
        return None;
    }
    let nonce_vec = hex::decode(nonce_hex).ok()?;
    let cipherbytes = hex::decode(cipher_hex).ok()?;

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&nonce_vec);
    Some((nonce, cipherbytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c2b7e151628aed2a6abf7158809cf4f3c";

    fn cipher() -> FieldCipher {
        let config = SecurityConfig::from_values(KEY, "jwt", "refresh", "session").unwrap();
        FieldCipher::new(&config)
    }

    #[test]
    fn test_round_trip() {
        let c = cipher();
        for s in ["", "alice@example.com", "Groceries & fuel", "émoji ✓"] {
            let ct = c.encrypt(s).unwrap();
            assert_ne!(ct, s);
            assert_eq!(c.decrypt(&ct).unwrap(), s);
        }
    }

    #[test]
    fn test_ciphertext_is_nondeterministic() {
        // Distinct nonces per call; both ciphertexts decrypt to the same
        // plaintext. This is also why equality search on encrypted fields
        // cannot work.
        let c = cipher();
        let a = c.encrypt("same input").unwrap();
        let b = c.encrypt("same input").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), "same input");
        assert_eq!(c.decrypt(&b).unwrap(), "same input");
    }

    #[test]
    fn test_plaintext_passthrough() {
        let c = cipher();
        assert_eq!(c.decrypt("just a note").unwrap(), "just a note");
        // Contains the delimiter but is not an envelope
        assert_eq!(c.decrypt("lunch: pizza").unwrap(), "lunch: pizza");
        assert_eq!(c.decrypt("12.34").unwrap(), "12.34");
    }

    #[test]
    fn test_tampered_envelope_is_an_error() {
        let c = cipher();
        let ct = c.encrypt("sensitive").unwrap();
        let (nonce, cipher_hex) = ct.split_once(':').unwrap();
        // Flip the last cipherbyte nibble
        let mut tampered: String = cipher_hex.to_string();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        let err = c.decrypt(&format!("{}:{}", nonce, tampered)).unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }

    #[test]
    fn test_amount_round_trip() {
        let c = cipher();
        for n in ["0", "12.34", "999999999.99", "0.01"] {
            let amount: Decimal = n.parse().unwrap();
            let ct = c.encrypt_amount(amount).unwrap();
            assert_eq!(c.decrypt_amount(&ct).unwrap(), amount);
        }
    }

    #[test]
    fn test_unparseable_amount_defaults_to_zero() {
        let c = cipher();
        let ct = c.encrypt("not a number").unwrap();
        assert_eq!(c.decrypt_amount(&ct).unwrap(), Decimal::ZERO);
        // Legacy plaintext amounts still parse
        assert_eq!(
            c.decrypt_amount("42.50").unwrap(),
            "42.50".parse::<Decimal>().unwrap()
        );
    }

    #[test]
    fn test_keys_are_not_interchangeable() {
        let c1 = cipher();
        let other = SecurityConfig::from_values(
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
            "jwt",
            "refresh",
            "session",
        )
        .unwrap();
        let c2 = FieldCipher::new(&other);

        let ct = c1.encrypt("secret").unwrap();
        assert!(c2.decrypt(&ct).is_err());
    }
}
