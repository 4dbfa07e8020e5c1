//! Sealing of secrets kept in the settings table.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("sealed value is malformed")]
    Malformed,

    #[error("sealed value could not be opened")]
    Tampered,

    #[error("encryption failed")]
    Seal,
}

/// Authenticated encryption with a key derived from configuration.
#[derive(Clone)]
pub struct SecretBox {
    cipher: ChaCha20Poly1305,
}

impl SecretBox {
    pub fn new(key_material: &str) -> Self {
        let key = Sha256::digest(key_material.as_bytes());
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// Base64 of nonce followed by ciphertext.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let raw = STANDARD.decode(sealed).map_err(|_| CryptoError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Tampered)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let secrets = SecretBox::new("server key");
        let sealed = secrets.seal("smtp-password").unwrap();
        assert_ne!(sealed, "smtp-password");
        assert_eq!(secrets.open(&sealed).unwrap(), "smtp-password");
    }

    #[test]
    fn test_nonce_differs_per_seal() {
        let secrets = SecretBox::new("server key");
        assert_ne!(secrets.seal("x").unwrap(), secrets.seal("x").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretBox::new("one").seal("secret").unwrap();
        assert_eq!(SecretBox::new("two").open(&sealed), Err(CryptoError::Tampered));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let secrets = SecretBox::new("k");
        assert_eq!(secrets.open("!!!"), Err(CryptoError::Malformed));
        assert_eq!(secrets.open("AAAA"), Err(CryptoError::Malformed));
    }
}
