//! Sealed step values (passwords and other secrets typed during recording).
//!
//! Stored form is `base64(nonce || ciphertext)` under XChaCha20-Poly1305 with a
//! 24-byte random nonce and a 32-byte key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead as _, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const AAD: &[u8] = b"healreplay.secret.v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    #[error("secret key is not valid base64")]
    KeyEncoding,
    #[error("sealed value is not valid base64")]
    Encoding,
    #[error("sealed value is too short")]
    Truncated,
    #[error("sealed value failed authentication")]
    Authentication,
    #[error("decrypted value is not utf-8")]
    Utf8,
    #[error("seal failed: {0}")]
    Seal(String),
}

#[derive(Clone)]
pub struct SecretBox {
    cipher: XChaCha20Poly1305,
}

impl fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(key: &[u8]) -> Result<Self, SecretError> {
        if key.len() != KEY_LEN {
            return Err(SecretError::KeyLength(key.len()));
        }
        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        })
    }

    /// Builds a box from a base64 encoded key, as kept in `HEALREPLAY_SECRET_KEY`.
    pub fn from_base64_key(encoded: &str) -> Result<Self, SecretError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| SecretError::KeyEncoding)?;
        Self::new(&key)
    }

    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        STANDARD.encode(key)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, SecretError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: AAD,
                },
            )
            .map_err(|err| SecretError::Seal(err.to_string()))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, SecretError> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|_| SecretError::Encoding)?;
        if raw.len() <= NONCE_LEN {
            return Err(SecretError::Truncated);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: AAD,
                },
            )
            .map_err(|_| SecretError::Authentication)?;
        String::from_utf8(plaintext).map_err(|_| SecretError::Utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed() -> SecretBox {
        SecretBox::from_base64_key(&SecretBox::generate_key()).unwrap()
    }

    #[test]
    fn seal_then_open_returns_plaintext() {
        let secrets = boxed();
        let sealed = secrets.seal("hunter2").unwrap();
        assert_ne!(sealed, "hunter2");
        assert_eq!(secrets.open(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let secrets = boxed();
        assert_ne!(secrets.seal("same").unwrap(), secrets.seal("same").unwrap());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = boxed().seal("hunter2").unwrap();
        assert_eq!(boxed().open(&sealed), Err(SecretError::Authentication));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let secrets = boxed();
        let sealed = secrets.seal("hunter2").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        assert_eq!(secrets.open(&tampered), Err(SecretError::Authentication));
        assert_eq!(secrets.open("AAAA"), Err(SecretError::Truncated));
    }

    #[test]
    fn rejects_short_keys() {
        assert_eq!(
            SecretBox::new(&[0u8; 16]).unwrap_err(),
            SecretError::KeyLength(16)
        );
    }
}
