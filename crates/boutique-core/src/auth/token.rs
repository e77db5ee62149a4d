//! Sealed session tokens.
//!
//! A token is `base64url(nonce || ChaCha20-Poly1305(claims_json))`. Only a
//! holder of the sealing key can mint one, and any modification fails to
//! open, so a value copied into a cookie or store by hand authenticates
//! nothing unless it was issued by this key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the sealing key in bytes.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed session token: {0}")]
    Malformed(String),

    #[error("Session token failed authentication")]
    Tampered,

    #[error("Failed to seal session token")]
    Seal,

    #[error("Invalid session claims: {0}")]
    Claims(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn new(subject: impl Into<String>, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            subject: subject.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct SessionSealer {
    cipher: ChaCha20Poly1305,
}

impl SessionSealer {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Fresh random key material.
    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    pub fn seal(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let plaintext = serde_json::to_vec(claims)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| TokenError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Verify and decode a token. Expiry is not checked here.
    pub fn open(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(TokenError::Malformed(format!(
                "expected more than {} bytes, got {}",
                NONCE_LEN,
                raw.len()
            )));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::Tampered)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Issue a new token for `subject` valid for `ttl`.
    pub fn issue(
        &self,
        subject: &str,
        ttl: Duration,
    ) -> Result<(String, SessionClaims), TokenError> {
        let claims = SessionClaims::new(subject, ttl);
        let token = self.seal(&claims)?;
        Ok((token, claims))
    }
}
