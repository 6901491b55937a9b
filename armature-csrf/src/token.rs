//! Token sealing and opening.
//!
//! Wire format: `base64(nonce (12 B) || AES-256-GCM(json(payload)))`, no
//! associated data.

use crate::config::CsrfConfig;
use crate::error::{CsrfError, Result};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Plaintext sealed inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Session the token is bound to
    pub session_id: String,

    /// Unix timestamp (seconds) at mint time
    pub issued_at: i64,
}

impl TokenPayload {
    /// Create a payload
    pub fn new(session_id: impl Into<String>, issued_at: i64) -> Self {
        Self {
            session_id: session_id.into(),
            issued_at,
        }
    }

    /// Seconds elapsed between `issued_at` and `now`.
    pub fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.issued_at)
    }

    /// Whether the payload is older than `ttl_seconds` at `now`.
    ///
    /// A token exactly `ttl_seconds` old is still valid.
    pub fn is_expired(&self, now: i64, ttl_seconds: i64) -> bool {
        self.age(now) > ttl_seconds
    }
}

/// Seals and opens [`TokenPayload`] values.
#[derive(Clone)]
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl TokenCodec {
    /// Build a codec from a raw 32-byte key.
    pub fn new(secret: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(secret)
            .map_err(|e| CsrfError::crypto(format!("Invalid key: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Build a codec from configuration.
    pub fn from_config(config: &CsrfConfig) -> Result<Self> {
        Self::new(&config.secret)
    }

    /// Mint a token for `session_id` stamped with `issued_at`.
    pub fn create(&self, session_id: &str, issued_at: i64) -> Result<String> {
        let payload = TokenPayload::new(session_id, issued_at);
        self.seal(&payload)
    }

    /// Seal an arbitrary payload.
    pub fn seal(&self, payload: &TokenPayload) -> Result<String> {
        let plaintext =
            serde_json::to_vec(payload).map_err(|e| CsrfError::Serialization(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| CsrfError::crypto(format!("Secure random unavailable: {}", e)))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| CsrfError::crypto(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decode, authenticate and deserialize a token.
    pub fn open(&self, token: &str) -> Result<TokenPayload> {
        let sealed = STANDARD.decode(token)?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CsrfError::malformed(format!(
                "Token is {} bytes, need at least {}",
                sealed.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CsrfError::Authentication)?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Fixed-size digest of a token, used as the replay guard key.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}
