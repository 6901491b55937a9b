//! Error types for CSRF token operations.

use thiserror::Error;

/// Result type for CSRF operations.
pub type Result<T> = std::result::Result<T, CsrfError>;

/// Result type for replay guard operations.
pub type ReplayResult<T> = std::result::Result<T, ReplayError>;

/// Errors raised while minting or verifying a token.
///
/// Expired, wrongly bound and already used tokens are not errors; they are
/// reported as a negative [`Verdict`](crate::Verdict).
#[derive(Error, Debug)]
pub enum CsrfError {
    /// Token is not valid base64
    #[error("Token decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Token decoded but has an impossible shape (too short, etc.)
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// AEAD open failed: forged, tampered or sealed under another key
    #[error("Token authentication failed")]
    Authentication,

    /// Opened plaintext is not a valid payload
    #[error("Invalid token payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Cipher initialization or secure random failure
    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Replay guard backend failure
    #[error("Replay guard error: {0}")]
    Replay(#[from] ReplayError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CsrfError {
    /// Create a new malformed-token error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a new crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors caused by the token bytes themselves.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Malformed(_) | Self::Payload(_) | Self::Authentication
        )
    }

    /// True when the replay guard could not answer.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Replay(_))
    }
}

/// Replay guard errors.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The token has already been consumed
    #[error("Token already used")]
    AlreadyUsed,

    /// Generic backend failure
    #[error("Replay store error: {0}")]
    Store(String),

    /// Redis backend failure
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl ReplayError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Check if this is the "already used" condition
    pub fn is_already_used(&self) -> bool {
        matches!(self, Self::AlreadyUsed)
    }
}
