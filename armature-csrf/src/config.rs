//! CSRF protection configuration.

use crate::error::{CsrfError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::fmt;
use tracing::debug;

/// Required secret length in bytes (AES-256 key).
pub const SECRET_LEN: usize = 32;

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL: i64 = 3600;

/// Longest accepted token lifetime in seconds (one year).
pub const MAX_TOKEN_TTL: i64 = 365 * 24 * 60 * 60;

/// Environment variable holding the base64-encoded secret.
pub const ENV_SECRET: &str = "ARMATURE_CSRF_SECRET";

/// Environment variable holding the token lifetime in seconds.
pub const ENV_TOKEN_TTL: &str = "ARMATURE_CSRF_TOKEN_TTL";

/// Environment variable overriding the token header name.
pub const ENV_HEADER: &str = "ARMATURE_CSRF_HEADER";

/// How a verified token is marked as consumed in the replay guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeMode {
    /// Single `add_if_absent` call; one winner under concurrency.
    #[default]
    Atomic,
    /// Separate `check` then `add` calls. Two concurrent checks of the same
    /// token may both succeed.
    CheckThenAdd,
}

/// CSRF protection configuration
#[derive(Clone)]
pub struct CsrfConfig {
    /// Symmetric key used to seal tokens (exactly 32 bytes)
    pub secret: Vec<u8>,

    /// Token time-to-live in seconds
    pub token_ttl: i64,

    /// How consumed tokens are recorded
    pub consume_mode: ConsumeMode,

    /// Header name for CSRF token
    pub header_name: String,

    /// Form or JSON field name for CSRF token
    pub field_name: String,

    /// Safe HTTP methods (not checked for CSRF)
    pub safe_methods: Vec<String>,

    /// Paths to exclude from CSRF protection
    pub exclude_paths: Vec<String>,
}

impl CsrfConfig {
    /// Create a new CSRF configuration
    pub fn new(secret: Vec<u8>) -> Result<Self> {
        if secret.len() != SECRET_LEN {
            return Err(CsrfError::config(format!(
                "Secret key must be exactly {} bytes, got {}",
                SECRET_LEN,
                secret.len()
            )));
        }

        Ok(Self {
            secret,
            token_ttl: DEFAULT_TOKEN_TTL,
            consume_mode: ConsumeMode::Atomic,
            header_name: "X-CSRF-Token".to_string(),
            field_name: "csrf_token".to_string(),
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
            ],
            exclude_paths: Vec::new(),
        })
    }

    /// Load configuration from `ARMATURE_CSRF_*` environment variables.
    ///
    /// `ARMATURE_CSRF_SECRET` is required and must be the standard base64
    /// encoding of a 32-byte key.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encoded = lookup(ENV_SECRET)
            .ok_or_else(|| CsrfError::config(format!("{} is not set", ENV_SECRET)))?;
        let secret = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CsrfError::config(format!("{} is not valid base64: {}", ENV_SECRET, e)))?;

        let mut config = Self::new(secret)?;

        if let Some(ttl) = lookup(ENV_TOKEN_TTL) {
            let ttl: i64 = ttl.trim().parse().map_err(|_| {
                CsrfError::config(format!("{} must be an integer, got {:?}", ENV_TOKEN_TTL, ttl))
            })?;
            config = config.with_token_ttl(ttl);
        }

        if let Some(header) = lookup(ENV_HEADER) {
            config = config.with_header_name(header.trim());
        }

        config.validate()?;
        debug!(
            token_ttl = config.token_ttl,
            header = %config.header_name,
            "Loaded CSRF configuration from environment"
        );
        Ok(config)
    }

    /// Generate a secret key
    pub fn generate_secret() -> Vec<u8> {
        use rand::RngCore;
        let mut secret = vec![0u8; SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        secret
    }

    /// Check invariants that the builder setters cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.secret.len() != SECRET_LEN {
            return Err(CsrfError::config("Secret key must be exactly 32 bytes"));
        }
        if self.token_ttl <= 0 {
            return Err(CsrfError::config("Token TTL must be positive"));
        }
        if self.token_ttl > MAX_TOKEN_TTL {
            return Err(CsrfError::config(format!(
                "Token TTL must be at most {} seconds",
                MAX_TOKEN_TTL
            )));
        }
        if self.header_name.is_empty() {
            return Err(CsrfError::config("Header name must not be empty"));
        }
        Ok(())
    }

    /// Set token TTL
    pub fn with_token_ttl(mut self, ttl_seconds: i64) -> Self {
        self.token_ttl = ttl_seconds;
        self
    }

    /// Set consume mode
    pub fn with_consume_mode(mut self, mode: ConsumeMode) -> Self {
        self.consume_mode = mode;
        self
    }

    /// Set header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set field name
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Replace safe methods
    pub fn with_safe_methods(mut self, methods: Vec<String>) -> Self {
        self.safe_methods = methods;
        self
    }

    /// Replace excluded paths
    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.exclude_paths = paths;
        self
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            secret: Self::generate_secret(),
            token_ttl: DEFAULT_TOKEN_TTL,
            consume_mode: ConsumeMode::Atomic,
            header_name: "X-CSRF-Token".to_string(),
            field_name: "csrf_token".to_string(),
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
            ],
            exclude_paths: Vec::new(),
        }
    }
}

impl fmt::Debug for CsrfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("consume_mode", &self.consume_mode)
            .field("header_name", &self.header_name)
            .field("field_name", &self.field_name)
            .field("safe_methods", &self.safe_methods)
            .field("exclude_paths", &self.exclude_paths)
            .finish()
    }
}
