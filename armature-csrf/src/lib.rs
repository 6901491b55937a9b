//! # Armature CSRF Protection
//!
//! Cross-Site Request Forgery (CSRF) protection for Armature applications.
//!
//! ## Features
//!
//! - ✅ **Sealed Tokens** - AES-256-GCM encrypted and authenticated
//! - ✅ **Session Binding** - A token only verifies for the session it was minted for
//! - ✅ **Expiry** - Tokens older than the configured TTL are rejected
//! - ✅ **Single Use** - A pluggable replay guard accepts each token at most once
//! - ✅ **Storage Backends** - In-memory (DashMap) and Redis replay guards
//! - ✅ **Path Exclusion** - Exclude specific paths from protection
//!
//! ## Quick Start
//!
//! ```rust
//! use armature_csrf::{CsrfConfig, CsrfProtector, MemoryReplayGuard};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = CsrfConfig::new(CsrfConfig::generate_secret())
//!     .unwrap()
//!     .with_token_ttl(3600);
//! let protector = CsrfProtector::new(&config, Arc::new(MemoryReplayGuard::new())).unwrap();
//!
//! // Mint a token for the session at t = 1000
//! let token = protector.create("sess-42", 1000).unwrap();
//!
//! // First use succeeds, second use is a replay
//! assert!(protector.check_at("sess-42", &token, 1000).await.unwrap());
//! assert!(!protector.check_at("sess-42", &token, 1001).await.unwrap());
//! # });
//! ```
//!
//! ## Results
//!
//! `check` returns `Ok(true)` for an accepted token and `Ok(false)` for a
//! genuine token that is expired, bound to another session or already used.
//! Malformed or forged tokens and replay guard failures are `Err`, and callers
//! should reject the request in both cases.
//!
//! ```rust
//! use armature_csrf::{CsrfConfig, CsrfProtector, MemoryReplayGuard, Verdict};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = CsrfConfig::default();
//! let protector = CsrfProtector::new(&config, Arc::new(MemoryReplayGuard::new())).unwrap();
//!
//! let token = protector.create("sess-42", 1000).unwrap();
//! assert_eq!(
//!     protector.verify_at("sess-42", &token, 1000 + 3601).await.unwrap(),
//!     Verdict::Expired
//! );
//! assert!(protector.check_at("sess-42", "not-a-token", 1000).await.is_err());
//! # });
//! ```
//!
//! ## Usage with an HTTP layer
//!
//! ```ignore
//! use armature_csrf::{CsrfConfig, CsrfMiddleware, MemoryReplayGuard};
//! use std::sync::Arc;
//!
//! let csrf = CsrfMiddleware::new(CsrfConfig::from_env()?, Arc::new(MemoryReplayGuard::new()))?;
//!
//! // Rendering a form
//! let issued = csrf.issue(&session_id)?;
//!
//! // Handling a mutating request
//! let check = csrf
//!     .validate_request(&session_id, &method, &path, &headers, &body)
//!     .await;
//! if !check.is_allowed() {
//!     return Err(Error::Forbidden(format!("CSRF: {}", check)));
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod protector;
pub mod replay;
pub mod token;

pub use config::{ConsumeMode, CsrfConfig};
pub use error::{CsrfError, ReplayError, ReplayResult, Result};
pub use middleware::{CsrfMiddleware, IssuedToken, RequestCheck};
pub use protector::{CsrfProtector, Verdict};
pub use replay::{MemoryReplayGuard, ReplayGuard};
pub use token::{TokenCodec, TokenPayload};

#[cfg(feature = "redis")]
pub use replay::RedisReplayGuard;
