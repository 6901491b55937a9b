//! Replay guard backends
//!
//! A replay guard remembers which tokens have already been consumed:
//!
//! - **Memory**: In-memory storage using DashMap (single instance)
//! - **Redis**: Shared storage for multi-instance deployments

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use self::memory::MemoryReplayGuard;
#[cfg(feature = "redis")]
pub use self::redis::RedisReplayGuard;

use crate::error::{ReplayError, ReplayResult};
use async_trait::async_trait;
use std::time::Duration;

/// Single-use tracking for consumed tokens.
///
/// Implementations key entries by whatever they like; the built-in backends
/// store a SHA-256 digest of the token rather than the token itself.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Record `token` as consumed for `ttl`.
    async fn add(&self, token: &str, ttl: Duration) -> ReplayResult<()>;

    /// Succeed if `token` has not been seen.
    ///
    /// Returns [`ReplayError::AlreadyUsed`] if it has, or a backend error.
    async fn check(&self, token: &str) -> ReplayResult<()>;

    /// Record `token` unless it is already present.
    ///
    /// Returns `true` if this call inserted it. The default implementation is
    /// `check` followed by `add` and is not atomic; backends that can do
    /// better should override it.
    async fn add_if_absent(&self, token: &str, ttl: Duration) -> ReplayResult<bool> {
        check_then_add(self, token, ttl).await
    }

    /// Drop expired entries
    async fn cleanup(&self) -> ReplayResult<()> {
        Ok(())
    }

    /// Backend name for diagnostics
    fn guard_type(&self) -> &'static str;
}

/// Consume `token` with a `check` call followed by an `add` call.
///
/// Returns `true` if the token was unseen. Two callers interleaving between
/// the calls can both get `true`.
pub(crate) async fn check_then_add<G>(guard: &G, token: &str, ttl: Duration) -> ReplayResult<bool>
where
    G: ReplayGuard + ?Sized,
{
    match guard.check(token).await {
        Ok(()) => {}
        Err(ReplayError::AlreadyUsed) => return Ok(false),
        Err(e) => return Err(e),
    }
    guard.add(token, ttl).await?;
    Ok(true)
}
