//! Redis replay guard
//!
//! Shares consumed-token state across application instances. Requires the
//! `redis` feature to be enabled.

use crate::error::{ReplayError, ReplayResult};
use crate::replay::ReplayGuard;
use crate::token::token_digest;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, trace};

/// Redis-backed replay guard
///
/// Entries are plain keys with an `EX` expiry, so Redis drops them on its own
/// once a token would be rejected as expired anyway.
pub struct RedisReplayGuard {
    /// Redis connection manager
    conn: ConnectionManager,
    /// Key prefix
    prefix: String,
}

impl RedisReplayGuard {
    /// Create a new Redis guard
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new(url: &str) -> ReplayResult<Self> {
        debug!(url = %url, "Connecting to Redis for CSRF replay tracking");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self::from_connection(conn))
    }

    /// Create a new Redis guard with a custom prefix
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> ReplayResult<Self> {
        let mut guard = Self::new(url).await?;
        guard.prefix = prefix.into();
        Ok(guard)
    }

    /// Wrap an existing connection manager
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: "csrf:used".to_string(),
        }
    }

    /// Get the full key for a token
    fn key(&self, token: &str) -> String {
        format!("{}:{}", self.prefix, token_digest(token))
    }
}

/// Redis `EX` takes whole seconds and rejects zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs.max(1)
    }
}

#[async_trait]
impl ReplayGuard for RedisReplayGuard {
    async fn add(&self, token: &str, ttl: Duration) -> ReplayResult<()> {
        let key = self.key(token);
        trace!(key = %key, ttl = ?ttl, "Redis: recording consumed token");

        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(&key, 1u8, ttl_seconds(ttl)).await?;
        Ok(())
    }

    async fn check(&self, token: &str) -> ReplayResult<()> {
        let key = self.key(token);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await?;
        if exists {
            trace!(key = %key, "Redis: token already consumed");
            return Err(ReplayError::AlreadyUsed);
        }
        Ok(())
    }

    async fn add_if_absent(&self, token: &str, ttl: Duration) -> ReplayResult<bool> {
        let key = self.key(token);
        let mut conn = self.conn.clone();

        // SET key 1 NX EX ttl replies OK on insert and nil if the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1u8)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;

        let inserted = reply.is_some();
        if !inserted {
            trace!(key = %key, "Redis: token already consumed");
        }
        Ok(inserted)
    }

    fn guard_type(&self) -> &'static str {
        "redis"
    }
}
