//! In-memory replay guard
//!
//! Uses DashMap for thread-safe concurrent access. Suitable for single-instance
//! deployments or testing. For multiple instances, use the Redis guard.

use crate::error::{ReplayError, ReplayResult};
use crate::replay::ReplayGuard;
use crate::token::token_digest;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Inserts between opportunistic purges of expired entries.
const PURGE_EVERY: usize = 1024;

/// In-memory replay guard with per-entry expiry.
///
/// Expired entries are treated as absent on lookup but are not removed by
/// `check`. They are purged every 1024 inserts, by
/// [`cleanup`](ReplayGuard::cleanup), or periodically via
/// [`spawn_cleanup`](MemoryReplayGuard::spawn_cleanup).
pub struct MemoryReplayGuard {
    /// Token digest -> expiry instant
    entries: DashMap<String, Instant>,
    inserts: AtomicUsize,
}

impl MemoryReplayGuard {
    /// Create a new in-memory guard
    pub fn new() -> Self {
        debug!("Creating new in-memory replay guard");
        Self {
            entries: DashMap::new(),
            inserts: AtomicUsize::new(0),
        }
    }

    /// Number of tracked tokens, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the guard is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.entries.len())
    }

    /// Purge expired entries once every [`PURGE_EVERY`] inserts.
    ///
    /// Must not be called while holding a map entry.
    fn note_insert(&self) {
        let count = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if count % PURGE_EVERY == 0 {
            let removed = self.purge_expired();
            if removed > 0 {
                trace!(removed = removed, "Purged expired replay entries");
            }
        }
    }

    /// Start a background task that purges expired entries every `interval`.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = guard.purge_expired();
                if removed > 0 {
                    trace!(removed = removed, "Purged expired replay entries");
                }
            }
        })
    }
}

impl Default for MemoryReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplayGuard for MemoryReplayGuard {
    async fn add(&self, token: &str, ttl: Duration) -> ReplayResult<()> {
        let key = token_digest(token);
        let expiry = expiry_after(Instant::now(), ttl)?;
        trace!(key = %key, ttl = ?ttl, "Recording consumed token");
        self.entries.insert(key, expiry);
        self.note_insert();
        Ok(())
    }

    async fn check(&self, token: &str) -> ReplayResult<()> {
        let key = token_digest(token);
        let now = Instant::now();

        match self.entries.get(&key) {
            Some(expiry) if *expiry > now => {
                trace!(key = %key, "Token already consumed");
                Err(ReplayError::AlreadyUsed)
            }
            _ => Ok(()),
        }
    }

    async fn add_if_absent(&self, token: &str, ttl: Duration) -> ReplayResult<bool> {
        let key = token_digest(token);
        let now = Instant::now();
        let expiry = expiry_after(now, ttl)?;

        let inserted = match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    trace!(key = %entry.key(), "Token already consumed");
                    false
                } else {
                    entry.insert(expiry);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expiry);
                true
            }
        };

        if inserted {
            self.note_insert();
        }
        Ok(inserted)
    }

    async fn cleanup(&self) -> ReplayResult<()> {
        let removed = self.purge_expired();
        debug!(removed = removed, remaining = self.len(), "Cleanup complete");
        Ok(())
    }

    fn guard_type(&self) -> &'static str {
        "memory"
    }
}

fn expiry_after(now: Instant, ttl: Duration) -> ReplayResult<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| ReplayError::store(format!("TTL {:?} out of range", ttl)))
}
