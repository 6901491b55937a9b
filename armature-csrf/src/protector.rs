//! Token issuance and single-use verification.

use crate::config::{ConsumeMode, CsrfConfig};
use crate::error::{CsrfError, Result};
use crate::replay::{ReplayGuard, check_then_add};
use crate::token::{TokenCodec, TokenPayload, token_digest};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Outcome of verifying a genuine token.
///
/// Forged, tampered and malformed tokens never produce a verdict; they are
/// reported as [`CsrfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Token was fresh, correctly bound, unused, and is now consumed
    Accepted,
    /// Token is older than the configured window
    Expired,
    /// Token was minted for a different session
    SessionMismatch,
    /// Token has already been consumed
    Replayed,
}

impl Verdict {
    /// Whether the request may proceed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    /// Short machine-readable reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Expired => "expired",
            Verdict::SessionMismatch => "session_mismatch",
            Verdict::Replayed => "replayed",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mints session-bound tokens and verifies each one at most once.
#[derive(Clone)]
pub struct CsrfProtector {
    codec: TokenCodec,
    guard: Arc<dyn ReplayGuard>,
    token_ttl: i64,
    consume_mode: ConsumeMode,
}

impl CsrfProtector {
    /// Create a protector from configuration and a replay guard.
    pub fn new(config: &CsrfConfig, guard: Arc<dyn ReplayGuard>) -> Result<Self> {
        config.validate()?;
        let codec = TokenCodec::from_config(config)?;

        debug!(
            token_ttl = config.token_ttl,
            consume_mode = ?config.consume_mode,
            guard = guard.guard_type(),
            "Creating CSRF protector"
        );

        Ok(Self {
            codec,
            guard,
            token_ttl: config.token_ttl,
            consume_mode: config.consume_mode,
        })
    }

    /// Token lifetime in seconds
    pub fn token_ttl(&self) -> i64 {
        self.token_ttl
    }

    /// The underlying codec
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Mint a token for `session_id` stamped with `issued_at`.
    pub fn create(&self, session_id: &str, issued_at: i64) -> Result<String> {
        let token = self.codec.create(session_id, issued_at)?;
        trace!(issued_at = issued_at, digest = %short_digest(&token), "Minted CSRF token");
        Ok(token)
    }

    /// Mint a token stamped with the current time.
    pub fn create_now(&self, session_id: &str) -> Result<String> {
        self.create(session_id, now())
    }

    /// Verify and consume a token against the current time.
    ///
    /// `Ok(false)` covers expired, wrongly bound and replayed tokens.
    pub async fn check(&self, session_id: &str, token: &str) -> Result<bool> {
        self.check_at(session_id, token, now()).await
    }

    /// Verify and consume a token as of `now` (Unix seconds).
    pub async fn check_at(&self, session_id: &str, token: &str, now: i64) -> Result<bool> {
        Ok(self.verify_at(session_id, token, now).await?.is_accepted())
    }

    /// Verify and consume a token against the current time, reporting why it
    /// was rejected.
    pub async fn verify(&self, session_id: &str, token: &str) -> Result<Verdict> {
        self.verify_at(session_id, token, now()).await
    }

    /// Verify and consume a token as of `now`, reporting why it was rejected.
    ///
    /// Gates run in a fixed order: decode, authenticate, deserialize, expiry,
    /// session binding, replay, consume. A token is only recorded in the
    /// replay guard after every earlier gate has passed.
    pub async fn verify_at(&self, session_id: &str, token: &str, now: i64) -> Result<Verdict> {
        let payload = match self.codec.open(token) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Rejecting undecodable CSRF token");
                return Err(e);
            }
        };

        if payload.is_expired(now, self.token_ttl) {
            debug!(
                age = payload.age(now),
                token_ttl = self.token_ttl,
                "Rejecting expired CSRF token"
            );
            return Ok(Verdict::Expired);
        }

        let expected = TokenPayload::new(session_id, payload.issued_at);
        if payload != expected {
            warn!(digest = %short_digest(token), "CSRF token presented for another session");
            return Ok(Verdict::SessionMismatch);
        }

        let ttl = self.replay_ttl(&payload, now);
        let consumed = match self.consume_mode {
            ConsumeMode::Atomic => self.guard.add_if_absent(token, ttl).await,
            ConsumeMode::CheckThenAdd => check_then_add(self.guard.as_ref(), token, ttl).await,
        };

        match consumed {
            Ok(true) => {
                trace!(digest = %short_digest(token), "CSRF token accepted");
                Ok(Verdict::Accepted)
            }
            Ok(false) => {
                warn!(digest = %short_digest(token), "CSRF token replayed");
                Ok(Verdict::Replayed)
            }
            Err(e) => {
                warn!(error = %e, guard = self.guard.guard_type(), "Replay guard unavailable");
                Err(CsrfError::Replay(e))
            }
        }
    }

    /// How long the replay guard must remember a consumed token.
    ///
    /// Covers the token's remaining lifetime, which exceeds the window for
    /// future-dated tokens, plus one second so the entry outlives the last
    /// second in which the token is still unexpired.
    fn replay_ttl(&self, payload: &TokenPayload, now: i64) -> Duration {
        let remaining = payload
            .issued_at
            .saturating_add(self.token_ttl)
            .saturating_sub(now);
        Duration::from_secs(remaining.max(self.token_ttl).unsigned_abs().saturating_add(1))
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// First characters of the token digest, for correlating log lines.
fn short_digest(token: &str) -> String {
    token_digest(token).chars().take(12).collect()
}
