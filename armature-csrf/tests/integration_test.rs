//! Integration tests for armature-csrf

use armature_csrf::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

const SECRET: &[u8; 32] = b"integration_secret_32_bytes_long";

fn protector_with(mode: ConsumeMode, guard: Arc<dyn ReplayGuard>) -> CsrfProtector {
    let config = CsrfConfig::new(SECRET.to_vec())
        .unwrap()
        .with_token_ttl(3600)
        .with_consume_mode(mode);
    CsrfProtector::new(&config, guard).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn protector() -> CsrfProtector {
    protector_with(ConsumeMode::Atomic, Arc::new(MemoryReplayGuard::new()))
}

/// Memory guard that counts calls and can hold `check` callers at a barrier.
struct GatedGuard {
    inner: MemoryReplayGuard,
    gate: Option<Barrier>,
    calls: AtomicUsize,
}

impl GatedGuard {
    fn new(gate: Option<Barrier>) -> Self {
        Self {
            inner: MemoryReplayGuard::new(),
            gate,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReplayGuard for GatedGuard {
    async fn add(&self, token: &str, ttl: Duration) -> ReplayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.add(token, ttl).await
    }

    async fn check(&self, token: &str) -> ReplayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.check(token).await;
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        result
    }

    async fn add_if_absent(&self, token: &str, ttl: Duration) -> ReplayResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.add_if_absent(token, ttl).await
    }

    fn guard_type(&self) -> &'static str {
        "gated"
    }
}

struct UnavailableGuard;

#[async_trait]
impl ReplayGuard for UnavailableGuard {
    async fn add(&self, _token: &str, _ttl: Duration) -> ReplayResult<()> {
        Err(ReplayError::store("connection refused"))
    }

    async fn check(&self, _token: &str) -> ReplayResult<()> {
        Err(ReplayError::store("connection refused"))
    }

    fn guard_type(&self) -> &'static str {
        "unavailable"
    }
}

#[tokio::test]
async fn test_session_scenario() {
    init_tracing();
    let protector = protector();

    let token = protector.create("sess-42", 1000).unwrap();
    assert!(protector.check_at("sess-42", &token, 1000).await.unwrap());
    assert!(!protector.check_at("sess-42", &token, 1001).await.unwrap());

    let second = protector.create("sess-42", 1000).unwrap();
    assert_eq!(
        protector.verify_at("sess-42", &second, 4601).await.unwrap(),
        Verdict::Expired
    );
}

#[tokio::test]
async fn test_round_trip_many_sessions() {
    let protector = protector();
    let sessions = vec![
        "a".to_string(),
        "sess-42".to_string(),
        "ünïcödé".to_string(),
        "with spaces".to_string(),
        "x".repeat(512),
    ];

    for (i, session) in sessions.iter().enumerate() {
        let issued_at = 1_700_000_000 + i as i64;
        let token = protector.create(session, issued_at).unwrap();
        assert!(protector.check_at(session, &token, issued_at).await.unwrap());
    }
}

#[tokio::test]
async fn test_tampered_token_never_accepted() {
    let protector = protector();
    let token = protector.create("sess-42", 1000).unwrap();

    for i in 0..token.len() {
        let mut bytes = token.clone().into_bytes();
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let result = protector.check_at("sess-42", &tampered, 1000).await;
        assert!(
            matches!(&result, Err(e) if e.is_format_error()),
            "position {}: {:?}",
            i,
            result
        );
    }
}

#[tokio::test]
async fn test_flipped_byte_is_authentication_failure() {
    use base64::{Engine, engine::general_purpose::STANDARD};

    let protector = protector();
    let token = protector.create("sess-42", 1000).unwrap();
    let mut raw = STANDARD.decode(&token).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x80;

    let result = protector.check_at("sess-42", &STANDARD.encode(raw), 1000).await;
    assert!(matches!(result, Err(CsrfError::Authentication)));

    // The genuine token is untouched by the forgery attempt
    assert!(protector.check_at("sess-42", &token, 1000).await.unwrap());
}

#[tokio::test]
async fn test_malformed_token_has_no_side_effects() {
    let guard = Arc::new(GatedGuard::new(None));
    let protector = protector_with(ConsumeMode::Atomic, guard.clone());

    for _ in 0..3 {
        let result = protector.check_at("sess-42", "not-a-token", 1000).await;
        assert!(matches!(result, Err(CsrfError::Decode(_))));
    }
    assert!(matches!(
        protector.check_at("sess-42", "", 1000).await,
        Err(CsrfError::Malformed(_))
    ));
    assert_eq!(guard.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_token_from_other_key_rejected() {
    let token = protector().create("sess-42", 1000).unwrap();

    let config = CsrfConfig::new(CsrfConfig::generate_secret()).unwrap();
    let other = CsrfProtector::new(&config, Arc::new(MemoryReplayGuard::new())).unwrap();

    assert!(matches!(
        other.check_at("sess-42", &token, 1000).await,
        Err(CsrfError::Authentication)
    ));
}

#[tokio::test]
async fn test_cross_session_rejected_before_guard() {
    let guard = Arc::new(GatedGuard::new(None));
    let protector = protector_with(ConsumeMode::CheckThenAdd, guard.clone());
    let token = protector.create("sess-42", 1000).unwrap();

    assert!(!protector.check_at("sess-99", &token, 1000).await.unwrap());
    assert_eq!(guard.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unavailable_guard_fails_closed() {
    for mode in [ConsumeMode::Atomic, ConsumeMode::CheckThenAdd] {
        let protector = protector_with(mode, Arc::new(UnavailableGuard));
        let token = protector.create("sess-42", 1000).unwrap();

        let result = protector.check_at("sess-42", &token, 1000).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_store_error());
    }
}

#[tokio::test]
async fn test_atomic_mode_accepts_exactly_once_under_concurrency() {
    let protector = protector();
    let token = protector.create("sess-42", 1000).unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let protector = protector.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            protector.check_at("sess-42", &token, 1000).await.unwrap()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}

/// Two-call consumption lets both of two interleaved checks through. This is
/// the race `ConsumeMode::Atomic` exists to close.
#[tokio::test]
async fn test_check_then_add_race() {
    let guard: Arc<dyn ReplayGuard> = Arc::new(GatedGuard::new(Some(Barrier::new(2))));
    let racy = protector_with(ConsumeMode::CheckThenAdd, Arc::clone(&guard));
    let token = racy.create("sess-42", 1000).unwrap();

    let (a, b) = tokio::join!(
        racy.check_at("sess-42", &token, 1000),
        racy.check_at("sess-42", &token, 1000)
    );
    assert!(a.unwrap());
    assert!(b.unwrap());

    // Same interleaving with atomic consumption: one winner
    let guard: Arc<dyn ReplayGuard> = Arc::new(GatedGuard::new(Some(Barrier::new(2))));
    let atomic = protector_with(ConsumeMode::Atomic, guard);
    let token = atomic.create("sess-42", 1000).unwrap();

    let (a, b) = tokio::join!(
        atomic.check_at("sess-42", &token, 1000),
        atomic.check_at("sess-42", &token, 1000)
    );
    assert_ne!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_middleware_end_to_end() {
    use http::{HeaderMap, HeaderValue, Method};

    init_tracing();

    let config = CsrfConfig::new(SECRET.to_vec())
        .unwrap()
        .with_exclude_paths(vec!["/webhooks".to_string()]);
    let csrf = CsrfMiddleware::new(config, Arc::new(MemoryReplayGuard::new())).unwrap();

    let issued = csrf.issue("sess-42").unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("x-csrf-token", HeaderValue::from_str(&issued.value).unwrap());

    let webhook = csrf
        .validate_request("sess-42", &Method::POST, "/webhooks/github", &HeaderMap::new(), b"")
        .await;
    assert!(matches!(webhook, RequestCheck::Skipped));

    let first = csrf
        .validate_request("sess-42", &Method::POST, "/playlists", &headers, b"")
        .await;
    assert!(first.is_allowed());

    let replay = csrf
        .validate_request("sess-42", &Method::POST, "/playlists", &headers, b"")
        .await;
    assert_eq!(replay.reason(), "replayed");
}

#[test]
fn test_csrf_config_defaults() {
    let config = CsrfConfig::default();
    assert_eq!(config.secret.len(), 32);
    assert_eq!(config.token_ttl, 3600);
    assert_eq!(config.header_name, "X-CSRF-Token");
    assert_eq!(config.consume_mode, ConsumeMode::Atomic);
}
