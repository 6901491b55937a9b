use crate::{
    config::CsrfConfig,
    error::{CsrfError, Result},
    protector::{CsrfProtector, Verdict},
    replay::ReplayGuard,
};
use http::{HeaderMap, Method};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A freshly minted token and where the client should send it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Header the client must echo the token in
    pub header_name: String,
    /// Opaque token value
    pub value: String,
}

/// Result of checking one inbound request.
#[derive(Debug)]
pub enum RequestCheck {
    /// Safe method or excluded path
    Skipped,
    /// Token verified and consumed
    Valid,
    /// No token in the header or body
    Missing,
    /// Genuine token that is expired, wrongly bound or reused
    Rejected(Verdict),
    /// Undecodable or forged token, or the replay guard failed
    Failed(CsrfError),
}

impl RequestCheck {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RequestCheck::Skipped | RequestCheck::Valid)
    }

    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            RequestCheck::Skipped => "skipped",
            RequestCheck::Valid => "valid",
            RequestCheck::Missing => "missing",
            RequestCheck::Rejected(verdict) => verdict.as_str(),
            RequestCheck::Failed(e) if e.is_store_error() => "store_unavailable",
            RequestCheck::Failed(_) => "invalid",
        }
    }
}

impl fmt::Display for RequestCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// CSRF protection for an HTTP layer.
///
/// The session identifier is always passed in by the caller; this type never
/// looks it up itself.
#[derive(Clone)]
pub struct CsrfMiddleware {
    protector: CsrfProtector,
    config: Arc<CsrfConfig>,
}

impl CsrfMiddleware {
    /// Create new CSRF middleware
    pub fn new(config: CsrfConfig, guard: Arc<dyn ReplayGuard>) -> Result<Self> {
        let protector = CsrfProtector::new(&config, guard)?;
        Ok(Self {
            protector,
            config: Arc::new(config),
        })
    }

    /// The underlying protector
    pub fn protector(&self) -> &CsrfProtector {
        &self.protector
    }

    /// Check if request needs CSRF protection
    pub fn needs_protection(&self, method: &Method, path: &str) -> bool {
        // Check if method is safe
        if self
            .config
            .safe_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
        {
            return false;
        }

        // Check if path is excluded
        !self
            .config
            .exclude_paths
            .iter()
            .any(|excluded| path.starts_with(excluded.as_str()))
    }

    /// Mint a token for the session, stamped with the current time
    pub fn issue(&self, session_id: &str) -> Result<IssuedToken> {
        Ok(IssuedToken {
            header_name: self.config.header_name.clone(),
            value: self.protector.create_now(session_id)?,
        })
    }

    /// Validate and consume the CSRF token carried by a request
    pub async fn validate_request(
        &self,
        session_id: &str,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> RequestCheck {
        if !self.needs_protection(method, path) {
            trace!(method = %method, path = %path, "CSRF check skipped");
            return RequestCheck::Skipped;
        }

        let Some(token) = self.token_from_request(headers, body) else {
            debug!(
                method = %method,
                path = %path,
                header = %self.config.header_name,
                field = %self.config.field_name,
                "Missing CSRF token"
            );
            return RequestCheck::Missing;
        };

        match self.protector.verify(session_id, &token).await {
            Ok(Verdict::Accepted) => RequestCheck::Valid,
            Ok(verdict) => {
                debug!(path = %path, verdict = %verdict, "CSRF token rejected");
                RequestCheck::Rejected(verdict)
            }
            Err(e) => {
                debug!(path = %path, error = %e, "CSRF validation failed");
                RequestCheck::Failed(e)
            }
        }
    }

    /// Get token from header, falling back to the request body
    pub fn token_from_request(&self, headers: &HeaderMap, body: &[u8]) -> Option<String> {
        self.token_from_header(headers)
            .or_else(|| self.token_from_body(body))
    }

    /// Get token from header
    fn token_from_header(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(self.config.header_name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Get token from request body
    fn token_from_body(&self, body: &[u8]) -> Option<String> {
        if body.is_empty() {
            return None;
        }

        // Try to parse as JSON
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
            return json
                .get(&self.config.field_name)
                .and_then(|token| token.as_str())
                .map(str::to_string);
        }

        // Try to parse as form data
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .ok()?
            .into_iter()
            .find(|(key, _)| *key == self.config.field_name)
            .map(|(_, value)| value)
    }
}
