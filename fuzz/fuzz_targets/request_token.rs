//! Fuzz target for pulling a CSRF token out of request headers and bodies.

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use armature_csrf::{CsrfConfig, CsrfMiddleware, MemoryReplayGuard};
use http::{HeaderMap, HeaderValue};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    header_value: Vec<u8>,
    body: Vec<u8>,
}

fuzz_target!(|data: FuzzRequest| {
    let csrf = CsrfMiddleware::new(CsrfConfig::default(), Arc::new(MemoryReplayGuard::new()))
        .expect("valid middleware");

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_bytes(&data.header_value) {
        headers.insert("x-csrf-token", value);
    }

    let _ = csrf.token_from_request(&headers, &data.body);
});
