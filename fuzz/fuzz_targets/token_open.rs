//! Fuzz target for token opening and verification.
//!
//! Arbitrary strings must never panic and must never verify.

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use armature_csrf::{CsrfConfig, CsrfProtector, MemoryReplayGuard, TokenCodec};
use libfuzzer_sys::fuzz_target;

const SECRET: &[u8; 32] = b"fuzzing_secret_key_32_bytes_long";

#[derive(Debug, Arbitrary)]
struct FuzzToken {
    session_id: String,
    token: String,
    now: i64,
}

fuzz_target!(|data: FuzzToken| {
    let codec = TokenCodec::new(SECRET).expect("valid key");
    assert!(codec.open(&data.token).is_err());

    let config = CsrfConfig::new(SECRET.to_vec()).expect("valid config");
    let protector =
        CsrfProtector::new(&config, Arc::new(MemoryReplayGuard::new())).expect("valid protector");

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let result = rt.block_on(protector.check_at(&data.session_id, &data.token, data.now));
    assert!(result.is_err());

    // Genuine tokens survive arbitrary session ids and clocks without panicking
    if let Ok(token) = codec.create(&data.session_id, data.now) {
        let _ = rt.block_on(protector.check_at(&data.session_id, &token, data.now));
    }
});
