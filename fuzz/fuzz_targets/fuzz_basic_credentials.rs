//! Fuzz testing for Basic credential decoding.
//!
//! `decode_basic_credentials` sees raw client input on every gated request,
//! so it must never panic. When it succeeds, the username must not contain
//! the separator and re-encoding the pair must decode to the same pair.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_basic_credentials
//! cargo +nightly fuzz run fuzz_basic_credentials -- -max_total_time=60
//! ```

#![no_main]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use checkout::gate::decode_basic_credentials;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw header text
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = decode_basic_credentials(s, false);
        let _ = decode_basic_credentials(s, true);
    }

    // Well-formed base64 around arbitrary bytes
    let header = format!("Basic {}", STANDARD.encode(data));
    if let Ok((username, secret)) = decode_basic_credentials(&header, false) {
        assert!(!username.contains(':'));

        let again = format!("Basic {}", STANDARD.encode(format!("{username}:{secret}")));
        let decoded = decode_basic_credentials(&again, false);
        assert_eq!(decoded.ok(), Some((username, secret)));
    }
});
