// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for PSK token verification on untrusted input

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        // Malformed tokens must be rejected without panicking.
        let _ = carto_trust::psk::decode_token(token, "fuzz key");
        let _ = carto_transport::token_expiry(token);
    }
});
