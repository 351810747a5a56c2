// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for NDJSON line splitting across arbitrary chunk boundaries

#![no_main]

use carto_transport::LineSplitter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size, the rest is the body.
    let Some((&chunk, body)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk.max(1));

    let mut whole = LineSplitter::new();
    let mut expected = whole.push(body);
    expected.extend(whole.finish());

    let mut split = LineSplitter::new();
    let mut lines = Vec::new();
    for piece in body.chunks(chunk) {
        lines.extend(split.push(piece));
    }
    lines.extend(split.finish());

    assert_eq!(lines, expected);
    assert!(lines.iter().all(|line| !line.contains(&b'\n')));
});
