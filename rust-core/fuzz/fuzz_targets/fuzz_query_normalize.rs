// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for query normalization.
// Run with: cargo +nightly fuzz run fuzz_query_normalize
//
// Any JSON value must either normalize or be rejected with a QueryError.
// Accepted queries must survive a trip through their canonical JSON form.

#![no_main]

use datagate_query::normalize;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    let Ok(raw) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if let Ok(query) = normalize(&raw) {
        let again = normalize(&query.to_value()).expect("canonical form normalizes");
        assert_eq!(query, again);
    }
});
