// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for physical partition naming

#![no_main]

use datagate_gateway::partition::{collection_from_physical, kind_name};
use datagate_gateway::{to_physical_name, BackendKind, NamingMode, PartitionKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let mut parts = s.splitn(3, '\n');
    let (Some(app), Some(collection), Some(owner)) = (parts.next(), parts.next(), parts.next()) else {
        return;
    };

    let key = PartitionKey::new(app, collection, owner);
    for backend in [BackendKind::DocumentStore, BackendKind::KindStore, BackendKind::Embedded] {
        let _ = to_physical_name(&key, backend, NamingMode::PerApp);
        let _ = to_physical_name(&key, backend, NamingMode::Unified);
    }

    // Names built from separator-free parts must map back to their collection.
    if !app.is_empty() && !collection.is_empty() && !owner.is_empty() && !s.contains(['_', '.']) {
        let physical = kind_name(app, collection, owner);
        let recovered = collection_from_physical(app, &physical, BackendKind::KindStore);
        assert_eq!(recovered.as_deref(), Some(collection));
    }
});
