// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the datagate query layer and drivers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::runtime::Runtime;

use datagate_gateway::selector::{DOCUMENT_DRIVER, EMBEDDED_DRIVER, KIND_DRIVER};
use datagate_gateway::{
    AppScope, BackendKindStore, CustomDriverConfig, DataStoreManager, Driver, FindSpec,
    GatewayConfig, KindStoreDriver, PartitionKey,
};
use datagate_query::{normalize, Entity, QueryOptions, SortSpec};

fn record(i: usize) -> Entity {
    let value = json!({
        "title": format!("note {i}"),
        "rank": i % 100,
        "tag": format!("tag{}", i % 7),
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn manager_for(rt: &Runtime, driver: &str) -> DataStoreManager {
    let config = GatewayConfig {
        custom_driver: Some(CustomDriverConfig {
            name: driver.to_string(),
            apps: AppScope::All,
        }),
        ..GatewayConfig::default()
    };
    rt.block_on(DataStoreManager::in_memory(config)).unwrap()
}

fn seed(rt: &Runtime, manager: &DataStoreManager, key: &PartitionKey, n: usize) {
    rt.block_on(async {
        for i in 0..n {
            manager
                .insert(key, None, record(i), &QueryOptions::default())
                .await
                .unwrap();
        }
    });
}

// ============================================================================
// Query Normalization Benchmarks
// ============================================================================

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    let cases = [
        ("id", json!("some-record-id")),
        ("equality", json!({"title": "note 1", "tag": "tag3"})),
        ("range", json!({"rank": {"$gte": 10, "$lt": 50}})),
        (
            "and_or",
            json!({"$and": [
                {"tag": "tag1"},
                {"$or": [{"_owner": "alice"}, {"_owner": "bob"}, {"_owner": "carol"}]}
            ]}),
        ),
    ];

    for (name, raw) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), raw, |b, raw| {
            b.iter(|| black_box(normalize(raw).unwrap()))
        });
    }

    group.bench_function("reject_unsupported", |b| {
        let raw = json!({"$where": "this.a == 1"});
        b.iter(|| black_box(normalize(&raw).is_err()))
    });

    group.finish();
}

// ============================================================================
// Driver Benchmarks
// ============================================================================

fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("insert");

    for driver in [DOCUMENT_DRIVER, KIND_DRIVER, EMBEDDED_DRIVER] {
        let manager = manager_for(&rt, driver);
        let key = PartitionKey::new("bench.app", "notes", "owner");
        group.bench_function(driver, |b| {
            b.to_async(&rt).iter(|| async {
                black_box(
                    manager
                        .insert(&key, None, record(1), &QueryOptions::default())
                        .await
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("find");
    group.throughput(Throughput::Elements(1000));

    let query = json!({"rank": {"$lt": 20}});
    let options = QueryOptions::default()
        .with_sort(SortSpec::new().descending("rank"))
        .with_count(50);

    for driver in [DOCUMENT_DRIVER, KIND_DRIVER, EMBEDDED_DRIVER] {
        let manager = manager_for(&rt, driver);
        let key = PartitionKey::new("bench.app", "notes", "owner");
        seed(&rt, &manager, &key, 1000);

        group.bench_function(driver, |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(manager.find(&key, &query, &options).await.unwrap()) });
        });
    }

    group.finish();
}

fn bench_kind_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let driver = KindStoreDriver::new(Arc::new(BackendKindStore::in_memory()));
    let owners: Vec<String> = (0..8).map(|i| format!("owner{i}")).collect();

    rt.block_on(async {
        for owner in &owners {
            let key = PartitionKey::new("bench.app", "notes", owner.as_str());
            for i in 0..100 {
                let mut entity = record(i);
                entity.insert("_id".into(), json!(format!("{owner}-{i}")));
                entity.insert("_owner".into(), json!(owner));
                driver.insert(&key, entity).await.unwrap();
            }
        }
    });

    let mut group = c.benchmark_group("kind_fan_out");
    for branches in [1usize, 2, 4, 8] {
        let or: Vec<Value> = owners[..branches]
            .iter()
            .map(|owner| json!({"_owner": owner}))
            .collect();
        let query = normalize(&json!({"$or": or})).unwrap();
        let key = PartitionKey::new("bench.app", "notes", "owner0");

        group.bench_with_input(BenchmarkId::from_parameter(branches), &query, |b, query| {
            b.to_async(&rt).iter(|| async {
                black_box(driver.find(&key, query, &FindSpec::unbounded()).await.unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(query_benches, bench_normalize);
criterion_group!(driver_benches, bench_insert, bench_find, bench_kind_fan_out);

criterion_main!(query_benches, driver_benches);
