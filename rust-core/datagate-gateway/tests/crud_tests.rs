// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end façade behaviour, run against every built-in driver.

use std::time::Duration;

use datagate_gateway::{
    AppScope, CustomDriverConfig, DataStoreManager, GatewayConfig, GatewayError, PartitionKey,
    UpdateResult,
};
use datagate_query::{Entity, QueryOptions, SortSpec};
use serde_json::{json, Value};

fn entity(value: Value) -> Entity {
    value.as_object().cloned().unwrap()
}

fn key() -> PartitionKey {
    PartitionKey::new("test_app", "coll_1", "testUser")
}

fn config_for(driver: Option<&str>) -> GatewayConfig {
    GatewayConfig {
        custom_driver: driver.map(|name| CustomDriverConfig {
            name: name.to_string(),
            apps: AppScope::All,
        }),
        ..GatewayConfig::default()
    }
}

async fn managers() -> Vec<(&'static str, DataStoreManager)> {
    let mut managers = Vec::new();
    for (label, driver) in [("document", None), ("kind", Some("kind")), ("embedded", Some("embedded"))] {
        let manager = DataStoreManager::in_memory(config_for(driver)).await.unwrap();
        managers.push((label, manager));
    }
    managers
}

async fn count_owned(manager: &DataStoreManager) -> usize {
    manager
        .find(&key(), &json!({"_owner": "testUser"}), &QueryOptions::default())
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_reference_scenario_on_every_driver() {
    for (label, manager) in managers().await {
        let defaults = QueryOptions::default();
        let base = json!({"test_field": "hello - no id", "tag": "tag1", "allhave": "thisvalue"});

        manager.insert(&key(), None, entity(base.clone()), &defaults).await.unwrap();
        assert_eq!(count_owned(&manager).await, 1, "{label}: first insert");

        manager
            .insert(&key(), Some("testid1"), entity(base.clone()), &defaults)
            .await
            .unwrap();
        assert_eq!(count_owned(&manager).await, 2, "{label}: insert with id");

        let err = manager
            .insert(&key(), Some("testid1"), entity(base.clone()), &defaults)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateId { .. }), "{label}: {err}");
        assert_eq!(count_owned(&manager).await, 2, "{label}: duplicate left count unchanged");

        let mut tagged = entity(base.clone());
        tagged.insert("tag".into(), json!("tag2"));
        manager.upsert(&key(), &json!("testid2"), tagged).await.unwrap();
        assert_eq!(count_owned(&manager).await, 3, "{label}: upsert creates");

        let mut other = entity(base.clone());
        other.insert("tag".into(), json!("tag3"));
        manager.insert(&key(), Some("testid3"), other, &defaults).await.unwrap();

        let query = json!({"$and": [
            {"allhave": "thisvalue"},
            {"$or": [{"tag": "tag2"}, {"tag": "tag1"}]}
        ]});
        let found = manager.find(&key(), &query, &defaults).await.unwrap();
        assert_eq!(found.len(), 3, "{label}: disjunction subset");
        assert!(found.iter().all(|e| e["tag"] != "tag3"), "{label}");

        assert_eq!(
            manager.list_partition_names("test_app").await.unwrap(),
            vec!["coll_1".to_string()],
            "{label}: partition listed once"
        );

        manager.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_insert_then_get_round_trips() {
    for (label, manager) in managers().await {
        let ack = manager
            .insert(
                &key(),
                Some("r1"),
                entity(json!({"a": 1, "nested": {"b": [1, 2]}})),
                &QueryOptions::default(),
            )
            .await
            .unwrap();
        let stored = manager.get_by_id(&key(), "r1").await.unwrap().unwrap();
        assert_eq!(stored, ack.entity, "{label}");
        assert_eq!(stored["nested"], json!({"b": [1, 2]}));
        assert_eq!(stored["_date_Created"], stored["_date_Modified"], "{label}");
        assert!(manager.get_by_id(&key(), "missing").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_upsert_existing_keeps_created_and_advances_modified() {
    for (label, manager) in managers().await {
        let first = manager
            .upsert(&key(), &json!("u1"), entity(json!({"v": 1, "keep": true})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = manager
            .upsert(&key(), &json!("u1"), entity(json!({"v": 2})))
            .await
            .unwrap();
        assert_eq!(second["_date_Created"], first["_date_Created"], "{label}");
        assert!(
            second["_date_Modified"].as_i64().unwrap() > first["_date_Modified"].as_i64().unwrap(),
            "{label}"
        );

        let stored = manager.get_by_id(&key(), "u1").await.unwrap().unwrap();
        assert_eq!(stored["v"], 2);
        assert!(stored.get("keep").is_none(), "{label}: upsert replaces wholesale");
        assert_eq!(stored["_owner"], "testUser");
    }
}

#[tokio::test]
async fn test_update_patches_and_counts() {
    for (label, manager) in managers().await {
        let defaults = QueryOptions::default();
        for id in ["p1", "p2", "p3"] {
            manager
                .insert(&key(), Some(id), entity(json!({"group": "g", "v": 0})), &defaults)
                .await
                .unwrap();
        }

        let none = manager
            .update(&key(), &json!({"group": "absent"}), entity(json!({"v": 1})), &defaults)
            .await
            .unwrap();
        assert_eq!(none, UpdateResult { n: 0, n_modified: 0 }, "{label}");

        let one = manager
            .update(&key(), &json!({"group": "g"}), entity(json!({"v": 1})), &defaults)
            .await
            .unwrap();
        assert_eq!(one.n, 1, "{label}");

        let all = manager
            .update(
                &key(),
                &json!({"group": "g"}),
                entity(json!({"v": 2, "_owner": "intruder"})),
                &QueryOptions::default().multi(),
            )
            .await
            .unwrap();
        assert_eq!(all, UpdateResult { n: 3, n_modified: 3 }, "{label}");

        let found = manager.find(&key(), &json!({"v": 2}), &defaults).await.unwrap();
        assert_eq!(found.len(), 3, "{label}");
        assert!(found.iter().all(|e| e["_owner"] == "testUser"), "{label}: owner is immutable");
    }
}

#[tokio::test]
async fn test_update_replace_all_fields() {
    for (label, manager) in managers().await {
        let ack = manager
            .insert(&key(), Some("f1"), entity(json!({"a": 1, "b": 2})), &QueryOptions::default())
            .await
            .unwrap();
        let result = manager
            .update(
                &key(),
                &json!("f1"),
                entity(json!({"c": 3})),
                &QueryOptions::default().replacing_all_fields(),
            )
            .await
            .unwrap();
        assert_eq!(result.n, 1, "{label}");

        let stored = manager.get_by_id(&key(), "f1").await.unwrap().unwrap();
        assert!(stored.get("a").is_none(), "{label}");
        assert_eq!(stored["c"], 3);
        assert_eq!(stored["_date_Created"], ack.entity["_date_Created"]);
    }
}

#[tokio::test]
async fn test_sort_count_skip() {
    for (label, manager) in managers().await {
        for (id, rank) in [("s1", 1), ("s2", 2), ("s3", 3), ("s4", 4)] {
            manager
                .insert(&key(), Some(id), entity(json!({"rank": rank})), &QueryOptions::default())
                .await
                .unwrap();
        }

        let top = manager
            .find(
                &key(),
                &json!({}),
                &QueryOptions::default()
                    .with_sort(SortSpec::new().descending("rank"))
                    .with_count(2),
            )
            .await
            .unwrap();
        let ranks: Vec<_> = top.iter().map(|e| e["rank"].clone()).collect();
        assert_eq!(ranks, vec![json!(4), json!(3)], "{label}");

        let page = manager
            .find(
                &key(),
                &json!({}),
                &QueryOptions::default()
                    .with_sort(SortSpec::new().ascending("rank"))
                    .with_count(2)
                    .with_skip(1),
            )
            .await
            .unwrap();
        let ranks: Vec<_> = page.iter().map(|e| e["rank"].clone()).collect();
        assert_eq!(ranks, vec![json!(2), json!(3)], "{label}");

        let keys = manager
            .find(&key(), &json!({"rank": {"$gte": 3}}), &QueryOptions::default().key_only())
            .await
            .unwrap();
        assert_eq!(keys.len(), 2, "{label}");
        assert!(keys.iter().all(|e| e.len() == 1 && e.contains_key("_id")), "{label}");
    }
}

#[tokio::test]
async fn test_remove_single_and_multi() {
    for (label, manager) in managers().await {
        for id in ["d1", "d2", "d3"] {
            manager
                .insert(&key(), Some(id), entity(json!({"gone": true})), &QueryOptions::default())
                .await
                .unwrap();
        }
        let one = manager
            .remove(&key(), &json!({"gone": true}), &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(one.n, 1, "{label}");
        let rest = manager
            .remove(&key(), &json!({"gone": true}), &QueryOptions::default().multi())
            .await
            .unwrap();
        assert_eq!(rest.n, 2, "{label}");
        let by_id = manager
            .remove(&key(), &json!("d1"), &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(by_id.n, 0, "{label}");
        assert_eq!(count_owned(&manager).await, 0, "{label}");
    }
}

#[tokio::test]
async fn test_malformed_queries_never_reach_a_driver() {
    for (label, manager) in managers().await {
        for bad in [
            json!({"$and": [{"a": 1}], "b": 2}),
            json!({"$and": [{"a": 1, "b": 2}]}),
            json!({"$or": [{"a": 1}], "$and": []}),
            json!({"a": {"$regex": "x"}}),
            json!(42),
        ] {
            let err = manager
                .find(&key(), &bad, &QueryOptions::default())
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{label}: {bad} gave {err}");
        }
    }
}

#[tokio::test]
async fn test_owners_are_isolated() {
    for (label, manager) in managers().await {
        let alice = PartitionKey::new("test_app", "coll_1", "alice");
        let bob = alice.with_owner("bob");
        manager
            .insert(&alice, Some("same"), entity(json!({"who": "alice"})), &QueryOptions::default())
            .await
            .unwrap();

        let seen_by_bob = manager.find(&bob, &json!({}), &QueryOptions::default()).await.unwrap();
        assert!(seen_by_bob.is_empty(), "{label}");
        assert!(manager.get_by_id(&bob, "same").await.unwrap().is_none(), "{label}");
    }
}

async fn ids(manager: &DataStoreManager, key: &PartitionKey, query: Value) -> Vec<String> {
    let mut ids: Vec<String> = manager
        .find(key, &query, &QueryOptions::default())
        .await
        .unwrap()
        .iter()
        .filter_map(|e| e["_id"].as_str().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_mixed_disjunction_scopes_field_branches_to_the_caller() {
    for (label, manager) in managers().await {
        for (owner, id, tag) in [("bob", "b1", "y"), ("carol", "c1", "x"), ("alice", "a1", "x")] {
            let key = PartitionKey::new("app", "notes", owner);
            manager
                .insert(&key, Some(id), entity(json!({"tag": tag})), &QueryOptions::default())
                .await
                .unwrap();
        }
        let alice = PartitionKey::new("app", "notes", "alice");

        let found = ids(&manager, &alice, json!({"$or": [{"_owner": "bob"}, {"tag": "x"}]})).await;
        assert_eq!(found, vec!["a1", "b1"], "{label}: carol's record stays hidden");

        let found = ids(&manager, &alice, json!({"_owner": "alice", "$or": [{"_owner": "bob"}]})).await;
        assert!(found.is_empty(), "{label}: contradictory owners match nothing");

        let found = ids(&manager, &alice, json!({"_owner": "carol", "$or": [{"tag": "x"}, {"tag": "y"}]})).await;
        assert_eq!(found, vec!["c1"], "{label}: top-level owner scopes field branches");
    }
}

#[tokio::test]
async fn test_app_names_cannot_spill_into_another_apps_listing() {
    for (label, manager) in managers().await {
        let nested = PartitionKey::new("a__b", "c", "o");
        let err = manager
            .insert(&nested, None, entity(json!({"v": 1})), &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPartition(_)), "{label}: {err}");

        let key = PartitionKey::new("a", "c", "o");
        manager
            .insert(&key, None, entity(json!({"v": 1})), &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(manager.list_partition_names("a").await.unwrap(), vec!["c".to_string()], "{label}");
        assert!(matches!(
            manager.list_partition_names("a__b").await,
            Err(GatewayError::InvalidPartition(_))
        ));
    }
}
