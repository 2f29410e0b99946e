//! End-to-end engine tests against a real store file
//!
//! These exercise whole flows through the public store API: catalog
//! changes interleaved with instance writes, queries before and after
//! index changes, and reopening the database between steps.

use std::collections::BTreeSet;

use tempfile::TempDir;

use taskdesk::core::filter::{InstanceFilter, MatchToken};
use taskdesk::core::identity::EntityId;
use taskdesk::core::kind::{DataKind, PropertyValue};
use taskdesk::store::{IndexDeclaration, InstanceDraft, PropertyDraft, StoreError, TaskStore};

fn open(tmp: &TempDir) -> TaskStore {
    TaskStore::open_at(&tmp.path().join("engine.db")).unwrap()
}

fn seed_task(store: &mut TaskStore) -> EntityId {
    store.create_task("acme", "onboarding", "ana").unwrap().id
}

fn filter(property: &str, token: MatchToken) -> InstanceFilter {
    let mut filter = InstanceFilter::new();
    filter.add_token(property, token);
    filter
}

fn draft(values: &[(&str, PropertyValue)]) -> InstanceDraft {
    let mut draft = InstanceDraft::new();
    for (name, value) in values {
        draft = draft.value(*name, value.clone());
    }
    draft
}

fn matching_ids(store: &TaskStore, task: &EntityId, filter: &InstanceFilter) -> BTreeSet<String> {
    store
        .query_instances(task, filter)
        .unwrap()
        .instances
        .into_iter()
        .map(|record| record.id.to_string())
        .collect()
}

#[test]
fn test_index_changes_never_change_query_results() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let task = seed_task(&mut store);

    store
        .add_property(&task, PropertyDraft::new("status", DataKind::Text), "ana")
        .unwrap();
    store
        .add_property(
            &task,
            PropertyDraft::new("priority", DataKind::Integer),
            "ana",
        )
        .unwrap();

    for (status, priority) in [("open", 1), ("open", 2), ("closed", 2), ("blocked", 3)] {
        store
            .create_instance(
                &task,
                draft(&[
                    ("status", PropertyValue::Text(status.to_string())),
                    ("priority", PropertyValue::Integer(priority)),
                ]),
                "ana",
            )
            .unwrap();
    }

    let by_status = filter("status", MatchToken::Equals("open".to_string()));
    let by_priority = filter("priority", MatchToken::Equals("2".to_string()));

    let status_before = matching_ids(&store, &task, &by_status);
    let priority_before = matching_ids(&store, &task, &by_priority);
    assert_eq!(status_before.len(), 2);
    assert_eq!(priority_before.len(), 2);

    // Same questions with indexes in place
    let index = store
        .create_index(
            &task,
            "triage",
            &["status".to_string(), "priority".to_string()],
            "ana",
        )
        .unwrap();
    assert_eq!(matching_ids(&store, &task, &by_status), status_before);
    assert_eq!(matching_ids(&store, &task, &by_priority), priority_before);

    // And again after the index is gone
    store.delete_index(&task, &index.id).unwrap();
    assert_eq!(matching_ids(&store, &task, &by_status), status_before);
    assert_eq!(matching_ids(&store, &task, &by_priority), priority_before);
}

#[test]
fn test_unknown_property_is_rejected_not_empty() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let task = seed_task(&mut store);

    let err = store
        .count_instances(&task, &filter("ghost", MatchToken::Equals("x".into())))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownProperty { .. }));
}

#[test]
fn test_retype_with_live_data_migrates_and_requeries() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let task = seed_task(&mut store);

    let score = store
        .add_property(&task, PropertyDraft::new("score", DataKind::Text), "ana")
        .unwrap();
    store
        .add_property(&task, PropertyDraft::new("status", DataKind::Text), "ana")
        .unwrap();
    store
        .create_index(
            &task,
            "combo",
            &["score".to_string(), "status".to_string()],
            "ana",
        )
        .unwrap();

    let a = store
        .create_instance(
            &task,
            draft(&[("score", PropertyValue::Text("42".to_string()))]),
            "ana",
        )
        .unwrap();
    store
        .create_instance(
            &task,
            draft(&[("score", PropertyValue::Text("not a number".to_string()))]),
            "ana",
        )
        .unwrap();

    store
        .retype_property(&task, &score.id, DataKind::Integer, "ana")
        .unwrap();

    // CAST of '42' keeps the number; the unparsable one becomes 0
    let hits = matching_ids(
        &store,
        &task,
        &filter("score", MatchToken::Equals("42".to_string())),
    );
    assert_eq!(hits, BTreeSet::from([a.id.to_string()]));

    // The shared index survives with the other member intact
    let indexes = store.indexes(&task).unwrap();
    assert_eq!(indexes.len(), 1);
    assert!(indexes[0].properties.iter().any(|p| p.name == "status"));

    // Reading the instance back shows the migrated kind
    let record = store.instance(&task, &a.id).unwrap();
    assert_eq!(record.value("score"), Some(&PropertyValue::Integer(42)));
}

#[test]
fn test_identifiable_across_delete_and_recover() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let task = seed_task(&mut store);

    store
        .add_property(
            &task,
            PropertyDraft::new("email", DataKind::Text).identifiable(true),
            "ana",
        )
        .unwrap();

    let value = || PropertyValue::Text("kim@example.com".to_string());
    let first = store
        .create_instance(&task, draft(&[("email", value())]), "ana")
        .unwrap();

    // Live collision
    let err = store
        .create_instance(&task, draft(&[("email", value())]), "bob")
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    // Recycled collision is reported differently so the caller knows
    // recovery is the way out
    store.delete_instance(&task, &first.id, "ana").unwrap();
    let err = store
        .create_instance(&task, draft(&[("email", value())]), "bob")
        .unwrap_err();
    assert!(matches!(err, StoreError::Gone { .. }));

    // Recovery restores the value and the uniqueness claim
    store.recover_instance(&task, &first.id, "ana").unwrap();
    let err = store
        .create_instance(&task, draft(&[("email", value())]), "bob")
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[test]
fn test_identifiable_is_scoped_per_task() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let first = seed_task(&mut store);
    let second = store.create_task("acme", "offboarding", "ana").unwrap().id;

    for task in [&first, &second] {
        store
            .add_property(
                task,
                PropertyDraft::new("email", DataKind::Text).identifiable(true),
                "ana",
            )
            .unwrap();
    }

    let value = PropertyValue::Text("kim@example.com".to_string());
    store
        .create_instance(&first, draft(&[("email", value.clone())]), "ana")
        .unwrap();
    // Same value under the sibling task is fine
    store
        .create_instance(&second, draft(&[("email", value)]), "ana")
        .unwrap();
}

#[test]
fn test_queries_are_isolated_per_task() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let first = seed_task(&mut store);
    let second = store.create_task("globex", "intake", "ana").unwrap().id;

    for task in [&first, &second] {
        store
            .add_property(task, PropertyDraft::new("status", DataKind::Text), "ana")
            .unwrap();
    }
    store
        .create_instance(
            &first,
            draft(&[("status", PropertyValue::Text("open".into()))]),
            "ana",
        )
        .unwrap();
    store
        .create_instance(
            &second,
            draft(&[("status", PropertyValue::Text("open".into()))]),
            "ana",
        )
        .unwrap();

    let open = filter("status", MatchToken::Equals("open".into()));
    assert_eq!(store.count_instances(&first, &open).unwrap(), 1);
    assert_eq!(store.count_instances(&second, &open).unwrap(), 1);
}

#[test]
fn test_declarative_apply_reconciles_and_reports() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let task = seed_task(&mut store);

    for name in ["status", "owner", "stage"] {
        store
            .add_property(&task, PropertyDraft::new(name, DataKind::Text), "ana")
            .unwrap();
    }

    let declare = |pairs: &[(&str, &[&str])]| -> Vec<IndexDeclaration> {
        pairs
            .iter()
            .map(|(name, props)| IndexDeclaration {
                name: name.to_string(),
                properties: props.iter().map(|s| s.to_string()).collect(),
            })
            .collect()
    };

    let outcome = store
        .save_indexes(
            &task,
            &declare(&[("by-status", &["status"]), ("by-owner", &["owner"])]),
            "ana",
        )
        .unwrap();
    assert_eq!(outcome.created, vec!["by-status", "by-owner"]);
    assert!(outcome.updated.is_empty() && outcome.removed.is_empty());

    // Swap one index's members, drop the other, add a third
    let outcome = store
        .save_indexes(
            &task,
            &declare(&[("by-status", &["status", "stage"]), ("by-stage", &["stage"])]),
            "ana",
        )
        .unwrap();
    assert_eq!(outcome.created, vec!["by-stage"]);
    assert_eq!(outcome.updated, vec!["by-status"]);
    assert_eq!(outcome.removed, vec!["by-owner"]);

    // Unchanged declarations are a no-op
    let outcome = store
        .save_indexes(
            &task,
            &declare(&[("by-status", &["status", "stage"]), ("by-stage", &["stage"])]),
            "ana",
        )
        .unwrap();
    assert!(outcome.is_noop());
}

#[test]
fn test_paging_agrees_with_count_across_pages() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(&tmp);
    let task = seed_task(&mut store);

    store
        .add_property(&task, PropertyDraft::new("status", DataKind::Text), "ana")
        .unwrap();
    for i in 0..7 {
        store
            .create_instance(
                &task,
                draft(&[("status", PropertyValue::Text(format!("open-{i}")))]),
                "ana",
            )
            .unwrap();
    }

    let mut seen = BTreeSet::new();
    let mut offset = 0;
    loop {
        let mut page_filter = filter("status", MatchToken::Contains("open".into()));
        page_filter.limit = Some(3);
        page_filter.offset = offset;
        let page = store.query_instances(&task, &page_filter).unwrap();
        assert_eq!(page.total, 7);
        if page.instances.is_empty() {
            break;
        }
        offset += page.instances.len() as i64;
        for record in page.instances {
            assert!(seen.insert(record.id.to_string()), "row repeated across pages");
        }
    }
    assert_eq!(seen.len(), 7);
}

#[test]
fn test_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let task;
    {
        let mut store = open(&tmp);
        task = seed_task(&mut store);
        store
            .add_property(
                &task,
                PropertyDraft::new("tags", DataKind::TextList),
                "ana",
            )
            .unwrap();
        store
            .create_index(&task, "by-tags", &["tags".to_string()], "ana")
            .unwrap();
        store
            .create_instance(
                &task,
                draft(&[(
                    "tags",
                    PropertyValue::TextList(vec!["red".into(), "blue".into()]),
                )]),
                "ana",
            )
            .unwrap();
    }

    let store = open(&tmp);
    assert_eq!(store.tasks().unwrap().len(), 1);
    assert_eq!(
        store
            .count_instances(&task, &filter("tags", MatchToken::Equals("blue".into())))
            .unwrap(),
        1
    );

    let stats = store.stats().unwrap();
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.indexes, 1);
    assert_eq!(stats.list_values, 2);
}
