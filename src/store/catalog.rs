//! Index catalog: create, patch, delete, retrieve, and declarative save
//!
//! The catalog validates index definitions, keeps the membership rows,
//! and publishes lifecycle events; it never touches the typed value
//! tables itself.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::TaskStore;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::store::error::{StoreError, StoreResult};
use crate::store::events::{self, PropertyEvent};
use crate::store::tasks;
use crate::store::types::{ensure_prefix, parse_datetime, IndexDeclaration, Property, SaveOutcome, TaskIndex};

impl TaskStore {
    /// Create an index over one or more member properties
    pub fn create_index(
        &mut self,
        task_id: &EntityId,
        name: &str,
        property_names: &[String],
        actor: &str,
    ) -> StoreResult<TaskIndex> {
        let tx = self.conn.transaction()?;
        let index = create_index_tx(&tx, task_id, name, property_names, actor)?;
        tx.commit()?;
        Ok(index)
    }

    /// Rename an index and/or swap its member set
    pub fn patch_index(
        &mut self,
        task_id: &EntityId,
        index_id: &EntityId,
        new_name: Option<&str>,
        new_properties: Option<&[String]>,
        actor: &str,
    ) -> StoreResult<TaskIndex> {
        let tx = self.conn.transaction()?;
        let index = patch_index_tx(&tx, task_id, index_id, new_name, new_properties, actor)?;
        tx.commit()?;
        Ok(index)
    }

    /// Delete an index; member properties are only torn down if no
    /// other index still references them
    pub fn delete_index(&mut self, task_id: &EntityId, index_id: &EntityId) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        delete_index_tx(&tx, task_id, index_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Retrieve one index with members resolved
    pub fn index(&self, task_id: &EntityId, index_id: &EntityId) -> StoreResult<TaskIndex> {
        ensure_prefix(index_id, EntityPrefix::Idx)?;
        get_index(&self.conn, task_id, index_id)?.ok_or_else(|| StoreError::NotFound {
            noun: "index",
            id: index_id.to_string(),
        })
    }

    /// All indexes of a task, ordered by name
    pub fn indexes(&self, task_id: &EntityId) -> StoreResult<Vec<TaskIndex>> {
        tasks::require_task(&self.conn, task_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id FROM task_indexes WHERE task_id = ?1 ORDER BY name",
        )?;
        let ids = stmt
            .query_map(params![task_id], |row| row.get::<_, EntityId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut indexes = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(index) = get_index(&self.conn, task_id, id)? {
                indexes.push(index);
            }
        }
        Ok(indexes)
    }

    /// Reconcile the task's indexes against a declared desired set.
    ///
    /// Matched by name: missing declarations are created, matching
    /// ones are patched to the declared member set, and indexes absent
    /// from the declarations are deleted. The whole plan is computed
    /// and validated before the first mutation.
    pub fn save_indexes(
        &mut self,
        task_id: &EntityId,
        declarations: &[IndexDeclaration],
        actor: &str,
    ) -> StoreResult<SaveOutcome> {
        let tx = self.conn.transaction()?;
        let outcome = save_indexes_tx(&tx, task_id, declarations, actor)?;
        tx.commit()?;
        Ok(outcome)
    }
}

// =========================================================================
// Transaction Bodies
// =========================================================================

pub(crate) fn create_index_tx(
    conn: &Connection,
    task_id: &EntityId,
    name: &str,
    property_names: &[String],
    actor: &str,
) -> StoreResult<TaskIndex> {
    tasks::require_task(conn, task_id)?;

    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::NameRequired { entity: "index" });
    }

    let members = resolve_members(conn, task_id, property_names)?;
    ensure_name_free(conn, task_id, name)?;

    let index_id = EntityId::new(EntityPrefix::Idx);
    let now = Utc::now();
    let inserted = conn.execute(
        "INSERT INTO task_indexes (id, task_id, name, created_by, created_at, updated_by, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?4, ?5)",
        params![index_id, task_id, name, actor, now.to_rfc3339()],
    )?;
    if inserted != 1 {
        return Err(StoreError::internal(format!(
            "index insert affected {inserted} rows"
        )));
    }

    for (position, member) in members.iter().enumerate() {
        let inserted = conn.execute(
            "INSERT INTO index_members (index_id, property_id, position) VALUES (?1, ?2, ?3)",
            params![index_id, member.id, position as i64],
        )?;
        if inserted != 1 {
            return Err(StoreError::internal(format!(
                "membership insert affected {inserted} rows"
            )));
        }
    }

    for member in &members {
        events::publish(conn, PropertyEvent::Indexed { property: member })?;
    }

    Ok(TaskIndex {
        id: index_id,
        task_id: task_id.clone(),
        name: name.to_string(),
        properties: members,
        created_by: actor.to_string(),
        created_at: now,
        updated_by: actor.to_string(),
        updated_at: now,
    })
}

pub(crate) fn patch_index_tx(
    conn: &Connection,
    task_id: &EntityId,
    index_id: &EntityId,
    new_name: Option<&str>,
    new_properties: Option<&[String]>,
    actor: &str,
) -> StoreResult<TaskIndex> {
    ensure_prefix(index_id, EntityPrefix::Idx)?;
    let current = get_index(conn, task_id, index_id)?.ok_or_else(|| StoreError::NotFound {
        noun: "index",
        id: index_id.to_string(),
    })?;

    let name = match new_name {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(StoreError::NameRequired { entity: "index" });
            }
            if trimmed != current.name {
                ensure_name_free(conn, task_id, trimmed)?;
            }
            trimmed.to_string()
        }
        None => current.name.clone(),
    };

    let mut added: Vec<Property> = Vec::new();
    let mut removed: Vec<EntityId> = Vec::new();

    if let Some(property_names) = new_properties {
        let desired = resolve_members(conn, task_id, property_names)?;
        let current_ids = member_ids(conn, index_id)?;
        let desired_ids: BTreeSet<EntityId> = desired.iter().map(|p| p.id.clone()).collect();

        for member in &desired {
            if !current_ids.contains(&member.id) {
                added.push(member.clone());
            }
        }
        for member_id in &current_ids {
            if !desired_ids.contains(member_id) {
                removed.push(member_id.clone());
            }
        }

        // Upsert keeps retained members and refreshes declaration order
        let mut upsert = conn.prepare(
            "INSERT INTO index_members (index_id, property_id, position) VALUES (?1, ?2, ?3) \
             ON CONFLICT(index_id, property_id) DO UPDATE SET position = excluded.position",
        )?;
        for (position, member) in desired.iter().enumerate() {
            upsert.execute(params![index_id, member.id, position as i64])?;
        }
        for member_id in &removed {
            let deleted = conn.execute(
                "DELETE FROM index_members WHERE index_id = ?1 AND property_id = ?2",
                params![index_id, member_id],
            )?;
            if deleted != 1 {
                return Err(StoreError::internal(format!(
                    "membership delete affected {deleted} rows"
                )));
            }
        }
    }

    let now = Utc::now();
    let updated = conn.execute(
        "UPDATE task_indexes SET name = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, actor, now.to_rfc3339(), index_id],
    )?;
    if updated != 1 {
        return Err(StoreError::internal(format!(
            "index update affected {updated} rows"
        )));
    }

    for member in &added {
        events::publish(conn, PropertyEvent::Indexed { property: member })?;
    }
    for member_id in &removed {
        events::publish(conn, PropertyEvent::Unindexed { property_id: member_id })?;
    }

    get_index(conn, task_id, index_id)?.ok_or_else(|| {
        StoreError::internal(format!("index {index_id} vanished during patch"))
    })
}

pub(crate) fn delete_index_tx(
    conn: &Connection,
    task_id: &EntityId,
    index_id: &EntityId,
) -> StoreResult<()> {
    ensure_prefix(index_id, EntityPrefix::Idx)?;
    if get_index_row(conn, task_id, index_id)?.is_none() {
        return Err(StoreError::NotFound {
            noun: "index",
            id: index_id.to_string(),
        });
    }

    let members = member_ids(conn, index_id)?;
    drop_index_rows(conn, index_id)?;

    for member_id in &members {
        events::publish(conn, PropertyEvent::Unindexed { property_id: member_id })?;
    }
    Ok(())
}

pub(crate) fn save_indexes_tx(
    conn: &Connection,
    task_id: &EntityId,
    declarations: &[IndexDeclaration],
    actor: &str,
) -> StoreResult<SaveOutcome> {
    tasks::require_task(conn, task_id)?;

    // Validate the whole plan before the first mutation
    let mut seen = BTreeSet::new();
    let mut plan = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        let name = declaration.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::NameRequired { entity: "index" });
        }
        if !seen.insert(name.clone()) {
            return Err(StoreError::DuplicateName {
                entity: "index",
                name,
            });
        }
        let members = resolve_members(conn, task_id, &declaration.properties)?;
        plan.push((name, members, &declaration.properties));
    }

    let mut current: Vec<(EntityId, String)> = Vec::new();
    let mut stmt =
        conn.prepare("SELECT id, name FROM task_indexes WHERE task_id = ?1 ORDER BY name")?;
    let rows = stmt.query_map(params![task_id], |row| {
        Ok((row.get::<_, EntityId>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        current.push(row?);
    }

    let mut outcome = SaveOutcome::default();

    // Creates and updates
    for (name, members, property_names) in &plan {
        match current.iter().find(|(_, n)| n == name) {
            None => {
                create_index_tx(conn, task_id, name, property_names, actor)?;
                outcome.created.push(name.clone());
            }
            Some((index_id, _)) => {
                let current_members = member_ids(conn, index_id)?;
                let desired: Vec<EntityId> = members.iter().map(|p| p.id.clone()).collect();
                if current_members == desired {
                    continue;
                }
                patch_index_tx(conn, task_id, index_id, None, Some(property_names), actor)?;
                outcome.updated.push(name.clone());
            }
        }
    }

    // Removals: indexes absent from the declarations
    for (index_id, name) in &current {
        if !plan.iter().any(|(n, _, _)| n == name) {
            delete_index_tx(conn, task_id, index_id)?;
            outcome.removed.push(name.clone());
        }
    }

    Ok(outcome)
}

// =========================================================================
// Membership Queries
// =========================================================================

/// Is this property currently a member of any index?
pub(crate) fn is_property_member(conn: &Connection, property_id: &EntityId) -> StoreResult<bool> {
    let member: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM index_members WHERE property_id = ?1)",
        params![property_id],
        |row| row.get(0),
    )?;
    Ok(member)
}

/// Every index referencing a property, with that index's total member
/// count (for the lone-member cascade).
pub(crate) fn indexes_referencing(
    conn: &Connection,
    property_id: &EntityId,
) -> StoreResult<Vec<(EntityId, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT im.index_id, \
                (SELECT COUNT(*) FROM index_members m2 WHERE m2.index_id = im.index_id) \
         FROM index_members im WHERE im.property_id = ?1",
    )?;
    let rows = stmt.query_map(params![property_id], |row| {
        Ok((row.get::<_, EntityId>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Remove an index and its membership rows without emitting events.
pub(crate) fn drop_index_rows(conn: &Connection, index_id: &EntityId) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM index_members WHERE index_id = ?1",
        params![index_id],
    )?;
    let deleted = conn.execute(
        "DELETE FROM task_indexes WHERE id = ?1",
        params![index_id],
    )?;
    if deleted != 1 {
        return Err(StoreError::internal(format!(
            "index delete affected {deleted} rows"
        )));
    }
    Ok(())
}

// =========================================================================
// Internals
// =========================================================================

/// Resolve declared member names to property records, case-insensitive
/// and order-preserving with duplicates dropped.
fn resolve_members(
    conn: &Connection,
    task_id: &EntityId,
    property_names: &[String],
) -> StoreResult<Vec<Property>> {
    let mut seen = BTreeSet::new();
    let mut members = Vec::new();
    for raw in property_names {
        let name = raw.trim();
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        let property = tasks::find_property_by_name(conn, task_id, name)?.ok_or_else(|| {
            StoreError::UnknownProperty {
                name: raw.clone(),
            }
        })?;
        if !property.kind.is_indexable() {
            return Err(StoreError::NotIndexable {
                name: property.name.clone(),
                kind: property.kind,
            });
        }
        members.push(property);
    }
    if members.is_empty() {
        return Err(StoreError::PropertyRequired);
    }
    Ok(members)
}

fn ensure_name_free(conn: &Connection, task_id: &EntityId, name: &str) -> StoreResult<()> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_indexes WHERE task_id = ?1 AND name = ?2)",
        params![task_id, name],
        |row| row.get(0),
    )?;
    if taken {
        return Err(StoreError::DuplicateName {
            entity: "index",
            name: name.to_string(),
        });
    }
    Ok(())
}

struct IndexRow {
    id: EntityId,
    name: String,
    created_by: String,
    created_at: String,
    updated_by: String,
    updated_at: String,
}

fn get_index_row(
    conn: &Connection,
    task_id: &EntityId,
    index_id: &EntityId,
) -> StoreResult<Option<IndexRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, created_by, created_at, updated_by, updated_at \
             FROM task_indexes WHERE task_id = ?1 AND id = ?2",
            params![task_id, index_id],
            |row| {
                Ok(IndexRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_by: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_by: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Member property ids in declaration order
fn member_ids(conn: &Connection, index_id: &EntityId) -> StoreResult<Vec<EntityId>> {
    let mut stmt = conn.prepare(
        "SELECT property_id FROM index_members WHERE index_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![index_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Load an index with member properties resolved. A membership row
/// whose property no longer exists is reported and omitted instead of
/// failing the read.
fn get_index(
    conn: &Connection,
    task_id: &EntityId,
    index_id: &EntityId,
) -> StoreResult<Option<TaskIndex>> {
    let Some(row) = get_index_row(conn, task_id, index_id)? else {
        return Ok(None);
    };

    let mut properties = Vec::new();
    for member_id in member_ids(conn, &row.id)? {
        match tasks::get_property(conn, task_id, &member_id)? {
            Some(property) => properties.push(property),
            None => {
                tracing::warn!(
                    index = %row.id,
                    property = %member_id,
                    "index member references a property that no longer exists"
                );
            }
        }
    }

    Ok(Some(TaskIndex {
        id: row.id,
        task_id: task_id.clone(),
        name: row.name,
        properties,
        created_by: row.created_by,
        created_at: parse_datetime(&row.created_at),
        updated_by: row.updated_by,
        updated_at: parse_datetime(&row.updated_at),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kind::DataKind;
    use crate::store::types::PropertyDraft;

    fn store_with_task() -> (TaskStore, EntityId) {
        let mut store = TaskStore::open_in_memory().unwrap();
        let task = store.create_task("tenant-a", "orders", "ana").unwrap();
        (store, task.id)
    }

    fn text_prop(store: &mut TaskStore, task: &EntityId, name: &str) -> Property {
        store
            .add_property(task, PropertyDraft::new(name, DataKind::Text), "ana")
            .unwrap()
    }

    #[test]
    fn test_create_index_requires_name_and_members() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "status");

        let err = store
            .create_index(&task, "  ", &["status".to_string()], "ana")
            .unwrap_err();
        assert!(matches!(err, StoreError::NameRequired { .. }));

        let err = store.create_index(&task, "by-status", &[], "ana").unwrap_err();
        assert!(matches!(err, StoreError::PropertyRequired));
    }

    #[test]
    fn test_create_index_rejects_unknown_and_boolean_members() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "status");
        store
            .add_property(&task, PropertyDraft::new("urgent", DataKind::Boolean), "ana")
            .unwrap();

        let err = store
            .create_index(&task, "bad", &["missing".to_string()], "ana")
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownProperty { .. }));

        let err = store
            .create_index(&task, "bad", &["urgent".to_string()], "ana")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotIndexable { .. }));
    }

    #[test]
    fn test_create_index_rejects_duplicate_name() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "status");
        store
            .create_index(&task, "by-status", &["status".to_string()], "ana")
            .unwrap();
        let err = store
            .create_index(&task, "by-status", &["status".to_string()], "ana")
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName { .. }));
    }

    #[test]
    fn test_member_name_resolution_is_case_insensitive() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "Status");
        let index = store
            .create_index(&task, "by-status", &["STATUS".to_string()], "ana")
            .unwrap();
        assert_eq!(index.properties.len(), 1);
        assert_eq!(index.properties[0].name, "Status");
    }

    #[test]
    fn test_patch_swaps_members_and_keeps_order() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "status");
        text_prop(&mut store, &task, "owner");
        text_prop(&mut store, &task, "region");

        let index = store
            .create_index(
                &task,
                "combo",
                &["status".to_string(), "owner".to_string()],
                "ana",
            )
            .unwrap();

        let patched = store
            .patch_index(
                &task,
                &index.id,
                None,
                Some(&["region".to_string(), "status".to_string()]),
                "ana",
            )
            .unwrap();
        let names: Vec<&str> = patched.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["region", "status"]);
    }

    #[test]
    fn test_delete_keeps_rows_of_shared_members() {
        let (mut store, task) = store_with_task();
        let status = text_prop(&mut store, &task, "status");
        store
            .create_index(&task, "one", &["status".to_string()], "ana")
            .unwrap();
        let two = store
            .create_index(&task, "two", &["status".to_string()], "ana")
            .unwrap();

        // No instances yet, so row counts stay 0; membership is what matters
        store.delete_index(&task, &two.id).unwrap();
        assert!(is_property_member(&store.conn, &status.id).unwrap());

        let remaining = store.indexes(&task).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "one");
    }

    #[test]
    fn test_get_unknown_index_not_found() {
        let (store, task) = store_with_task();
        let ghost = EntityId::new(EntityPrefix::Idx);
        let err = store.index(&task, &ghost).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { noun: "index", .. }));

        let wrong = EntityId::new(EntityPrefix::Prop);
        let err = store.index(&task, &wrong).unwrap_err();
        assert!(matches!(err, StoreError::InvalidId { .. }));
    }

    #[test]
    fn test_save_reconciles_by_name() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "status");
        text_prop(&mut store, &task, "owner");
        store
            .create_index(&task, "keep", &["status".to_string()], "ana")
            .unwrap();
        store
            .create_index(&task, "drop", &["owner".to_string()], "ana")
            .unwrap();

        let declarations = vec![
            IndexDeclaration {
                name: "keep".to_string(),
                properties: vec!["status".to_string(), "owner".to_string()],
            },
            IndexDeclaration {
                name: "new".to_string(),
                properties: vec!["owner".to_string()],
            },
        ];
        let outcome = store.save_indexes(&task, &declarations, "ana").unwrap();
        assert_eq!(outcome.created, vec!["new".to_string()]);
        assert_eq!(outcome.updated, vec!["keep".to_string()]);
        assert_eq!(outcome.removed, vec!["drop".to_string()]);

        // Re-applying the same declarations is a no-op
        let outcome = store.save_indexes(&task, &declarations, "ana").unwrap();
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_save_validates_before_mutating() {
        let (mut store, task) = store_with_task();
        text_prop(&mut store, &task, "status");
        store
            .create_index(&task, "keep", &["status".to_string()], "ana")
            .unwrap();

        let declarations = vec![IndexDeclaration {
            name: "broken".to_string(),
            properties: vec!["missing".to_string()],
        }];
        let err = store.save_indexes(&task, &declarations, "ana").unwrap_err();
        assert!(matches!(err, StoreError::UnknownProperty { .. }));

        // The plan failed validation, so nothing was deleted
        assert_eq!(store.indexes(&task).unwrap().len(), 1);
    }
}
