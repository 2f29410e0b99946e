//! Task, placement, and property administration
//!
//! Property administration owns the wide-row slot assignments and the
//! canonical side effects of retypes and deletes. Index maintenance is
//! delegated entirely to lifecycle events.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::TaskStore;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::kind::DataKind;
use crate::store::error::{StoreError, StoreResult};
use crate::store::events::{self, PropertyEvent};
use crate::store::schema::SLOTS_PER_KIND;
use crate::store::types::{
    ensure_prefix, join_categories, parse_datetime, Property, PropertyDraft, Task, TaskSource,
    TaskType, PROPERTY_COLUMNS,
};
use crate::store::values;

impl TaskStore {
    /// Create a task container for a tenant
    pub fn create_task(&mut self, tenant: &str, name: &str, actor: &str) -> StoreResult<Task> {
        let tenant = tenant.trim();
        if tenant.is_empty() {
            return Err(StoreError::NameRequired { entity: "tenant" });
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::NameRequired { entity: "task" });
        }

        let task = Task {
            id: EntityId::new(EntityPrefix::Task),
            tenant: tenant.to_string(),
            name: name.to_string(),
            created_by: actor.to_string(),
            created_at: Utc::now(),
        };
        let inserted = self.conn.execute(
            "INSERT INTO tasks (id, tenant, name, created_by, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.id,
                task.tenant,
                task.name,
                task.created_by,
                task.created_at.to_rfc3339()
            ],
        )?;
        if inserted != 1 {
            return Err(StoreError::internal(format!(
                "task insert affected {inserted} rows"
            )));
        }
        Ok(task)
    }

    pub fn task(&self, task_id: &EntityId) -> StoreResult<Task> {
        ensure_prefix(task_id, EntityPrefix::Task)?;
        get_task(&self.conn, task_id)?.ok_or_else(|| StoreError::NotFound {
            noun: "task",
            id: task_id.to_string(),
        })
    }

    /// All tasks across tenants, grouped by tenant then name
    pub fn tasks(&self) -> StoreResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant, name, created_by, created_at FROM tasks ORDER BY tenant, name",
        )?;
        let rows = stmt.query_map([], task_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Register a type placement target on a task
    pub fn create_type(
        &mut self,
        task_id: &EntityId,
        name: &str,
        actor: &str,
    ) -> StoreResult<TaskType> {
        let tx = self.conn.transaction()?;
        let created = create_placement_tx(&tx, task_id, name, actor, PlacementAxis::Type)?;
        tx.commit()?;
        Ok(TaskType {
            id: created.id,
            task_id: created.task_id,
            name: created.name,
            created_by: created.created_by,
            created_at: created.created_at,
        })
    }

    pub fn types(&self, task_id: &EntityId) -> StoreResult<Vec<TaskType>> {
        require_task(&self.conn, task_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, name, created_by, created_at FROM task_types \
             WHERE task_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok(TaskType {
                id: row.get(0)?,
                task_id: row.get(1)?,
                name: row.get(2)?,
                created_by: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Register a source placement target on a task
    pub fn create_source(
        &mut self,
        task_id: &EntityId,
        name: &str,
        actor: &str,
    ) -> StoreResult<TaskSource> {
        let tx = self.conn.transaction()?;
        let created = create_placement_tx(&tx, task_id, name, actor, PlacementAxis::Source)?;
        tx.commit()?;
        Ok(TaskSource {
            id: created.id,
            task_id: created.task_id,
            name: created.name,
            created_by: created.created_by,
            created_at: created.created_at,
        })
    }

    pub fn sources(&self, task_id: &EntityId) -> StoreResult<Vec<TaskSource>> {
        require_task(&self.conn, task_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, name, created_by, created_at FROM task_sources \
             WHERE task_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok(TaskSource {
                id: row.get(0)?,
                task_id: row.get(1)?,
                name: row.get(2)?,
                created_by: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Declare a property on a task, assigning its wide-row slot
    pub fn add_property(
        &mut self,
        task_id: &EntityId,
        draft: PropertyDraft,
        actor: &str,
    ) -> StoreResult<Property> {
        let tx = self.conn.transaction()?;
        let property = add_property_tx(&tx, task_id, draft, actor)?;
        tx.commit()?;
        Ok(property)
    }

    /// Change a property's data kind, migrating canonical values and
    /// rebuilding derived index rows
    pub fn retype_property(
        &mut self,
        task_id: &EntityId,
        property_id: &EntityId,
        new_kind: DataKind,
        actor: &str,
    ) -> StoreResult<Property> {
        let tx = self.conn.transaction()?;
        let property = retype_property_tx(&tx, task_id, property_id, new_kind, actor)?;
        tx.commit()?;
        Ok(property)
    }

    /// Delete a property permanently, including its canonical values
    pub fn delete_property(
        &mut self,
        task_id: &EntityId,
        property_id: &EntityId,
    ) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        delete_property_tx(&tx, task_id, property_id)?;
        tx.commit()?;
        Ok(())
    }

    pub fn property(&self, task_id: &EntityId, property_id: &EntityId) -> StoreResult<Property> {
        ensure_prefix(property_id, EntityPrefix::Prop)?;
        get_property(&self.conn, task_id, property_id)?.ok_or_else(|| StoreError::NotFound {
            noun: "property",
            id: property_id.to_string(),
        })
    }

    pub fn properties(&self, task_id: &EntityId) -> StoreResult<Vec<Property>> {
        require_task(&self.conn, task_id)?;
        properties_for_task(&self.conn, task_id)
    }
}

// =========================================================================
// Transaction Bodies
// =========================================================================

enum PlacementAxis {
    Type,
    Source,
}

impl PlacementAxis {
    fn table(&self) -> &'static str {
        match self {
            PlacementAxis::Type => "task_types",
            PlacementAxis::Source => "task_sources",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            PlacementAxis::Type => "type",
            PlacementAxis::Source => "source",
        }
    }

    fn prefix(&self) -> EntityPrefix {
        match self {
            PlacementAxis::Type => EntityPrefix::Type,
            PlacementAxis::Source => EntityPrefix::Src,
        }
    }
}

struct PlacementRow {
    id: EntityId,
    task_id: EntityId,
    name: String,
    created_by: String,
    created_at: chrono::DateTime<Utc>,
}

fn create_placement_tx(
    conn: &Connection,
    task_id: &EntityId,
    name: &str,
    actor: &str,
    axis: PlacementAxis,
) -> StoreResult<PlacementRow> {
    require_task(conn, task_id)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::NameRequired { entity: axis.noun() });
    }
    let table = axis.table();
    let taken: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE task_id = ?1 AND name = ?2)"),
        params![task_id, name],
        |row| row.get(0),
    )?;
    if taken {
        return Err(StoreError::DuplicateName {
            entity: axis.noun(),
            name: name.to_string(),
        });
    }

    let row = PlacementRow {
        id: EntityId::new(axis.prefix()),
        task_id: task_id.clone(),
        name: name.to_string(),
        created_by: actor.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        &format!(
            "INSERT INTO {table} (id, task_id, name, created_by, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![
            row.id,
            row.task_id,
            row.name,
            row.created_by,
            row.created_at.to_rfc3339()
        ],
    )?;
    Ok(row)
}

pub(crate) fn add_property_tx(
    conn: &Connection,
    task_id: &EntityId,
    draft: PropertyDraft,
    actor: &str,
) -> StoreResult<Property> {
    require_task(conn, task_id)?;

    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(StoreError::NameRequired { entity: "property" });
    }
    // NOCASE column collation makes this check case-insensitive
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_properties WHERE task_id = ?1 AND name = ?2)",
        params![task_id, name],
        |row| row.get(0),
    )?;
    if taken {
        return Err(StoreError::DuplicateName {
            entity: "property",
            name,
        });
    }

    let sequence = if draft.kind.column_family().is_some() {
        allocate_slot(conn, task_id, draft.kind)?
    } else {
        0
    };

    let now = Utc::now();
    let property = Property {
        id: EntityId::new(EntityPrefix::Prop),
        task_id: task_id.clone(),
        name,
        kind: draft.kind,
        sequence,
        required: draft.required,
        identifiable: draft.identifiable,
        visibility: draft.visibility,
        display: draft.display,
        categories: draft.categories,
        created_by: actor.to_string(),
        created_at: now,
        updated_by: actor.to_string(),
        updated_at: now,
    };

    let display_raw = property
        .display
        .as_ref()
        .map(|d| serde_json::to_string(d))
        .transpose()
        .map_err(|e| StoreError::internal(format!("display column encoding failed: {e}")))?;

    let inserted = conn.execute(
        "INSERT INTO task_properties \
         (id, task_id, name, kind, sequence, required, identifiable, visibility, display, \
          categories, created_by, created_at, updated_by, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?11, ?12)",
        params![
            property.id,
            property.task_id,
            property.name,
            property.kind,
            property.sequence,
            property.required,
            property.identifiable,
            property.visibility,
            display_raw,
            join_categories(&property.categories),
            actor,
            now.to_rfc3339(),
        ],
    )?;
    if inserted != 1 {
        return Err(StoreError::internal(format!(
            "property insert affected {inserted} rows"
        )));
    }

    tracing::debug!(
        property = %property.id,
        name = %property.name,
        kind = %property.kind,
        sequence = property.sequence,
        "property declared"
    );
    Ok(property)
}

pub(crate) fn retype_property_tx(
    conn: &Connection,
    task_id: &EntityId,
    property_id: &EntityId,
    new_kind: DataKind,
    actor: &str,
) -> StoreResult<Property> {
    ensure_prefix(property_id, EntityPrefix::Prop)?;
    let property =
        get_property(conn, task_id, property_id)?.ok_or_else(|| StoreError::NotFound {
            noun: "property",
            id: property_id.to_string(),
        })?;

    if property.kind == new_kind {
        return Ok(property);
    }

    // Derived rows react before the canonical shape changes
    events::publish(
        conn,
        PropertyEvent::Modifying {
            property: &property,
            new_kind,
        },
    )?;

    let old_kind = property.kind;
    let new_sequence = match (old_kind.column_family(), new_kind.column_family()) {
        // scalar -> scalar: move the slot, migrating values when both
        // sides are plain text/number kinds
        (Some(_), Some(new_family)) => {
            let sequence = allocate_slot(conn, task_id, new_kind)?;
            let old_column = property.wide_column().ok_or_else(|| {
                StoreError::internal(format!("property {property_id} has no slot column"))
            })?;
            let new_column = format!("{new_family}_{sequence}");
            migrate_slot(conn, task_id, &old_column, &new_column, old_kind, new_kind)?;
            sequence
        }
        // scalar -> list: the slot empties out, elements start fresh
        (Some(_), None) => {
            let old_column = property.wide_column().ok_or_else(|| {
                StoreError::internal(format!("property {property_id} has no slot column"))
            })?;
            clear_slot(conn, task_id, &old_column)?;
            0
        }
        // list -> scalar: canonical elements go away, live and recycled
        (None, Some(_)) => {
            values::purge_list_values_for_property(conn, property_id)?;
            allocate_slot(conn, task_id, new_kind)?
        }
        (None, None) => {
            return Err(StoreError::internal(
                "retype between two list kinds is not defined".to_string(),
            ))
        }
    };

    let now = Utc::now();
    let updated = conn.execute(
        "UPDATE task_properties SET kind = ?1, sequence = ?2, updated_by = ?3, updated_at = ?4 \
         WHERE id = ?5",
        params![new_kind, new_sequence, actor, now.to_rfc3339(), property_id],
    )?;
    if updated != 1 {
        return Err(StoreError::internal(format!(
            "property update affected {updated} rows"
        )));
    }

    let mut retyped = property;
    retyped.kind = new_kind;
    retyped.sequence = new_sequence;
    retyped.updated_by = actor.to_string();
    retyped.updated_at = now;

    events::publish(
        conn,
        PropertyEvent::Modified {
            property: &retyped,
            old_kind,
        },
    )?;
    Ok(retyped)
}

pub(crate) fn delete_property_tx(
    conn: &Connection,
    task_id: &EntityId,
    property_id: &EntityId,
) -> StoreResult<()> {
    ensure_prefix(property_id, EntityPrefix::Prop)?;
    let property =
        get_property(conn, task_id, property_id)?.ok_or_else(|| StoreError::NotFound {
            noun: "property",
            id: property_id.to_string(),
        })?;

    events::publish(conn, PropertyEvent::Deleting { property: &property })?;

    if let Some(column) = property.wide_column() {
        clear_slot(conn, task_id, &column)?;
    } else {
        values::purge_list_values_for_property(conn, property_id)?;
    }

    let deleted = conn.execute(
        "DELETE FROM task_properties WHERE id = ?1",
        params![property_id],
    )?;
    if deleted != 1 {
        return Err(StoreError::internal(format!(
            "property delete affected {deleted} rows"
        )));
    }
    Ok(())
}

// =========================================================================
// Slot Management
// =========================================================================

/// Lowest free slot in a kind's column family
fn allocate_slot(conn: &Connection, task_id: &EntityId, kind: DataKind) -> StoreResult<i64> {
    let mut stmt = conn.prepare(
        "SELECT sequence FROM task_properties WHERE task_id = ?1 AND kind = ?2 ORDER BY sequence",
    )?;
    let taken = stmt
        .query_map(params![task_id, kind], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
    for slot in 1..=SLOTS_PER_KIND {
        if !taken.contains(&slot) {
            return Ok(slot);
        }
    }
    Err(StoreError::SlotsExhausted {
        kind,
        limit: SLOTS_PER_KIND,
    })
}

/// Move scalar values between slot columns, in the live and recycle
/// tables alike so a later recover cannot resurrect a stale slot.
/// Migration casts between text/integer/real; boolean on either side
/// drops the values instead.
fn migrate_slot(
    conn: &Connection,
    task_id: &EntityId,
    old_column: &str,
    new_column: &str,
    old_kind: DataKind,
    new_kind: DataKind,
) -> StoreResult<()> {
    let cast_target = match (old_kind, new_kind) {
        (DataKind::Boolean, _) | (_, DataKind::Boolean) => None,
        (_, DataKind::Text) => Some("TEXT"),
        (_, DataKind::Integer) => Some("INTEGER"),
        (_, DataKind::Real) => Some("REAL"),
        _ => None,
    };
    for table in ["task_instances", "task_instances_recycle"] {
        let sql = match cast_target {
            Some(sql_type) => format!(
                "UPDATE {table} SET {new_column} = CAST({old_column} AS {sql_type}), \
                 {old_column} = NULL WHERE task_id = ?1 AND {old_column} IS NOT NULL"
            ),
            None => format!(
                "UPDATE {table} SET {old_column} = NULL \
                 WHERE task_id = ?1 AND {old_column} IS NOT NULL"
            ),
        };
        conn.execute(&sql, params![task_id])?;
    }
    Ok(())
}

/// Null out a slot column in the live and recycle tables
fn clear_slot(conn: &Connection, task_id: &EntityId, column: &str) -> StoreResult<()> {
    for table in ["task_instances", "task_instances_recycle"] {
        conn.execute(
            &format!("UPDATE {table} SET {column} = NULL WHERE task_id = ?1"),
            params![task_id],
        )?;
    }
    Ok(())
}

// =========================================================================
// Lookups
// =========================================================================

/// Fail with NotFound unless the task exists
pub(crate) fn require_task(conn: &Connection, task_id: &EntityId) -> StoreResult<()> {
    ensure_prefix(task_id, EntityPrefix::Task)?;
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
        params![task_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound {
            noun: "task",
            id: task_id.to_string(),
        });
    }
    Ok(())
}

fn get_task(conn: &Connection, task_id: &EntityId) -> StoreResult<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT id, tenant, name, created_by, created_at FROM tasks WHERE id = ?1",
            params![task_id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        tenant: row.get(1)?,
        name: row.get(2)?,
        created_by: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

pub(crate) fn get_property(
    conn: &Connection,
    task_id: &EntityId,
    property_id: &EntityId,
) -> StoreResult<Option<Property>> {
    let property = conn
        .query_row(
            &format!(
                "SELECT {PROPERTY_COLUMNS} FROM task_properties WHERE task_id = ?1 AND id = ?2"
            ),
            params![task_id, property_id],
            Property::from_row,
        )
        .optional()?;
    Ok(property)
}

/// Case-insensitive lookup by declared name
pub(crate) fn find_property_by_name(
    conn: &Connection,
    task_id: &EntityId,
    name: &str,
) -> StoreResult<Option<Property>> {
    let property = conn
        .query_row(
            &format!(
                "SELECT {PROPERTY_COLUMNS} FROM task_properties WHERE task_id = ?1 AND name = ?2"
            ),
            params![task_id, name],
            Property::from_row,
        )
        .optional()?;
    Ok(property)
}

pub(crate) fn properties_for_task(
    conn: &Connection,
    task_id: &EntityId,
) -> StoreResult<Vec<Property>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROPERTY_COLUMNS} FROM task_properties WHERE task_id = ?1 ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![task_id], Property::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
