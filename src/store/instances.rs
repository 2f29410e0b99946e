//! Instance mutation pipeline
//!
//! Create, patch, soft-delete, and recover task instances on the
//! canonical wide row. Derived index rows are kept in step inside the
//! same transaction, so a committed mutation is never observable with
//! stale index data.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::TaskStore;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::kind::{DataKind, PropertyValue};
use crate::store::error::{StoreError, StoreResult};
use crate::store::schema::{instance_columns, INSTANCE_BOOKKEEPING_COLUMNS};
use crate::store::types::{ensure_prefix, parse_datetime, InstanceDraft, InstanceRecord, Property};
use crate::store::{catalog, tasks, values};

/// (wide table, list table) pairs for the live and recycle stores
const LIVE_TABLES: (&str, &str) = ("task_instances", "instance_list_values");
const RECYCLE_TABLES: (&str, &str) = ("task_instances_recycle", "instance_list_values_recycle");

impl TaskStore {
    /// Create an instance, validating placement, required properties,
    /// and identifiable uniqueness in one unit of work
    pub fn create_instance(
        &mut self,
        task_id: &EntityId,
        draft: InstanceDraft,
        actor: &str,
    ) -> StoreResult<InstanceRecord> {
        let tx = self.conn.transaction()?;
        let record = create_instance_tx(&tx, task_id, draft, actor)?;
        tx.commit()?;
        Ok(record)
    }

    /// Apply value changes to an instance. `None` clears a value.
    /// Unchanged values are skipped entirely: no column write, no
    /// reindex, no audit bump.
    pub fn patch_instance(
        &mut self,
        task_id: &EntityId,
        instance_id: &EntityId,
        changes: BTreeMap<String, Option<PropertyValue>>,
        actor: &str,
    ) -> StoreResult<InstanceRecord> {
        let tx = self.conn.transaction()?;
        let record = patch_instance_tx(&tx, task_id, instance_id, changes, actor)?;
        tx.commit()?;
        Ok(record)
    }

    /// Soft-delete an instance into the recycle store
    pub fn delete_instance(
        &mut self,
        task_id: &EntityId,
        instance_id: &EntityId,
        actor: &str,
    ) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        delete_instance_tx(&tx, task_id, instance_id, actor)?;
        tx.commit()?;
        Ok(())
    }

    /// Restore a soft-deleted instance, re-checking identifiable
    /// uniqueness against the live set and rebuilding its index rows
    pub fn recover_instance(
        &mut self,
        task_id: &EntityId,
        instance_id: &EntityId,
        actor: &str,
    ) -> StoreResult<InstanceRecord> {
        let tx = self.conn.transaction()?;
        let record = recover_instance_tx(&tx, task_id, instance_id, actor)?;
        tx.commit()?;
        Ok(record)
    }

    /// Read one live instance back with typed values
    pub fn instance(
        &self,
        task_id: &EntityId,
        instance_id: &EntityId,
    ) -> StoreResult<InstanceRecord> {
        tasks::require_task(&self.conn, task_id)?;
        ensure_prefix(instance_id, EntityPrefix::Inst)?;
        match get_instance(&self.conn, task_id, instance_id)? {
            Some(record) => Ok(record),
            None => Err(gone_or_missing(&self.conn, task_id, instance_id)?),
        }
    }
}

// =========================================================================
// Transaction Bodies
// =========================================================================

pub(crate) fn create_instance_tx(
    conn: &Connection,
    task_id: &EntityId,
    draft: InstanceDraft,
    actor: &str,
) -> StoreResult<InstanceRecord> {
    tasks::require_task(conn, task_id)?;
    check_placement(conn, task_id, draft.type_id.as_ref(), "task_types", "type", EntityPrefix::Type)?;
    check_placement(
        conn,
        task_id,
        draft.source_id.as_ref(),
        "task_sources",
        "source",
        EntityPrefix::Src,
    )?;

    let properties = tasks::properties_for_task(conn, task_id)?;
    let resolved = resolve_values(&properties, draft.values)?;

    for property in &properties {
        if !property.required {
            continue;
        }
        let satisfied = match resolved.iter().find(|(p, _)| p.id == property.id) {
            Some((_, PropertyValue::TextList(elements))) => !elements.is_empty(),
            Some(_) => true,
            None => false,
        };
        if !satisfied {
            return Err(StoreError::RequiredProperty {
                name: property.name.clone(),
            });
        }
    }

    for (property, value) in &resolved {
        if property.identifiable {
            ensure_identifiable_free(conn, property, value, None)?;
        }
    }

    let instance_id = EntityId::new(EntityPrefix::Inst);
    let now = Utc::now().to_rfc3339();

    let mut columns: Vec<String> = INSTANCE_BOOKKEEPING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(instance_id.clone()),
        Box::new(task_id.clone()),
        Box::new(draft.type_id.clone()),
        Box::new(draft.source_id.clone()),
        Box::new(actor.to_string()),
        Box::new(now.clone()),
        Box::new(actor.to_string()),
        Box::new(now),
    ];
    for (property, value) in &resolved {
        if let Some(column) = property.wide_column() {
            if let Some(bound) = scalar_param(value) {
                columns.push(column);
                params_vec.push(bound);
            }
        }
    }

    let placeholders = vec!["?"; params_vec.len()].join(", ");
    let sql = format!(
        "INSERT INTO task_instances ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let inserted = conn.execute(&sql, params_refs.as_slice())?;
    if inserted != 1 {
        return Err(StoreError::internal(format!(
            "instance insert affected {inserted} rows"
        )));
    }

    for (property, value) in &resolved {
        if let PropertyValue::TextList(elements) = value {
            values::write_list_values(conn, &property.id, &instance_id, elements)?;
        }
    }
    for (property, value) in &resolved {
        if property.kind.is_indexable() && catalog::is_property_member(conn, &property.id)? {
            values::write_for_instance(conn, property, &instance_id, value)?;
        }
    }

    tracing::debug!(instance = %instance_id, task = %task_id, "instance created");
    read_record(conn, LIVE_TABLES, task_id, &instance_id, &properties)?
        .ok_or_else(|| StoreError::internal("created instance did not read back"))
}

pub(crate) fn patch_instance_tx(
    conn: &Connection,
    task_id: &EntityId,
    instance_id: &EntityId,
    changes: BTreeMap<String, Option<PropertyValue>>,
    actor: &str,
) -> StoreResult<InstanceRecord> {
    tasks::require_task(conn, task_id)?;
    ensure_prefix(instance_id, EntityPrefix::Inst)?;
    let properties = tasks::properties_for_task(conn, task_id)?;
    let Some(current) = read_record(conn, LIVE_TABLES, task_id, instance_id, &properties)? else {
        return Err(gone_or_missing(conn, task_id, instance_id)?);
    };

    let by_name: BTreeMap<String, &Property> = properties
        .iter()
        .map(|p| (p.name.to_lowercase(), p))
        .collect();

    let mut effective: Vec<(&Property, Option<PropertyValue>)> = Vec::new();
    for (name, incoming) in changes {
        let property =
            by_name
                .get(&name.to_lowercase())
                .copied()
                .ok_or_else(|| StoreError::UnknownProperty { name: name.clone() })?;
        let incoming = match incoming {
            Some(value) => Some(value.conform(property.kind).ok_or_else(|| {
                StoreError::KindMismatch {
                    property: property.name.clone(),
                    kind: property.kind,
                }
            })?),
            None => None,
        };
        // An empty list is a clear, not a value
        let incoming = match incoming {
            Some(PropertyValue::TextList(elements)) if elements.is_empty() => None,
            other => other,
        };
        if current.values.get(&property.name) == incoming.as_ref() {
            continue;
        }
        if incoming.is_none() && property.required {
            return Err(StoreError::RequiredProperty {
                name: property.name.clone(),
            });
        }
        effective.push((property, incoming));
    }

    if effective.is_empty() {
        return Ok(current);
    }

    for (property, value) in &effective {
        if property.identifiable {
            if let Some(value) = value {
                ensure_identifiable_free(conn, property, value, Some(instance_id))?;
            }
        }
    }

    let mut sets: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    for (property, value) in &effective {
        match (value, property.wide_column()) {
            (Some(PropertyValue::TextList(elements)), _) => {
                values::replace_list_values(conn, &property.id, instance_id, elements)?;
            }
            (None, None) => {
                values::clear_list_values(conn, &property.id, instance_id)?;
            }
            (Some(scalar), Some(column)) => {
                let bound = scalar_param(scalar).ok_or_else(|| {
                    StoreError::internal(format!(
                        "property {} resolved a list value into a slot column",
                        property.id
                    ))
                })?;
                sets.push(format!("{column} = ?"));
                params_vec.push(bound);
            }
            (None, Some(column)) => {
                sets.push(format!("{column} = NULL"));
            }
            (Some(_), None) => {
                return Err(StoreError::internal(format!(
                    "property {} has a scalar value but no slot column",
                    property.id
                )));
            }
        }
    }

    sets.push("updated_by = ?".to_string());
    params_vec.push(Box::new(actor.to_string()));
    sets.push("updated_at = ?".to_string());
    params_vec.push(Box::new(Utc::now().to_rfc3339()));
    params_vec.push(Box::new(instance_id.clone()));

    let sql = format!(
        "UPDATE task_instances SET {} WHERE id = ?",
        sets.join(", ")
    );
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let updated = conn.execute(&sql, params_refs.as_slice())?;
    if updated != 1 {
        return Err(StoreError::internal(format!(
            "instance update affected {updated} rows"
        )));
    }

    for (property, value) in &effective {
        if property.kind.is_indexable() && catalog::is_property_member(conn, &property.id)? {
            values::rebuild_for_instance(conn, property, instance_id, value.as_ref())?;
        }
    }

    read_record(conn, LIVE_TABLES, task_id, instance_id, &properties)?
        .ok_or_else(|| StoreError::internal("patched instance did not read back"))
}

pub(crate) fn delete_instance_tx(
    conn: &Connection,
    task_id: &EntityId,
    instance_id: &EntityId,
    actor: &str,
) -> StoreResult<()> {
    tasks::require_task(conn, task_id)?;
    ensure_prefix(instance_id, EntityPrefix::Inst)?;
    let live: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_instances WHERE task_id = ?1 AND id = ?2)",
        params![task_id, instance_id],
        |row| row.get(0),
    )?;
    if !live {
        return Err(gone_or_missing(conn, task_id, instance_id)?);
    }

    let columns = instance_columns().join(", ");
    let moved = conn.execute(
        &format!(
            "INSERT INTO task_instances_recycle ({columns}, deleted_by, deleted_at) \
             SELECT {columns}, ?1, ?2 FROM task_instances WHERE id = ?3"
        ),
        params![actor, Utc::now().to_rfc3339(), instance_id],
    )?;
    if moved != 1 {
        return Err(StoreError::internal(format!(
            "recycle insert affected {moved} rows"
        )));
    }
    conn.execute(
        "INSERT INTO instance_list_values_recycle (property_id, instance_id, position, value) \
         SELECT property_id, instance_id, position, value \
         FROM instance_list_values WHERE instance_id = ?1",
        params![instance_id],
    )?;
    conn.execute(
        "DELETE FROM instance_list_values WHERE instance_id = ?1",
        params![instance_id],
    )?;
    let deleted = conn.execute(
        "DELETE FROM task_instances WHERE id = ?1",
        params![instance_id],
    )?;
    if deleted != 1 {
        return Err(StoreError::internal(format!(
            "instance delete affected {deleted} rows"
        )));
    }

    let removed = values::remove_for_instance(conn, instance_id)?;
    tracing::debug!(instance = %instance_id, removed, "instance recycled");
    Ok(())
}

pub(crate) fn recover_instance_tx(
    conn: &Connection,
    task_id: &EntityId,
    instance_id: &EntityId,
    actor: &str,
) -> StoreResult<InstanceRecord> {
    tasks::require_task(conn, task_id)?;
    ensure_prefix(instance_id, EntityPrefix::Inst)?;
    let properties = tasks::properties_for_task(conn, task_id)?;
    let Some(recycled) = read_record(conn, RECYCLE_TABLES, task_id, instance_id, &properties)?
    else {
        return Err(StoreError::NotFound {
            noun: "recycled instance",
            id: instance_id.to_string(),
        });
    };

    // Values may have been claimed by a live instance since the delete
    for property in &properties {
        if !property.identifiable {
            continue;
        }
        if let Some(value) = recycled.values.get(&property.name) {
            if value_collides(conn, LIVE_TABLES, property, value, None)? {
                return Err(StoreError::Conflict {
                    property: property.name.clone(),
                    value: value.render(),
                });
            }
        }
    }

    let columns = instance_columns().join(", ");
    let restored = conn.execute(
        &format!(
            "INSERT INTO task_instances ({columns}) \
             SELECT {columns} FROM task_instances_recycle WHERE id = ?1"
        ),
        params![instance_id],
    )?;
    if restored != 1 {
        return Err(StoreError::internal(format!(
            "recover insert affected {restored} rows"
        )));
    }
    let dropped = conn.execute(
        "DELETE FROM task_instances_recycle WHERE id = ?1",
        params![instance_id],
    )?;
    if dropped != 1 {
        return Err(StoreError::internal(format!(
            "recycle delete affected {dropped} rows"
        )));
    }
    conn.execute(
        "INSERT INTO instance_list_values (property_id, instance_id, position, value) \
         SELECT property_id, instance_id, position, value \
         FROM instance_list_values_recycle WHERE instance_id = ?1",
        params![instance_id],
    )?;
    conn.execute(
        "DELETE FROM instance_list_values_recycle WHERE instance_id = ?1",
        params![instance_id],
    )?;
    conn.execute(
        "UPDATE task_instances SET updated_by = ?1, updated_at = ?2 WHERE id = ?3",
        params![actor, Utc::now().to_rfc3339(), instance_id],
    )?;

    values::reindex_instance(conn, task_id, instance_id)?;
    tracing::debug!(instance = %instance_id, "instance recovered");

    read_record(conn, LIVE_TABLES, task_id, instance_id, &properties)?
        .ok_or_else(|| StoreError::internal("recovered instance did not read back"))
}

// =========================================================================
// Validation Helpers
// =========================================================================

/// Resolve a draft's named values against the task's properties,
/// conforming each to its declared kind
fn resolve_values(
    properties: &[Property],
    incoming: BTreeMap<String, PropertyValue>,
) -> StoreResult<Vec<(&Property, PropertyValue)>> {
    let by_name: BTreeMap<String, &Property> = properties
        .iter()
        .map(|p| (p.name.to_lowercase(), p))
        .collect();
    let mut resolved = Vec::with_capacity(incoming.len());
    for (name, value) in incoming {
        let property =
            by_name
                .get(&name.to_lowercase())
                .copied()
                .ok_or_else(|| StoreError::UnknownProperty { name: name.clone() })?;
        let value = value
            .conform(property.kind)
            .ok_or_else(|| StoreError::KindMismatch {
                property: property.name.clone(),
                kind: property.kind,
            })?;
        resolved.push((property, value));
    }
    Ok(resolved)
}

fn check_placement(
    conn: &Connection,
    task_id: &EntityId,
    target: Option<&EntityId>,
    table: &str,
    noun: &'static str,
    prefix: EntityPrefix,
) -> StoreResult<()> {
    let Some(id) = target else {
        return Ok(());
    };
    ensure_prefix(id, prefix)?;
    let placed: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1 AND task_id = ?2)"),
        params![id, task_id],
        |row| row.get(0),
    )?;
    if !placed {
        return Err(StoreError::Placement {
            noun,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Reject a value already held by another instance: a live holder is a
/// `Conflict`, a recycled holder is `Gone`
fn ensure_identifiable_free(
    conn: &Connection,
    property: &Property,
    value: &PropertyValue,
    exclude: Option<&EntityId>,
) -> StoreResult<()> {
    if value_collides(conn, LIVE_TABLES, property, value, exclude)? {
        return Err(StoreError::Conflict {
            property: property.name.clone(),
            value: value.render(),
        });
    }
    if value_collides(conn, RECYCLE_TABLES, property, value, exclude)? {
        return Err(StoreError::Gone {
            detail: format!(
                "value '{}' for identifiable property '{}' belongs to a soft-deleted instance",
                value.render(),
                property.name
            ),
        });
    }
    Ok(())
}

fn value_collides(
    conn: &Connection,
    (wide_table, list_table): (&str, &str),
    property: &Property,
    value: &PropertyValue,
    exclude: Option<&EntityId>,
) -> StoreResult<bool> {
    match value {
        // List kinds collide element-wise against the list store
        PropertyValue::TextList(elements) => {
            for element in elements {
                let mut sql = format!(
                    "SELECT EXISTS(SELECT 1 FROM {list_table} \
                     WHERE property_id = ? AND value = ?"
                );
                let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
                    vec![Box::new(property.id.clone()), Box::new(element.clone())];
                if let Some(id) = exclude {
                    sql.push_str(" AND instance_id <> ?");
                    params_vec.push(Box::new(id.clone()));
                }
                sql.push(')');
                let params_refs: Vec<&dyn rusqlite::ToSql> =
                    params_vec.iter().map(|p| p.as_ref()).collect();
                let hit: bool =
                    conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
                if hit {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        scalar => {
            let column = property.wide_column().ok_or_else(|| {
                StoreError::internal(format!("property {} has no slot column", property.id))
            })?;
            let bound = scalar_param(scalar).ok_or_else(|| {
                StoreError::internal(format!(
                    "property {} resolved a list value into a slot column",
                    property.id
                ))
            })?;
            let mut sql = format!(
                "SELECT EXISTS(SELECT 1 FROM {wide_table} WHERE task_id = ? AND {column} = ?"
            );
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(property.task_id.clone()), bound];
            if let Some(id) = exclude {
                sql.push_str(" AND id <> ?");
                params_vec.push(Box::new(id.clone()));
            }
            sql.push(')');
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();
            let hit: bool = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
            Ok(hit)
        }
    }
}

fn scalar_param(value: &PropertyValue) -> Option<Box<dyn rusqlite::ToSql>> {
    match value {
        PropertyValue::Text(s) => Some(Box::new(s.clone())),
        PropertyValue::Integer(i) => Some(Box::new(*i)),
        PropertyValue::Real(f) => Some(Box::new(*f)),
        PropertyValue::Boolean(b) => Some(Box::new(*b)),
        PropertyValue::TextList(_) => None,
    }
}

/// Distinguish a recycled instance from a genuinely unknown id
fn gone_or_missing(
    conn: &Connection,
    task_id: &EntityId,
    instance_id: &EntityId,
) -> StoreResult<StoreError> {
    let recycled: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_instances_recycle WHERE task_id = ?1 AND id = ?2)",
        params![task_id, instance_id],
        |row| row.get(0),
    )?;
    Ok(if recycled {
        StoreError::Gone {
            detail: format!("instance {instance_id} is soft-deleted; recover it first"),
        }
    } else {
        StoreError::NotFound {
            noun: "instance",
            id: instance_id.to_string(),
        }
    })
}

// =========================================================================
// Record Reads
// =========================================================================

/// Select list matching `record_from_row`: bookkeeping columns first,
/// then one slot column per scalar property in iteration order
pub(crate) fn record_columns(properties: &[Property]) -> String {
    let mut columns: Vec<String> = INSTANCE_BOOKKEEPING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    for property in properties {
        if let Some(column) = property.wide_column() {
            columns.push(column);
        }
    }
    columns.join(", ")
}

/// Map a wide row into typed scalar values; list values are filled in
/// a second pass
pub(crate) fn record_from_row(
    row: &rusqlite::Row<'_>,
    properties: &[Property],
) -> rusqlite::Result<InstanceRecord> {
    let mut record = InstanceRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        type_id: row.get(2)?,
        source_id: row.get(3)?,
        values: BTreeMap::new(),
        created_by: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_by: row.get(6)?,
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    };
    let mut column = INSTANCE_BOOKKEEPING_COLUMNS.len();
    for property in properties {
        if property.wide_column().is_none() {
            continue;
        }
        let value = match property.kind {
            DataKind::Text => row.get::<_, Option<String>>(column)?.map(PropertyValue::Text),
            DataKind::Integer => row
                .get::<_, Option<i64>>(column)?
                .map(PropertyValue::Integer),
            DataKind::Real => row.get::<_, Option<f64>>(column)?.map(PropertyValue::Real),
            DataKind::Boolean => row
                .get::<_, Option<bool>>(column)?
                .map(PropertyValue::Boolean),
            DataKind::TextList => None,
        };
        if let Some(value) = value {
            record.values.insert(property.name.clone(), value);
        }
        column += 1;
    }
    Ok(record)
}

/// Fill list-kind values from the given list table, preserving element
/// order. Empty lists stay absent from the value map.
pub(crate) fn fill_lists(
    conn: &Connection,
    record: &mut InstanceRecord,
    properties: &[Property],
    list_table: &str,
) -> StoreResult<()> {
    for property in properties.iter().filter(|p| p.kind.is_listable()) {
        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM {list_table} \
             WHERE property_id = ?1 AND instance_id = ?2 ORDER BY position"
        ))?;
        let elements = stmt
            .query_map(params![property.id, record.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if !elements.is_empty() {
            record
                .values
                .insert(property.name.clone(), PropertyValue::TextList(elements));
        }
    }
    Ok(())
}

fn read_record(
    conn: &Connection,
    (wide_table, list_table): (&str, &str),
    task_id: &EntityId,
    instance_id: &EntityId,
    properties: &[Property],
) -> StoreResult<Option<InstanceRecord>> {
    let columns = record_columns(properties);
    let record = conn
        .query_row(
            &format!("SELECT {columns} FROM {wide_table} WHERE task_id = ?1 AND id = ?2"),
            params![task_id, instance_id],
            |row| record_from_row(row, properties),
        )
        .optional()?;
    let Some(mut record) = record else {
        return Ok(None);
    };
    fill_lists(conn, &mut record, properties, list_table)?;
    Ok(Some(record))
}

pub(crate) fn get_instance(
    conn: &Connection,
    task_id: &EntityId,
    instance_id: &EntityId,
) -> StoreResult<Option<InstanceRecord>> {
    let properties = tasks::properties_for_task(conn, task_id)?;
    read_record(conn, LIVE_TABLES, task_id, instance_id, &properties)
}
