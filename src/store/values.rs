//! Typed index-value store and canonical list-value primitives
//!
//! Index rows are always derived: they are rebuilt from the canonical
//! wide row (scalars) or the list-value store (lists), never treated
//! as a source of truth. Every write here is idempotent so lifecycle
//! handlers can re-run safely.

use rusqlite::{params, Connection};

use crate::core::identity::EntityId;
use crate::core::kind::PropertyValue;
use crate::store::error::{StoreError, StoreResult};
use crate::store::types::Property;

/// Every typed index-value table
pub(crate) const INDEX_TABLES: [&str; 3] = [
    "index_text_values",
    "index_integer_values",
    "index_real_values",
];

// =========================================================================
// Index Rows
// =========================================================================

/// Backfill index rows for a property from canonical data.
///
/// Set-based and idempotent: scalars copy from the property's slot
/// column, lists copy element rows verbatim, and re-running upserts
/// the same rows.
pub(crate) fn build_from_canonical(conn: &Connection, property: &Property) -> StoreResult<()> {
    let Some(table) = property.kind.index_table() else {
        return Err(StoreError::NotIndexable {
            name: property.name.clone(),
            kind: property.kind,
        });
    };

    let rows = if property.kind.is_listable() {
        conn.execute(
            &format!(
                "INSERT INTO {table} (property_id, instance_id, position, value) \
                 SELECT property_id, instance_id, position, value \
                 FROM instance_list_values WHERE property_id = ?1 \
                 ON CONFLICT(property_id, instance_id, position) DO UPDATE SET value = excluded.value"
            ),
            params![property.id],
        )?
    } else {
        let column = property.wide_column().ok_or_else(|| {
            StoreError::internal(format!("scalar property {} has no slot column", property.id))
        })?;
        conn.execute(
            &format!(
                "INSERT INTO {table} (property_id, instance_id, position, value) \
                 SELECT ?1, id, 0, {column} \
                 FROM task_instances WHERE task_id = ?2 AND {column} IS NOT NULL \
                 ON CONFLICT(property_id, instance_id, position) DO UPDATE SET value = excluded.value"
            ),
            params![property.id, property.task_id],
        )?
    };

    tracing::debug!(property = %property.id, rows, "index backfill complete");
    Ok(())
}

/// Write index rows for one instance's value of a property.
pub(crate) fn write_for_instance(
    conn: &Connection,
    property: &Property,
    instance_id: &EntityId,
    value: &PropertyValue,
) -> StoreResult<()> {
    let Some(table) = property.kind.index_table() else {
        return Ok(());
    };
    let upsert = format!(
        "INSERT INTO {table} (property_id, instance_id, position, value) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(property_id, instance_id, position) DO UPDATE SET value = excluded.value"
    );
    let mut stmt = conn.prepare(&upsert)?;
    match value {
        PropertyValue::TextList(elements) => {
            for (i, element) in elements.iter().enumerate() {
                stmt.execute(params![property.id, instance_id, (i + 1) as i64, element])?;
            }
        }
        PropertyValue::Text(s) => {
            stmt.execute(params![property.id, instance_id, 0, s])?;
        }
        PropertyValue::Integer(i) => {
            stmt.execute(params![property.id, instance_id, 0, i])?;
        }
        PropertyValue::Real(f) => {
            stmt.execute(params![property.id, instance_id, 0, f])?;
        }
        // Booleans never carry index rows
        PropertyValue::Boolean(_) => {}
    }
    Ok(())
}

/// Replace the index rows of one (property, instance) pair. `None`
/// clears without rewriting.
pub(crate) fn rebuild_for_instance(
    conn: &Connection,
    property: &Property,
    instance_id: &EntityId,
    value: Option<&PropertyValue>,
) -> StoreResult<()> {
    let Some(table) = property.kind.index_table() else {
        return Ok(());
    };
    conn.execute(
        &format!("DELETE FROM {table} WHERE property_id = ?1 AND instance_id = ?2"),
        params![property.id, instance_id],
    )?;
    if let Some(value) = value {
        write_for_instance(conn, property, instance_id, value)?;
    }
    Ok(())
}

/// Drop a property's rows from every index-value table. Idempotent;
/// used both by lifecycle teardown and by retype/delete cleanup.
pub(crate) fn remove_for_property(conn: &Connection, property_id: &EntityId) -> StoreResult<usize> {
    let mut removed = 0;
    for table in INDEX_TABLES {
        removed += conn.execute(
            &format!("DELETE FROM {table} WHERE property_id = ?1"),
            params![property_id],
        )?;
    }
    Ok(removed)
}

/// Drop an instance's rows from every index-value table.
pub(crate) fn remove_for_instance(conn: &Connection, instance_id: &EntityId) -> StoreResult<usize> {
    let mut removed = 0;
    for table in INDEX_TABLES {
        removed += conn.execute(
            &format!("DELETE FROM {table} WHERE instance_id = ?1"),
            params![instance_id],
        )?;
    }
    Ok(removed)
}

/// Rebuild one instance's index rows across every currently-indexed
/// property of its task. Used by the recover path, where the canonical
/// row reappears wholesale.
pub(crate) fn reindex_instance(
    conn: &Connection,
    task_id: &EntityId,
    instance_id: &EntityId,
) -> StoreResult<()> {
    remove_for_instance(conn, instance_id)?;
    for property in crate::store::tasks::properties_for_task(conn, task_id)? {
        if !property.kind.is_indexable()
            || !crate::store::catalog::is_property_member(conn, &property.id)?
        {
            continue;
        }
        let Some(table) = property.kind.index_table() else {
            continue;
        };
        if property.kind.is_listable() {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (property_id, instance_id, position, value) \
                     SELECT property_id, instance_id, position, value \
                     FROM instance_list_values WHERE property_id = ?1 AND instance_id = ?2 \
                     ON CONFLICT(property_id, instance_id, position) DO UPDATE SET value = excluded.value"
                ),
                params![property.id, instance_id],
            )?;
        } else {
            let column = property.wide_column().ok_or_else(|| {
                StoreError::internal(format!(
                    "scalar property {} has no slot column",
                    property.id
                ))
            })?;
            conn.execute(
                &format!(
                    "INSERT INTO {table} (property_id, instance_id, position, value) \
                     SELECT ?1, id, 0, {column} \
                     FROM task_instances WHERE id = ?2 AND {column} IS NOT NULL \
                     ON CONFLICT(property_id, instance_id, position) DO UPDATE SET value = excluded.value"
                ),
                params![property.id, instance_id],
            )?;
        }
    }
    Ok(())
}

// =========================================================================
// Canonical List Values
// =========================================================================

/// Store list elements for an instance, positions 1-based in element
/// order.
pub(crate) fn write_list_values(
    conn: &Connection,
    property_id: &EntityId,
    instance_id: &EntityId,
    elements: &[String],
) -> StoreResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO instance_list_values (property_id, instance_id, position, value) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (i, element) in elements.iter().enumerate() {
        stmt.execute(params![property_id, instance_id, (i + 1) as i64, element])?;
    }
    Ok(())
}

/// Swap an instance's list to a new element set.
pub(crate) fn replace_list_values(
    conn: &Connection,
    property_id: &EntityId,
    instance_id: &EntityId,
    elements: &[String],
) -> StoreResult<()> {
    clear_list_values(conn, property_id, instance_id)?;
    write_list_values(conn, property_id, instance_id, elements)
}

pub(crate) fn clear_list_values(
    conn: &Connection,
    property_id: &EntityId,
    instance_id: &EntityId,
) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM instance_list_values WHERE property_id = ?1 AND instance_id = ?2",
        params![property_id, instance_id],
    )?;
    Ok(())
}

/// Read an instance's list elements back in stored order.
pub(crate) fn list_values(
    conn: &Connection,
    property_id: &EntityId,
    instance_id: &EntityId,
) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT value FROM instance_list_values \
         WHERE property_id = ?1 AND instance_id = ?2 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![property_id, instance_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Purge a property's list rows from the live and recycle stores.
/// Used when the property leaves the list kind or is deleted, so a
/// later recover cannot resurrect values of a dead shape.
pub(crate) fn purge_list_values_for_property(
    conn: &Connection,
    property_id: &EntityId,
) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM instance_list_values WHERE property_id = ?1",
        params![property_id],
    )?;
    conn.execute(
        "DELETE FROM instance_list_values_recycle WHERE property_id = ?1",
        params![property_id],
    )?;
    Ok(())
}
