//! Database schema initialization

use rusqlite::params;

use super::{TaskStore, SCHEMA_VERSION};
use crate::core::kind::DataKind;
use crate::store::error::StoreResult;

/// Wide-row slots available per scalar kind
pub(crate) const SLOTS_PER_KIND: i64 = 8;

/// Bookkeeping columns shared by task_instances and its recycle twin,
/// in declaration order
pub(crate) const INSTANCE_BOOKKEEPING_COLUMNS: &[&str] = &[
    "id",
    "task_id",
    "type_id",
    "source_id",
    "created_by",
    "created_at",
    "updated_by",
    "updated_at",
];

/// All columns of the live instance table, in declaration order.
///
/// The recycle table declares the same columns (plus deleted_by and
/// deleted_at at the end), so `INSERT INTO ... SELECT` between the two
/// can rely on this list.
pub(crate) fn instance_columns() -> Vec<String> {
    let mut columns: Vec<String> = INSTANCE_BOOKKEEPING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    for kind in DataKind::all() {
        if let Some(family) = kind.column_family() {
            for slot in 1..=SLOTS_PER_KIND {
                columns.push(format!("{family}_{slot}"));
            }
        }
    }
    columns
}

/// SQLite column type for a scalar kind's slot family
fn slot_sql_type(kind: DataKind) -> &'static str {
    match kind {
        DataKind::Text => "TEXT",
        DataKind::Integer => "INTEGER",
        DataKind::Real => "REAL",
        DataKind::Boolean => "INTEGER",
        DataKind::TextList => "TEXT",
    }
}

/// Slot column declarations, comma-joined without a trailing comma
fn slot_columns_ddl() -> String {
    let mut lines = Vec::new();
    for kind in DataKind::all() {
        if let Some(family) = kind.column_family() {
            let sql_type = slot_sql_type(*kind);
            for slot in 1..=SLOTS_PER_KIND {
                lines.push(format!("                {family}_{slot} {sql_type}"));
            }
        }
    }
    lines.join(",\n")
}

impl TaskStore {
    /// Initialize database schema
    pub(super) fn init_schema(&self) -> StoreResult<()> {
        let slots = slot_columns_ddl();
        self.conn.execute_batch(&format!(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Tenant-scoped task containers
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                tenant TEXT NOT NULL,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_tenant ON tasks(tenant);

            -- Instance placement targets
            CREATE TABLE IF NOT EXISTS task_types (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_task_types_task ON task_types(task_id);

            CREATE TABLE IF NOT EXISTS task_sources (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_task_sources_task ON task_sources(task_id);

            -- Property declarations; names are unique per task,
            -- case-insensitively
            CREATE TABLE IF NOT EXISTS task_properties (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                name TEXT NOT NULL COLLATE NOCASE,
                kind TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                required INTEGER NOT NULL DEFAULT 0,
                identifiable INTEGER NOT NULL DEFAULT 0,
                visibility TEXT NOT NULL DEFAULT 'public',
                display TEXT,
                categories TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (task_id, name),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_task_properties_task ON task_properties(task_id);

            -- Index catalog
            CREATE TABLE IF NOT EXISTS task_indexes (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (task_id, name),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_task_indexes_task ON task_indexes(task_id);

            -- Index membership; deliberately no FK on property_id, a
            -- membership row may outlive its property
            CREATE TABLE IF NOT EXISTS index_members (
                index_id TEXT NOT NULL,
                property_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (index_id, property_id),
                FOREIGN KEY (index_id) REFERENCES task_indexes(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_index_members_property ON index_members(property_id);

            -- Canonical wide rows: one slot column per scalar property
            CREATE TABLE IF NOT EXISTS task_instances (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                type_id TEXT,
                source_id TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
{slots},
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_task_instances_task ON task_instances(task_id, created_at);

            -- Soft-deleted wide rows, same shape plus deletion audit
            CREATE TABLE IF NOT EXISTS task_instances_recycle (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                type_id TEXT,
                source_id TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
{slots},
                deleted_by TEXT NOT NULL,
                deleted_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_task_instances_recycle_task ON task_instances_recycle(task_id);

            -- Canonical store for list-kind values, one row per element
            CREATE TABLE IF NOT EXISTS instance_list_values (
                property_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (property_id, instance_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_instance_list_values_instance ON instance_list_values(instance_id);

            CREATE TABLE IF NOT EXISTS instance_list_values_recycle (
                property_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (property_id, instance_id, position)
            );

            -- Typed index-value tables; position is 0 for scalars and
            -- 1-based for list elements
            CREATE TABLE IF NOT EXISTS index_text_values (
                property_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                value TEXT NOT NULL,
                PRIMARY KEY (property_id, instance_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_index_text_values_lookup ON index_text_values(property_id, value);
            CREATE INDEX IF NOT EXISTS idx_index_text_values_instance ON index_text_values(instance_id);

            CREATE TABLE IF NOT EXISTS index_integer_values (
                property_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                value INTEGER NOT NULL,
                PRIMARY KEY (property_id, instance_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_index_integer_values_lookup ON index_integer_values(property_id, value);
            CREATE INDEX IF NOT EXISTS idx_index_integer_values_instance ON index_integer_values(instance_id);

            CREATE TABLE IF NOT EXISTS index_real_values (
                property_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                value REAL NOT NULL,
                PRIMARY KEY (property_id, instance_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_index_real_values_lookup ON index_real_values(property_id, value);
            CREATE INDEX IF NOT EXISTS idx_index_real_values_instance ON index_real_values(instance_id);
            "#
        ))?;

        // Set schema version
        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_columns_cover_every_slot_family() {
        let columns = instance_columns();
        // 8 bookkeeping + 4 families x 8 slots
        assert_eq!(columns.len(), 8 + 4 * SLOTS_PER_KIND as usize);
        assert!(columns.contains(&"text_value_1".to_string()));
        assert!(columns.contains(&"boolean_value_8".to_string()));
        assert!(!columns.iter().any(|c| c.contains("text_list")));
    }

    #[test]
    fn test_slot_ddl_has_no_trailing_comma() {
        let ddl = slot_columns_ddl();
        assert!(!ddl.trim_end().ends_with(','));
        assert_eq!(ddl.matches("INTEGER").count(), 2 * SLOTS_PER_KIND as usize);
    }
}
