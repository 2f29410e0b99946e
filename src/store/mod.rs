//! SQLite-backed task store
//!
//! This module owns every durable structure of the engine:
//! - Canonical wide rows (one slot column per scalar property) plus a
//!   list-value side table, with soft-deleted twins of both
//! - The index catalog (indexes and their member properties)
//! - Typed index-value tables derived from the canonical data
//!
//! Admin and instance operations run inside a single transaction each,
//! so canonical rows, catalog rows, and derived index rows can never
//! drift apart under a crash.

mod catalog;
mod error;
mod events;
mod instances;
mod lifecycle;
mod query;
mod schema;
mod tasks;
mod types;
mod values;

pub use error::{StoreError, StoreResult};
pub use types::{
    IndexDeclaration, InstanceDraft, InstanceRecord, Property, PropertyDraft, QueryPage,
    SaveOutcome, StoreStats, Task, TaskIndex, TaskSource, TaskType,
};

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::core::workspace::Workspace;

/// Current schema version. The wide rows are canonical data, so a
/// mismatched store is refused rather than rebuilt.
const SCHEMA_VERSION: i32 = 1;

/// The task store backed by SQLite
#[derive(Debug)]
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    /// Open or create the store for a workspace
    pub fn open(workspace: &Workspace) -> StoreResult<Self> {
        Self::open_at(&workspace.database_path())
    }

    /// Open or create the store at an explicit path
    pub fn open_at(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        // WAL for concurrent readers; foreign keys are off by default
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_millis(5_000))?;

        let store = Self { conn };
        match store.stored_schema_version()? {
            None => store.init_schema()?,
            Some(version) if version == SCHEMA_VERSION => {}
            Some(found) => {
                return Err(StoreError::SchemaVersion {
                    found,
                    expected: SCHEMA_VERSION,
                })
            }
        }
        Ok(store)
    }

    /// Schema version recorded in the store, `None` for a fresh file
    fn stored_schema_version(&self) -> StoreResult<Option<i32>> {
        let has_table: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        if has_table == 0 {
            return Ok(None);
        }
        let version = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(version)
    }

    /// Row counts for the status report
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let index_values = self.count("SELECT COUNT(*) FROM index_text_values")?
            + self.count("SELECT COUNT(*) FROM index_integer_values")?
            + self.count("SELECT COUNT(*) FROM index_real_values")?;
        Ok(StoreStats {
            tasks: self.count("SELECT COUNT(*) FROM tasks")?,
            properties: self.count("SELECT COUNT(*) FROM task_properties")?,
            indexes: self.count("SELECT COUNT(*) FROM task_indexes")?,
            index_members: self.count("SELECT COUNT(*) FROM index_members")?,
            instances: self.count("SELECT COUNT(*) FROM task_instances")?,
            recycled_instances: self.count("SELECT COUNT(*) FROM task_instances_recycle")?,
            list_values: self.count("SELECT COUNT(*) FROM instance_list_values")?,
            index_values,
            schema_version: self.stored_schema_version()?.unwrap_or(0),
        })
    }

    fn count(&self, sql: &str) -> StoreResult<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }
}
