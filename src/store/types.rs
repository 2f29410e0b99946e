//! Store type definitions
//!
//! Structs returned by store reads plus the draft/declaration inputs
//! accepted by writes.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::kind::{DataKind, PropertyValue, Visibility};
use crate::store::error::{StoreError, StoreResult};

// =========================================================================
// Catalog Types
// =========================================================================

/// A tenant-scoped task container
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: EntityId,
    pub tenant: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An instance placement target (type axis)
#[derive(Debug, Clone, Serialize)]
pub struct TaskType {
    pub id: EntityId,
    pub task_id: EntityId,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An instance placement target (source axis)
#[derive(Debug, Clone, Serialize)]
pub struct TaskSource {
    pub id: EntityId,
    pub task_id: EntityId,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A property declaration on a task
#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub id: EntityId,
    pub task_id: EntityId,
    pub name: String,
    pub kind: DataKind,
    /// Slot number within the kind's column family; 0 for list kinds
    pub sequence: i64,
    pub required: bool,
    pub identifiable: bool,
    pub visibility: Visibility,
    pub display: Option<serde_json::Value>,
    pub categories: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    /// Wide-row column this property's scalar values live in
    pub fn wide_column(&self) -> Option<String> {
        self.kind
            .column_family()
            .map(|family| format!("{}_{}", family, self.sequence))
    }
}

/// A secondary index with its resolved member properties
#[derive(Debug, Clone, Serialize)]
pub struct TaskIndex {
    pub id: EntityId,
    pub task_id: EntityId,
    pub name: String,
    /// Members in declaration order; stale references are omitted
    pub properties: Vec<Property>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

// =========================================================================
// Write Inputs
// =========================================================================

/// Input for adding a property to a task
#[derive(Debug, Clone)]
pub struct PropertyDraft {
    pub name: String,
    pub kind: DataKind,
    pub required: bool,
    pub identifiable: bool,
    pub visibility: Visibility,
    pub display: Option<serde_json::Value>,
    pub categories: Vec<String>,
}

impl PropertyDraft {
    pub fn new(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            identifiable: false,
            visibility: Visibility::default(),
            display: None,
            categories: Vec::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn identifiable(mut self, identifiable: bool) -> Self {
        self.identifiable = identifiable;
        self
    }
}

/// Input for creating a task instance
#[derive(Debug, Clone, Default)]
pub struct InstanceDraft {
    pub type_id: Option<EntityId>,
    pub source_id: Option<EntityId>,
    pub values: BTreeMap<String, PropertyValue>,
}

impl InstanceDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, property: impl Into<String>, value: PropertyValue) -> Self {
        self.values.insert(property.into(), value);
        self
    }
}

/// One desired index in a declarative save plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub name: String,
    pub properties: Vec<String>,
}

/// What a declarative save actually changed
#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl SaveOutcome {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

// =========================================================================
// Read Results
// =========================================================================

/// A task instance with its typed property values resolved by name
#[derive(Debug, Clone, Serialize)]
pub struct InstanceRecord {
    pub id: EntityId,
    pub task_id: EntityId,
    pub type_id: Option<EntityId>,
    pub source_id: Option<EntityId>,
    pub values: BTreeMap<String, PropertyValue>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn value(&self, property: &str) -> Option<&PropertyValue> {
        self.values.get(property)
    }
}

/// One page of query results with the total match count
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub total: i64,
    pub offset: i64,
    pub instances: Vec<InstanceRecord>,
}

/// Row counts for the status report
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub tasks: i64,
    pub properties: i64,
    pub indexes: i64,
    pub index_members: i64,
    pub instances: i64,
    pub recycled_instances: i64,
    pub list_values: i64,
    pub index_values: i64,
    pub schema_version: i32,
}

// =========================================================================
// SQL Conversions
// =========================================================================

impl ToSql for EntityId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for EntityId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse()
            .map_err(|e: crate::core::identity::IdParseError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for DataKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DataKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Visibility {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Visibility {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

// =========================================================================
// Row Helpers
// =========================================================================

/// Column list matching `Property::from_row`
pub(crate) const PROPERTY_COLUMNS: &str = "id, task_id, name, kind, sequence, required, \
     identifiable, visibility, display, categories, created_by, created_at, updated_by, updated_at";

impl Property {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let display_raw: Option<String> = row.get(8)?;
        let categories_raw: Option<String> = row.get(9)?;
        Ok(Property {
            id: row.get(0)?,
            task_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            sequence: row.get(4)?,
            required: row.get(5)?,
            identifiable: row.get(6)?,
            visibility: row.get(7)?,
            display: display_raw.and_then(|s| serde_json::from_str(&s).ok()),
            categories: split_categories(categories_raw),
            created_by: row.get(10)?,
            created_at: parse_datetime(&row.get::<_, String>(11)?),
            updated_by: row.get(12)?,
            updated_at: parse_datetime(&row.get::<_, String>(13)?),
        })
    }
}

/// Parse an RFC 3339 timestamp column, tolerating old or hand-edited
/// values
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
}

/// Comma-join categories for the TEXT column; empty slices store NULL
pub(crate) fn join_categories(categories: &[String]) -> Option<String> {
    if categories.is_empty() {
        None
    } else {
        Some(categories.join(","))
    }
}

pub(crate) fn split_categories(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Reject ids carrying the wrong type prefix before touching SQL
pub(crate) fn ensure_prefix(id: &EntityId, expected: EntityPrefix) -> StoreResult<()> {
    if id.prefix() != expected {
        return Err(StoreError::InvalidId {
            id: id.to_string(),
            expected: expected.noun(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_lenient() {
        let ts = parse_datetime("2024-03-01T10:00:00Z");
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        // Garbage falls back to the sentinel epoch instead of failing
        let fallback = parse_datetime("not a timestamp");
        assert_eq!(fallback.to_rfc3339(), "2000-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_categories_roundtrip() {
        let cats = vec!["billing".to_string(), "ops".to_string()];
        let joined = join_categories(&cats);
        assert_eq!(joined.as_deref(), Some("billing,ops"));
        assert_eq!(split_categories(joined), cats);
        assert!(join_categories(&[]).is_none());
        assert!(split_categories(None).is_empty());
    }

    #[test]
    fn test_wide_column_names() {
        let mut prop = sample_property(DataKind::Integer, 3);
        assert_eq!(prop.wide_column().as_deref(), Some("integer_value_3"));
        prop.kind = DataKind::TextList;
        prop.sequence = 0;
        assert!(prop.wide_column().is_none());
    }

    #[test]
    fn test_ensure_prefix() {
        let id = EntityId::new(EntityPrefix::Prop);
        assert!(ensure_prefix(&id, EntityPrefix::Prop).is_ok());
        let err = ensure_prefix(&id, EntityPrefix::Idx).unwrap_err();
        assert!(matches!(err, StoreError::InvalidId { .. }));
    }

    pub(crate) fn sample_property(kind: DataKind, sequence: i64) -> Property {
        Property {
            id: EntityId::new(EntityPrefix::Prop),
            task_id: EntityId::new(EntityPrefix::Task),
            name: "sample".to_string(),
            kind,
            sequence,
            required: false,
            identifiable: false,
            visibility: Visibility::Public,
            display: None,
            categories: Vec::new(),
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            updated_by: "tester".to_string(),
            updated_at: Utc::now(),
        }
    }
}
