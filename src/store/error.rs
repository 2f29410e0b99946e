//! Store error taxonomy
//!
//! Callers can rely on the variant, never on message text: validation
//! problems, bad ids, missing rows, identifiable-value conflicts,
//! soft-deleted collisions, and internal consistency failures each
//! have their own shape.

use crate::core::kind::DataKind;
use miette::Diagnostic;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by the task store
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("a non-empty name is required for the {entity}")]
    #[diagnostic(code(taskdesk::store::name_required))]
    NameRequired { entity: &'static str },

    #[error("an index needs at least one member property")]
    #[diagnostic(code(taskdesk::store::property_required))]
    PropertyRequired,

    #[error("unknown property: '{name}'")]
    #[diagnostic(code(taskdesk::store::unknown_property))]
    UnknownProperty { name: String },

    #[error("a {entity} named '{name}' already exists on this task")]
    #[diagnostic(code(taskdesk::store::duplicate_name))]
    DuplicateName { entity: &'static str, name: String },

    #[error("value for property '{property}' does not match its declared kind {kind}")]
    #[diagnostic(code(taskdesk::store::kind_mismatch))]
    KindMismatch { property: String, kind: DataKind },

    #[error("property '{name}' is required and cannot be left empty")]
    #[diagnostic(code(taskdesk::store::required_property))]
    RequiredProperty { name: String },

    #[error("no free {kind} slot left on this task ({limit} per kind)")]
    #[diagnostic(
        code(taskdesk::store::slots_exhausted),
        help("delete or retype an existing {kind} property to free a slot")
    )]
    SlotsExhausted { kind: DataKind, limit: i64 },

    #[error("property '{name}' of kind {kind} cannot join an index")]
    #[diagnostic(code(taskdesk::store::not_indexable))]
    NotIndexable { name: String, kind: DataKind },

    #[error("{noun} '{id}' does not belong to this task")]
    #[diagnostic(code(taskdesk::store::placement))]
    Placement { noun: &'static str, id: String },

    #[error("'{id}' is not a valid {expected} id")]
    #[diagnostic(code(taskdesk::store::invalid_id))]
    InvalidId { id: String, expected: &'static str },

    #[error("{noun} '{id}' not found")]
    #[diagnostic(code(taskdesk::store::not_found))]
    NotFound { noun: &'static str, id: String },

    #[error("identifiable property '{property}' already has value '{value}' on a live instance")]
    #[diagnostic(code(taskdesk::store::conflict))]
    Conflict { property: String, value: String },

    #[error("{detail}")]
    #[diagnostic(
        code(taskdesk::store::gone),
        help("recover the deleted instance or pick a different value")
    )]
    Gone { detail: String },

    #[error("store schema version {found} is not supported (expected {expected})")]
    #[diagnostic(code(taskdesk::store::schema_version))]
    SchemaVersion { found: i32, expected: i32 },

    #[error("internal consistency failure: {detail}")]
    #[diagnostic(code(taskdesk::store::internal))]
    Internal { detail: String },

    #[error("sql failure: {0}")]
    #[diagnostic(code(taskdesk::store::sql))]
    Sql(#[from] rusqlite::Error),

    #[error("io failure: {0}")]
    #[diagnostic(code(taskdesk::store::io))]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Internal-consistency failure for statements that touched an
    /// unexpected number of rows.
    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        StoreError::Internal {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Message text is part of the CLI surface, so pin the wording.
    #[test]
    fn test_message_rendering() {
        let err = StoreError::NotIndexable {
            name: "done".into(),
            kind: DataKind::Boolean,
        };
        insta::assert_snapshot!(err, @"property 'done' of kind boolean cannot join an index");

        let err = StoreError::SlotsExhausted {
            kind: DataKind::Integer,
            limit: 8,
        };
        insta::assert_snapshot!(err, @"no free integer slot left on this task (8 per kind)");

        let err = StoreError::Conflict {
            property: "email".into(),
            value: "ana@example.com".into(),
        };
        insta::assert_snapshot!(
            err,
            @"identifiable property 'email' already has value 'ana@example.com' on a live instance"
        );
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = StoreError::SchemaVersion {
            found: 2,
            expected: 1,
        };
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("taskdesk::store::schema_version")
        );
        insta::assert_snapshot!(err, @"store schema version 2 is not supported (expected 1)");
    }
}
