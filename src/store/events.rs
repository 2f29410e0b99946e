//! Property lifecycle events
//!
//! Index maintenance is driven by events rather than by call sites:
//! catalog and admin flows publish what happened, the lifecycle
//! handlers decide what the derived tables need. Dispatch is
//! synchronous and runs inside the caller's open transaction, so a
//! handler failure rolls back the whole operation.

use rusqlite::Connection;

use crate::core::identity::EntityId;
use crate::core::kind::DataKind;
use crate::store::error::StoreResult;
use crate::store::lifecycle;
use crate::store::types::Property;

/// A property lifecycle event
#[derive(Debug)]
pub(crate) enum PropertyEvent<'a> {
    /// The property joined an index
    Indexed { property: &'a Property },

    /// The property left an index. Only the id is carried: by the time
    /// a stale membership row is torn down the property may no longer
    /// exist.
    Unindexed { property_id: &'a EntityId },

    /// The property's kind is about to change; `property` still
    /// carries the old kind
    Modifying {
        property: &'a Property,
        new_kind: DataKind,
    },

    /// The property's kind changed; `property` carries the new kind
    Modified {
        property: &'a Property,
        old_kind: DataKind,
    },

    /// The property is about to be deleted permanently
    Deleting { property: &'a Property },
}

/// Dispatch an event to its lifecycle handler.
pub(crate) fn publish(conn: &Connection, event: PropertyEvent<'_>) -> StoreResult<()> {
    match event {
        PropertyEvent::Indexed { property } => {
            tracing::debug!(property = %property.id, kind = %property.kind, "property indexed");
            lifecycle::on_property_indexed(conn, property)
        }
        PropertyEvent::Unindexed { property_id } => {
            tracing::debug!(property = %property_id, "property unindexed");
            lifecycle::on_property_unindexed(conn, property_id)
        }
        PropertyEvent::Modifying { property, new_kind } => {
            tracing::debug!(
                property = %property.id,
                from = %property.kind,
                to = %new_kind,
                "property kind changing"
            );
            lifecycle::on_property_modifying(conn, property, new_kind)
        }
        PropertyEvent::Modified { property, old_kind } => {
            tracing::debug!(
                property = %property.id,
                from = %old_kind,
                to = %property.kind,
                "property kind changed"
            );
            lifecycle::on_property_modified(conn, property, old_kind)
        }
        PropertyEvent::Deleting { property } => {
            tracing::debug!(property = %property.id, "property deleting");
            lifecycle::on_property_deleting(conn, property)
        }
    }
}
