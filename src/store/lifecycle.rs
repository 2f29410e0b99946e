//! Lifecycle handlers driving index maintenance
//!
//! Each handler reacts to one property event. Handlers see live
//! catalog state: admin flows publish *Modifying*/*Deleting* before
//! touching the property row, and *Modified* after, so membership and
//! kind checks here are always against current data.

use rusqlite::Connection;

use crate::core::identity::EntityId;
use crate::core::kind::DataKind;
use crate::store::error::StoreResult;
use crate::store::events::{self, PropertyEvent};
use crate::store::types::Property;
use crate::store::{catalog, values};

/// A property joined an index: bulk-backfill its index rows from
/// canonical data. Indexability was validated by the catalog; a
/// non-indexable kind landing here is a caller bug and fails the
/// transaction.
pub(crate) fn on_property_indexed(conn: &Connection, property: &Property) -> StoreResult<()> {
    values::build_from_canonical(conn, property)
}

/// A property left an index: tear its rows down only once no index on
/// the task references it anymore. The live re-check is what protects
/// properties shared by several indexes.
pub(crate) fn on_property_unindexed(conn: &Connection, property_id: &EntityId) -> StoreResult<()> {
    if catalog::is_property_member(conn, property_id)? {
        tracing::debug!(property = %property_id, "still referenced by another index, keeping rows");
        return Ok(());
    }
    let removed = values::remove_for_property(conn, property_id)?;
    tracing::debug!(property = %property_id, removed, "index rows torn down");
    Ok(())
}

/// A property's kind is about to change. Lone-member indexes cannot
/// outlive their only column and are dropped outright; afterwards the
/// old-typed rows are removed unconditionally, because the Unindexed
/// re-check would keep them alive for any surviving shared index.
pub(crate) fn on_property_modifying(
    conn: &Connection,
    property: &Property,
    new_kind: DataKind,
) -> StoreResult<()> {
    if !property.kind.is_indexable() || new_kind == property.kind {
        return Ok(());
    }
    drop_lone_member_indexes(conn, property)?;
    values::remove_for_property(conn, &property.id)?;
    events::publish(
        conn,
        PropertyEvent::Unindexed {
            property_id: &property.id,
        },
    )
}

/// A property's kind changed. If any index still references it,
/// rebuild its rows under the new representation; a property fully
/// unindexed during the Modifying phase must stay torn down.
pub(crate) fn on_property_modified(
    conn: &Connection,
    property: &Property,
    old_kind: DataKind,
) -> StoreResult<()> {
    if !old_kind.is_indexable() || property.kind == old_kind {
        return Ok(());
    }
    if !catalog::is_property_member(conn, &property.id)? {
        return Ok(());
    }
    values::remove_for_property(conn, &property.id)?;
    if property.kind.is_indexable() {
        values::build_from_canonical(conn, property)?;
    }
    Ok(())
}

/// A property is about to be deleted: same lone-member cascade as a
/// kind change, then its index rows go away for good.
pub(crate) fn on_property_deleting(conn: &Connection, property: &Property) -> StoreResult<()> {
    drop_lone_member_indexes(conn, property)?;
    values::remove_for_property(conn, &property.id)?;
    Ok(())
}

/// Delete every index whose only member is `property`, emitting an
/// Unindexed event per deleted index.
fn drop_lone_member_indexes(conn: &Connection, property: &Property) -> StoreResult<()> {
    for (index_id, member_count) in catalog::indexes_referencing(conn, &property.id)? {
        if member_count == 1 {
            tracing::debug!(
                index = %index_id,
                property = %property.id,
                "dropping index left without members"
            );
            catalog::drop_index_rows(conn, &index_id)?;
            events::publish(
                conn,
                PropertyEvent::Unindexed {
                    property_id: &property.id,
                },
            )?;
        }
    }
    Ok(())
}
