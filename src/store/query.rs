//! Query compilation and paging
//!
//! Filters compile once into a WHERE clause shared by the count and
//! page paths, so the two always agree. Each filtered property routes
//! either through its typed index table (EXISTS probe) or through a
//! canonical scan, decided per property at compile time.

use rusqlite::Connection;

use super::TaskStore;
use crate::core::filter::{InstanceFilter, MatchToken, SortOrder};
use crate::core::identity::EntityId;
use crate::core::kind::DataKind;
use crate::store::error::{StoreError, StoreResult};
use crate::store::instances::{fill_lists, record_columns, record_from_row};
use crate::store::types::QueryPage;
use crate::store::{catalog, tasks};

/// Page size applied when the filter does not set one
const DEFAULT_PAGE_SIZE: i64 = 50;

impl TaskStore {
    /// Total number of instances matching the filter
    pub fn count_instances(
        &self,
        task_id: &EntityId,
        filter: &InstanceFilter,
    ) -> StoreResult<i64> {
        tasks::require_task(&self.conn, task_id)?;
        let compiled = compile_filter(&self.conn, task_id, filter)?;
        count_with(&self.conn, &compiled)
    }

    /// One page of matching instances plus the agreeing total
    pub fn query_instances(
        &self,
        task_id: &EntityId,
        filter: &InstanceFilter,
    ) -> StoreResult<QueryPage> {
        tasks::require_task(&self.conn, task_id)?;
        let properties = tasks::properties_for_task(&self.conn, task_id)?;
        let compiled = compile_filter(&self.conn, task_id, filter)?;
        let total = count_with(&self.conn, &compiled)?;

        let order = match filter.order {
            SortOrder::CreatedDesc => "DESC",
            SortOrder::CreatedAsc => "ASC",
        };
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let sql = format!(
            "SELECT {} FROM task_instances i WHERE {} \
             ORDER BY i.created_at {order}, i.id LIMIT {limit} OFFSET {}",
            record_columns(&properties),
            compiled.where_clause,
            filter.offset
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            compiled.params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            record_from_row(row, &properties)
        })?;
        let mut instances = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for record in &mut instances {
            fill_lists(&self.conn, record, &properties, "instance_list_values")?;
        }

        Ok(QueryPage {
            total,
            offset: filter.offset,
            instances,
        })
    }
}

// =========================================================================
// Compilation
// =========================================================================

struct CompiledFilter {
    where_clause: String,
    params: Vec<Box<dyn rusqlite::ToSql>>,
}

fn compile_filter(
    conn: &Connection,
    task_id: &EntityId,
    filter: &InstanceFilter,
) -> StoreResult<CompiledFilter> {
    let mut clauses = vec!["i.task_id = ?".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(task_id.clone())];

    for (name, tokens) in &filter.terms {
        if tokens.is_empty() {
            continue;
        }
        let property = tasks::find_property_by_name(conn, task_id, name)?.ok_or_else(|| {
            StoreError::UnknownProperty { name: name.clone() }
        })?;
        // A retyped property can linger as an index member with a kind
        // that carries no index rows; only route through the index
        // while the kind actually has one.
        let use_index = property.kind.is_indexable()
            && catalog::is_property_member(conn, &property.id)?;

        let clause = if use_index {
            let table = property.kind.index_table().ok_or_else(|| {
                StoreError::internal(format!("kind {} has no index table", property.kind))
            })?;
            params.push(Box::new(property.id.clone()));
            let predicates = token_predicates(value_kind(property.kind), "v.value", tokens, &mut params);
            format!(
                "EXISTS (SELECT 1 FROM {table} v \
                 WHERE v.property_id = ? AND v.instance_id = i.id AND ({predicates}))"
            )
        } else if property.kind.is_listable() {
            params.push(Box::new(property.id.clone()));
            let predicates = token_predicates(DataKind::Text, "lv.value", tokens, &mut params);
            format!(
                "EXISTS (SELECT 1 FROM instance_list_values lv \
                 WHERE lv.property_id = ? AND lv.instance_id = i.id AND ({predicates}))"
            )
        } else {
            let column = property.wide_column().ok_or_else(|| {
                StoreError::internal(format!("property {} has no slot column", property.id))
            })?;
            let predicates =
                token_predicates(property.kind, &format!("i.{column}"), tokens, &mut params);
            format!("({predicates})")
        };
        clauses.push(clause);
    }

    Ok(CompiledFilter {
        where_clause: clauses.join(" AND "),
        params,
    })
}

/// Index rows of a list property hold text elements
fn value_kind(kind: DataKind) -> DataKind {
    if kind.is_listable() {
        DataKind::Text
    } else {
        kind
    }
}

fn token_predicates(
    kind: DataKind,
    column: &str,
    tokens: &[MatchToken],
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) -> String {
    let predicates: Vec<String> = tokens
        .iter()
        .map(|token| token_predicate(kind, column, token, params))
        .collect();
    predicates.join(" OR ")
}

fn token_predicate(
    kind: DataKind,
    column: &str,
    token: &MatchToken,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) -> String {
    match kind {
        DataKind::Text | DataKind::TextList => match token {
            MatchToken::Equals(raw) => {
                params.push(Box::new(raw.clone()));
                format!("{column} = ?")
            }
            MatchToken::Contains(raw) => {
                params.push(Box::new(format!("%{raw}%")));
                format!("{column} LIKE ?")
            }
        },
        DataKind::Integer => match token {
            // Unparsable numeric equality matches nothing, it is not
            // a caller error
            MatchToken::Equals(raw) => match raw.trim().parse::<i64>() {
                Ok(value) => {
                    params.push(Box::new(value));
                    format!("{column} = ?")
                }
                Err(_) => "0".to_string(),
            },
            MatchToken::Contains(raw) => {
                params.push(Box::new(format!("%{raw}%")));
                format!("CAST({column} AS TEXT) LIKE ?")
            }
        },
        DataKind::Real => match token {
            MatchToken::Equals(raw) => match raw.trim().parse::<f64>() {
                Ok(value) => {
                    params.push(Box::new(value));
                    format!("{column} = ?")
                }
                Err(_) => "0".to_string(),
            },
            MatchToken::Contains(raw) => {
                params.push(Box::new(format!("%{raw}%")));
                format!("CAST({column} AS TEXT) LIKE ?")
            }
        },
        DataKind::Boolean => match parse_bool_token(token.payload()) {
            Some(value) => {
                params.push(Box::new(value));
                format!("{column} = ?")
            }
            None => "0".to_string(),
        },
    }
}

fn parse_bool_token(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn count_with(conn: &Connection, compiled: &CompiledFilter) -> StoreResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM task_instances i WHERE {}",
        compiled.where_clause
    );
    let params_refs: Vec<&dyn rusqlite::ToSql> =
        compiled.params.iter().map(|p| p.as_ref()).collect();
    Ok(conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?)
}
