//! taskdesk: a workspace-local, multi-tenant task store
//!
//! Each task declares its own typed properties; instances store their
//! values in wide canonical rows inside SQLite, and secondary indexes
//! keep property lookups fast without ever changing query results.

pub mod cli;
pub mod core;
pub mod store;
