//! Core module - fundamental types and utilities

pub mod config;
pub mod filter;
pub mod identity;
pub mod kind;
pub mod workspace;

pub use config::Config;
pub use filter::{InstanceFilter, MatchToken, SortOrder};
pub use identity::{EntityId, EntityPrefix, IdParseError};
pub use kind::{DataKind, PropertyValue, Visibility};
pub use workspace::{Workspace, WorkspaceError};
