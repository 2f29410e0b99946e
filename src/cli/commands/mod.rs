//! CLI command implementations

pub mod completions;
pub mod index;
pub mod init;
pub mod instance;
pub mod prop;
pub mod query;
pub mod source;
pub mod status;
pub mod task;
pub mod typ;
