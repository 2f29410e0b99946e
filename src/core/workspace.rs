//! Workspace discovery and initialization
//!
//! A workspace is any directory tree carrying a `.taskdesk/` marker
//! directory at its root. The marker holds the SQLite store and the
//! workspace-level configuration file.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker directory name
pub const WORKSPACE_DIR: &str = ".taskdesk";

/// Store file name inside the marker directory
pub const DATABASE_FILE: &str = "taskdesk.db";

/// Workspace configuration file name inside the marker directory
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("not inside a taskdesk workspace (no {WORKSPACE_DIR} directory found in this or any parent directory)")]
    NotFound,

    #[error("workspace already initialized at {0}")]
    AlreadyExists(PathBuf),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// A discovered or freshly initialized workspace root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Discover the workspace containing the current directory.
    pub fn discover() -> Result<Self, WorkspaceError> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd)
    }

    /// Discover the workspace containing `start`, walking up through
    /// parent directories until the marker is found.
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start.to_path_buf();
        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Ok(Self { root: current });
            }
            if !current.pop() {
                return Err(WorkspaceError::NotFound);
            }
        }
    }

    /// Initialize a new workspace at `path`. Fails if one is already
    /// present there.
    pub fn init(path: &Path) -> Result<Self, WorkspaceError> {
        let marker = path.join(WORKSPACE_DIR);
        if marker.exists() {
            return Err(WorkspaceError::AlreadyExists(path.to_path_buf()));
        }
        Self::init_force(path)
    }

    /// Initialize a workspace at `path`, tolerating an existing marker.
    pub fn init_force(path: &Path) -> Result<Self, WorkspaceError> {
        let marker = path.join(WORKSPACE_DIR);
        std::fs::create_dir_all(&marker)?;

        let config_path = marker.join(CONFIG_FILE);
        if !config_path.exists() {
            std::fs::write(&config_path, default_config_contents())?;
        }

        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Workspace root directory (the parent of the marker).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.taskdesk` marker directory.
    pub fn marker_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Path of the SQLite store file.
    pub fn database_path(&self) -> PathBuf {
        self.marker_dir().join(DATABASE_FILE)
    }

    /// Path of the workspace configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.marker_dir().join(CONFIG_FILE)
    }
}

fn default_config_contents() -> &'static str {
    "\
# taskdesk workspace configuration
#
# author: Jane Doe
# default_format: yaml
# database: .taskdesk/taskdesk.db
"
}
