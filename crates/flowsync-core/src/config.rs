//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default clasp invocation when `CLASP_COMMAND` is not set.
pub const DEFAULT_CLASP_COMMAND: &str = "npx clasp";

/// Paths to FlowSync data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Persisted platform settings (`data/platforms.json`).
    pub settings_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            settings_file: root.join("platforms.json"),
            root,
        })
    }
}

/// Top-level FlowSync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSyncConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Default workspace root, used until the settings file names another.
    pub workspace_path: PathBuf,
    /// Program and leading arguments used to invoke clasp.
    pub clasp_command: Vec<String>,
}

impl FlowSyncConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3050);

        let data_paths = DataPaths::new(data_dir)?;

        let workspace_path = std::env::var("FLOWSYNC_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_paths.root.join("workspace"));

        let clasp_command = parse_command(
            &std::env::var("CLASP_COMMAND").unwrap_or_else(|_| DEFAULT_CLASP_COMMAND.into()),
        );

        Ok(Self {
            port,
            data_paths,
            workspace_path,
            clasp_command,
        })
    }
}

/// Split a command line on whitespace. Empty input yields the default command.
pub fn parse_command(raw: &str) -> Vec<String> {
    let parts: Vec<String> = raw.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        parse_command(DEFAULT_CLASP_COMMAND)
    } else {
        parts
    }
}
