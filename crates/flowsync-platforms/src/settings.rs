//! Persisted platform settings (`platforms.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use flowsync_core::Result;

use crate::types::{Credentials, PlatformId};

/// Per-platform switch plus the credentials to build its adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformEntry {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    /// Overrides the configured default workspace when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    /// Keyed by platform id. Unknown keys are rejected by the manager.
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformEntry>,
}

impl Default for PlatformSettings {
    /// Apps Script reads its own token files, so it starts enabled.
    fn default() -> Self {
        let mut platforms = BTreeMap::new();
        for id in PlatformId::all() {
            platforms.insert(id.as_str().to_string(), PlatformEntry::default());
        }
        platforms.insert(
            PlatformId::AppScript.as_str().to_string(),
            PlatformEntry {
                enabled: true,
                credentials: Some(Credentials::new()),
            },
        );
        Self {
            workspace_path: None,
            platforms,
        }
    }
}

impl PlatformSettings {
    /// Load from disk. Missing or unreadable files yield the defaults.
    pub fn load(path: &Path) -> Self {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<PlatformSettings>(&data) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to parse platform settings {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        settings
            .platforms
            .entry(PlatformId::AppScript.as_str().to_string())
            .or_insert_with(|| PlatformEntry {
                enabled: true,
                credentials: Some(Credentials::new()),
            });
        settings
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved platform settings to {}", path.display());
        Ok(())
    }

    pub fn entry(&self, id: PlatformId) -> Option<&PlatformEntry> {
        self.platforms.get(id.as_str())
    }

    pub fn entry_mut(&mut self, id: PlatformId) -> &mut PlatformEntry {
        self.platforms.entry(id.as_str().to_string()).or_default()
    }
}
