//! Shared application state.

use flowsync_core::{FlowSyncConfig, Result};
use flowsync_platforms::PlatformManager;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: FlowSyncConfig,
    pub manager: PlatformManager,
}

impl AppState {
    pub fn new(config: FlowSyncConfig) -> Result<Self> {
        let manager = PlatformManager::from_config(&config)?;
        Ok(Self { config, manager })
    }

    /// State around an already-built manager (custom registry or HTTP client).
    pub fn with_manager(config: FlowSyncConfig, manager: PlatformManager) -> Self {
        Self { config, manager }
    }
}
