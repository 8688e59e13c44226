//! Platform manager: adapter lifecycle, routing, and settings persistence.
//!
//! Each platform is independently disabled or enabled. Enabling builds an
//! adapter and keeps it only if its connection test passes. Routed calls for a
//! platform without an adapter fail with `PlatformNotEnabled`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};

use flowsync_core::{Error, FlowSyncConfig, Result};

use crate::adapter::PlatformAdapter;
use crate::appscript::AppScriptAdapter;
use crate::make::MakeAdapter;
use crate::n8n::N8nAdapter;
use crate::registry::PlatformRegistry;
use crate::settings::PlatformSettings;
use crate::types::*;
use crate::zapier::ZapierAdapter;

pub struct PlatformManager {
    registry: PlatformRegistry,
    http: Client,
    settings_file: PathBuf,
    default_workspace: PathBuf,
    clasp_command: Vec<String>,
    settings: RwLock<PlatformSettings>,
    adapters: RwLock<HashMap<PlatformId, Arc<dyn PlatformAdapter>>>,
    initialized: AtomicBool,
}

impl PlatformManager {
    /// Load settings from `settings_file`. A platform id in the settings that
    /// the registry does not know is a hard error.
    pub fn new(
        registry: PlatformRegistry,
        settings_file: &Path,
        default_workspace: &Path,
        clasp_command: Vec<String>,
    ) -> Result<Self> {
        let settings = PlatformSettings::load(settings_file);
        for key in settings.platforms.keys() {
            let id: PlatformId = key.parse()?;
            registry.get(id)?;
        }

        Ok(Self {
            registry,
            http: Client::new(),
            settings_file: settings_file.to_path_buf(),
            default_workspace: default_workspace.to_path_buf(),
            clasp_command,
            settings: RwLock::new(settings),
            adapters: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &FlowSyncConfig) -> Result<Self> {
        Self::new(
            PlatformRegistry::builtin(),
            &config.data_paths.settings_file,
            &config.workspace_path,
            config.clasp_command.clone(),
        )
    }

    /// Swap the HTTP client shared by every adapter.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Enable every platform the settings mark as enabled. Failures are
    /// logged and leave that platform disabled.
    pub async fn initialize(&self) {
        info!("Initializing platform manager...");
        self.load_enabled_platforms().await;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Platform manager initialized: {} platform(s) enabled",
            self.adapters.read().len()
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn load_enabled_platforms(&self) {
        let wanted: Vec<(PlatformId, Credentials)> = {
            let settings = self.settings.read();
            PlatformId::all()
                .iter()
                .filter_map(|id| {
                    let entry = settings.entry(*id)?;
                    match (&entry.credentials, entry.enabled) {
                        (Some(credentials), true) => Some((*id, credentials.clone())),
                        _ => None,
                    }
                })
                .collect()
        };

        for (id, credentials) in wanted {
            if let Err(e) = self.enable_platform(id, credentials).await {
                error!("Failed to enable platform {}: {}", id, e);
            }
        }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn workspace_path(&self) -> PathBuf {
        self.settings
            .read()
            .workspace_path
            .clone()
            .unwrap_or_else(|| self.default_workspace.clone())
    }

    pub fn settings(&self) -> PlatformSettings {
        self.settings.read().clone()
    }

    /// Construct an adapter without registering it.
    pub fn build_adapter(
        &self,
        id: PlatformId,
        credentials: Credentials,
    ) -> Result<Arc<dyn PlatformAdapter>> {
        let descriptor = self.registry.get(id)?.clone();
        let workspace = self.workspace_path();
        let http = self.http.clone();

        let adapter: Arc<dyn PlatformAdapter> = match id {
            PlatformId::Make => Arc::new(MakeAdapter::new(http, descriptor, credentials, workspace)?),
            PlatformId::Zapier => {
                Arc::new(ZapierAdapter::new(http, descriptor, credentials, workspace)?)
            }
            PlatformId::N8n => Arc::new(N8nAdapter::new(http, descriptor, credentials, workspace)?),
            PlatformId::AppScript => Arc::new(AppScriptAdapter::new(
                http,
                descriptor,
                credentials,
                workspace,
                self.clasp_command.clone(),
            )?),
        };
        Ok(adapter)
    }

    /// Build, test, and register an adapter. A failed connection test leaves
    /// the platform as it was.
    pub async fn enable_platform(
        &self,
        id: PlatformId,
        credentials: Credentials,
    ) -> Result<ConnectionStatus> {
        let adapter = self.build_adapter(id, credentials)?;
        info!("Enabling platform: {}", adapter.descriptor().name);

        let status = adapter.test_connection().await;
        if !status.success {
            let reason = status.error.clone().unwrap_or_else(|| status.message.clone());
            return Err(Error::ConnectionFailed(reason));
        }

        self.adapters.write().insert(id, adapter);
        info!("Platform {} enabled", id);
        Ok(status)
    }

    /// Drop the adapter. Returns whether one was registered.
    pub fn disable_platform(&self, id: PlatformId) -> bool {
        let removed = self.adapters.write().remove(&id).is_some();
        info!("Platform {} disabled", id);
        removed
    }

    pub fn get_adapter(&self, id: PlatformId) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::PlatformNotEnabled(id.to_string()))
    }

    pub fn is_enabled(&self, id: PlatformId) -> bool {
        self.adapters.read().contains_key(&id)
    }

    pub fn enabled_platforms(&self) -> Vec<PlatformId> {
        let mut ids: Vec<PlatformId> = self.adapters.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Scenarios from every enabled platform, fetched concurrently. A failing
    /// platform is logged and skipped.
    pub async fn get_all_scenarios(&self) -> Vec<Scenario> {
        let adapters: Vec<Arc<dyn PlatformAdapter>> = {
            let map = self.adapters.read();
            let mut ids: Vec<&PlatformId> = map.keys().collect();
            ids.sort();
            ids.into_iter().map(|id| map[id].clone()).collect()
        };

        let results = join_all(adapters.iter().map(|a| a.get_scenarios())).await;
        let mut all = Vec::new();
        for (adapter, result) in adapters.iter().zip(results) {
            match result {
                Ok(scenarios) => all.extend(scenarios),
                Err(e) => warn!(
                    "Error fetching scenarios from {}: {}",
                    adapter.platform_id(),
                    e
                ),
            }
        }
        all
    }

    pub async fn get_scenarios(&self, id: PlatformId) -> Result<Vec<Scenario>> {
        self.get_adapter(id)?.get_scenarios().await
    }

    pub async fn get_scenario_details(&self, id: PlatformId, scenario_id: &str) -> Result<Scenario> {
        self.get_adapter(id)?.get_scenario_details(scenario_id).await
    }

    /// Pull into the platform's storage directory.
    pub async fn pull_scenario(&self, id: PlatformId, scenario_id: &str) -> Result<PullResult> {
        let adapter = self.get_adapter(id)?;
        let local_path = adapter.storage_directory();
        adapter.pull_scenario(scenario_id, &local_path).await
    }

    pub async fn push_scenario(&self, id: PlatformId, scenario_id: &str) -> Result<PushResult> {
        let adapter = self.get_adapter(id)?;
        let local_path = adapter.storage_directory();
        adapter.push_scenario(scenario_id, &local_path).await
    }

    pub async fn create_scenario(
        &self,
        id: PlatformId,
        name: &str,
        options: Value,
    ) -> Result<Scenario> {
        self.get_adapter(id)?.create_scenario(name, options).await
    }

    pub async fn delete_scenario(&self, id: PlatformId, scenario_id: &str) -> Result<bool> {
        self.get_adapter(id)?.delete_scenario(scenario_id).await
    }

    pub async fn run_function(
        &self,
        id: PlatformId,
        scenario_id: &str,
        function_name: &str,
        params: Option<Value>,
    ) -> Result<RunResult> {
        self.get_adapter(id)?
            .run_function(scenario_id, function_name, params)
            .await
    }

    pub async fn get_logs(
        &self,
        id: PlatformId,
        scenario_id: &str,
        options: LogsOptions,
    ) -> Result<LogsResult> {
        self.get_adapter(id)?.get_logs(scenario_id, options).await
    }

    pub async fn get_functions(&self, id: PlatformId, scenario_id: &str) -> Result<Vec<String>> {
        self.get_adapter(id)?.get_functions(scenario_id).await
    }

    pub async fn deploy_scenario(
        &self,
        id: PlatformId,
        scenario_id: &str,
        options: DeployOptions,
    ) -> Result<DeployResult> {
        self.get_adapter(id)?.deploy_scenario(scenario_id, options).await
    }

    pub async fn deployment_history(
        &self,
        id: PlatformId,
        scenario_id: &str,
    ) -> Result<Vec<DeploymentRecord>> {
        self.get_adapter(id)?.deployment_history(scenario_id).await
    }

    pub async fn rollback_scenario(
        &self,
        id: PlatformId,
        scenario_id: &str,
        version_id: &str,
    ) -> Result<DeployResult> {
        self.get_adapter(id)?
            .rollback_scenario(scenario_id, version_id)
            .await
    }

    pub fn local_projects(&self, id: PlatformId) -> Result<Vec<LocalProject>> {
        self.get_adapter(id)?.list_local()
    }

    /// Test credentials against a throwaway adapter.
    pub async fn test_platform_connection(
        &self,
        id: PlatformId,
        credentials: Credentials,
    ) -> Result<ConnectionStatus> {
        let adapter = self.build_adapter(id, credentials)?;
        Ok(adapter.test_connection().await)
    }

    /// Store new credentials. An enabled platform is re-enabled with them first
    /// and nothing is saved unless that connection test passes.
    pub async fn update_platform_credentials(
        &self,
        id: PlatformId,
        credentials: Credentials,
    ) -> Result<()> {
        self.registry.get(id)?;
        if self.is_enabled(id) {
            self.enable_platform(id, credentials.clone()).await?;
        }
        self.update_settings(|settings| {
            settings.entry_mut(id).credentials = Some(credentials);
        })
    }

    /// Enable with fresh credentials and persist both on success.
    pub async fn connect_platform(
        &self,
        id: PlatformId,
        credentials: Credentials,
    ) -> Result<ConnectionStatus> {
        let status = self.enable_platform(id, credentials.clone()).await?;
        self.update_settings(|settings| {
            let entry = settings.entry_mut(id);
            entry.enabled = true;
            entry.credentials = Some(credentials);
        })?;
        Ok(status)
    }

    /// Persist the enabled flag. Enabling uses the stored credentials and only
    /// persists once the connection test passes.
    pub async fn toggle_platform(
        &self,
        id: PlatformId,
        enabled: bool,
    ) -> Result<Option<ConnectionStatus>> {
        self.registry.get(id)?;

        if !enabled {
            self.disable_platform(id);
            self.update_settings(|settings| settings.entry_mut(id).enabled = false)?;
            return Ok(None);
        }

        let credentials = self
            .settings
            .read()
            .entry(id)
            .and_then(|entry| entry.credentials.clone());
        let status = match credentials {
            Some(credentials) => Some(self.enable_platform(id, credentials).await?),
            None => None,
        };
        self.update_settings(|settings| settings.entry_mut(id).enabled = true)?;
        Ok(status)
    }

    /// Change the workspace root and rebuild every enabled adapter against it.
    pub async fn set_workspace_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        info!("Workspace path set to {}", path.display());
        self.update_settings(|settings| settings.workspace_path = Some(path))?;

        self.adapters.write().clear();
        self.load_enabled_platforms().await;
        Ok(())
    }

    fn update_settings(&self, change: impl FnOnce(&mut PlatformSettings)) -> Result<()> {
        let mut settings = self.settings.write();
        change(&mut settings);
        settings.save(&self.settings_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::write_record;
    use serde_json::json;

    /// Apps Script credentials that pass the connection test offline.
    fn offline_appscript(dir: &Path) -> Credentials {
        let token = dir.join("token.json");
        write_record(&token, &json!({"access_token": "ya29.test"})).unwrap();
        Credentials::new()
            .with("customTokenPath", token.to_string_lossy().into_owned())
            .with("clasprcPath", dir.join("rc.json").to_string_lossy().into_owned())
    }

    fn test_manager(dir: &Path) -> PlatformManager {
        PlatformManager::new(
            PlatformRegistry::builtin(),
            &dir.join("platforms.json"),
            &dir.join("workspace"),
            vec!["clasp".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_platform_in_settings_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("platforms.json"),
            r#"{"platforms": {"ifttt": {"enabled": true}}}"#,
        )
        .unwrap();
        let result = PlatformManager::new(
            PlatformRegistry::builtin(),
            &dir.path().join("platforms.json"),
            dir.path(),
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::UnknownPlatform(ref id)) if id == "ifttt"));
    }

    #[tokio::test]
    async fn test_routing_requires_enabled_platform() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());
        let err = mgr.get_scenarios(PlatformId::Make).await.unwrap_err();
        assert_eq!(err.to_string(), "Platform make is not enabled or configured");
        assert!(mgr.local_projects(PlatformId::Zapier).is_err());
    }

    #[tokio::test]
    async fn test_enable_and_disable() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());

        let status = mgr
            .enable_platform(PlatformId::AppScript, offline_appscript(dir.path()))
            .await
            .unwrap();
        assert_eq!(status.message, "Connected via Custom Token");
        assert_eq!(mgr.enabled_platforms(), vec![PlatformId::AppScript]);

        assert!(mgr.disable_platform(PlatformId::AppScript));
        assert!(!mgr.is_enabled(PlatformId::AppScript));
        assert!(!mgr.disable_platform(PlatformId::AppScript));
    }

    #[tokio::test]
    async fn test_failed_connection_keeps_platform_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());
        let credentials = Credentials::new()
            .with("customTokenPath", dir.path().join("none.json").to_string_lossy().into_owned())
            .with("clasprcPath", dir.path().join("none-rc.json").to_string_lossy().into_owned());

        let err = mgr
            .enable_platform(PlatformId::AppScript, credentials)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
        assert!(err.to_string().starts_with("Connection test failed:"));
        assert!(!mgr.is_enabled(PlatformId::AppScript));
    }

    #[tokio::test]
    async fn test_rejected_credentials_update_keeps_previous_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());
        let good = offline_appscript(dir.path());
        mgr.connect_platform(PlatformId::AppScript, good.clone())
            .await
            .unwrap();

        let bad = Credentials::new()
            .with("customTokenPath", dir.path().join("none.json").to_string_lossy().into_owned())
            .with("clasprcPath", dir.path().join("none-rc.json").to_string_lossy().into_owned());
        let err = mgr
            .update_platform_credentials(PlatformId::AppScript, bad)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));

        assert!(mgr.is_enabled(PlatformId::AppScript));
        let saved = PlatformSettings::load(&dir.path().join("platforms.json"));
        assert_eq!(
            saved.entry(PlatformId::AppScript).unwrap().credentials.as_ref(),
            Some(&good)
        );
    }

    #[tokio::test]
    async fn test_construction_errors_surface_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());
        let err = mgr
            .test_platform_connection(PlatformId::N8n, Credentials::new().with("apiKey", "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_initialize_and_settings_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = offline_appscript(dir.path());

        {
            let mgr = test_manager(dir.path());
            mgr.update_platform_credentials(PlatformId::AppScript, credentials)
                .await
                .unwrap();
            assert!(mgr.toggle_platform(PlatformId::AppScript, true).await.unwrap().is_some());
        }

        let mgr = test_manager(dir.path());
        assert!(!mgr.is_initialized());
        mgr.initialize().await;
        assert!(mgr.is_initialized());
        assert!(mgr.is_enabled(PlatformId::AppScript));

        mgr.toggle_platform(PlatformId::AppScript, false).await.unwrap();
        assert!(!mgr.is_enabled(PlatformId::AppScript));
        assert!(!mgr.settings().entry(PlatformId::AppScript).unwrap().enabled);
    }

    #[tokio::test]
    async fn test_connect_platform_persists_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());
        let credentials = offline_appscript(dir.path());
        mgr.connect_platform(PlatformId::AppScript, credentials.clone())
            .await
            .unwrap();

        let saved = PlatformSettings::load(&dir.path().join("platforms.json"));
        let entry = saved.entry(PlatformId::AppScript).unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.credentials.as_ref(), Some(&credentials));
    }

    #[tokio::test]
    async fn test_set_workspace_path_rebuilds_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path());
        mgr.update_platform_credentials(PlatformId::AppScript, offline_appscript(dir.path()))
            .await
            .unwrap();
        mgr.initialize().await;

        let new_root = dir.path().join("elsewhere");
        mgr.set_workspace_path(&new_root).await.unwrap();
        assert_eq!(mgr.workspace_path(), new_root);
        let adapter = mgr.get_adapter(PlatformId::AppScript).unwrap();
        assert_eq!(adapter.storage_directory(), new_root.join("scripts"));
    }
}
