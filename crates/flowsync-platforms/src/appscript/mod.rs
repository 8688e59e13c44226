//! Google Apps Script adapter, driven through the Drive API and the clasp CLI.
//!
//! Listing tries the Drive API first and falls back to `clasp list`. Pull,
//! push, create, run, logs and deployments always go through clasp inside the
//! project's folder under `<workspace>/scripts/`.

pub mod clasp;
pub mod deploy;
pub mod project;
pub mod token;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use flowsync_core::config::parse_command;
use flowsync_core::{Error, Result};

use crate::adapter::{bearer, ApiClient, ApiRequest, PlatformAdapter};
use crate::registry::PlatformDescriptor;
use crate::tracking::{self, now_iso, ProjectTracking, SyncOperation, SyncRecord};
use crate::types::*;

use self::clasp::{parse_clasp_list, ClaspRunner};
use self::project::{LocalScript, CLASP_CONFIG_FILE};
use self::token::{TokenStore, ValidToken};

const SCRIPT_MIME_QUERY: &str = "mimeType='application/vnd.google-apps.script' and trashed=false";
const DRIVE_LIST_FIELDS: &str = "nextPageToken, files(id, name, webViewLink, modifiedTime)";
const DRIVE_FILE_FIELDS: &str = "id, name, webViewLink, modifiedTime";
const DEFAULT_SCRIPT_TYPE: &str = "standalone";

pub struct AppScriptAdapter {
    api: ApiClient,
    workspace: PathBuf,
    clasp: ClaspRunner,
    tokens: TokenStore,
}

impl AppScriptAdapter {
    /// Credentials may override `claspCommand`, `customTokenPath` and `clasprcPath`.
    pub fn new(
        http: Client,
        descriptor: PlatformDescriptor,
        credentials: Credentials,
        workspace: impl Into<PathBuf>,
        clasp_command: Vec<String>,
    ) -> Result<Self> {
        let clasp_command = credentials
            .get_str("claspCommand")
            .map(|c| parse_command(&c))
            .unwrap_or(clasp_command);

        let defaults = TokenStore::default_paths();
        let custom_path = credentials
            .get_str("customTokenPath")
            .map(PathBuf::from)
            .or_else(|| defaults.as_ref().map(|(custom, _)| custom.clone()));
        let clasprc_path = credentials
            .get_str("clasprcPath")
            .map(PathBuf::from)
            .or_else(|| defaults.as_ref().map(|(_, rc)| rc.clone()));
        let (Some(custom_path), Some(clasprc_path)) = (custom_path, clasprc_path) else {
            return Err(Error::Config(
                "Cannot locate the home directory for clasp credentials".into(),
            ));
        };

        let api = ApiClient::new(http.clone(), descriptor, credentials);
        let token_url = api.build_api_url("token", &[], Some("oauth"))?;

        Ok(Self {
            tokens: TokenStore::new(http, custom_path, clasprc_path, token_url),
            clasp: ClaspRunner::new(clasp_command),
            workspace: workspace.into(),
            api,
        })
    }

    fn name(&self) -> &str {
        self.api.platform_name()
    }

    fn scripts_dir(&self) -> PathBuf {
        self.storage_directory()
    }

    fn require_project(&self, scripts_dir: &Path, id: &str) -> Result<LocalScript> {
        project::find_local_project(scripts_dir, id)
            .ok_or_else(|| Error::NotFound(format!("Project for script {} not found locally.", id)))
    }

    async fn token(&self) -> Result<ValidToken> {
        self.tokens.get_valid_token().await?.ok_or_else(|| {
            Error::Config("No valid tokens found. Please run clasp login.".into())
        })
    }

    /// Drive listing. `Ok(None)` when no token is available.
    async fn list_via_drive(&self) -> Result<Option<Vec<Value>>> {
        let Some(token) = self.tokens.get_valid_token().await? else {
            return Ok(None);
        };
        info!("[{}] Using token from {}", self.name(), token.source.label());

        let url = self.api.build_api_url("scenarios", &[], None)?;
        let auth = bearer(&token.access_token)?;
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = ApiRequest::get()
                .query("q", SCRIPT_MIME_QUERY)
                .query("fields", DRIVE_LIST_FIELDS)
                .query("pageSize", "100");
            if let Some(page) = &page_token {
                request = request.query("pageToken", page.clone());
            }

            let data = self.api.send(&url, request, auth.clone()).await?;
            let Some(page) = data.get("files").and_then(Value::as_array) else {
                return Err(self.api.error("Drive response has no file list"));
            };
            files.extend(page.iter().cloned());

            page_token = str_field(&data, "nextPageToken");
            if page_token.is_none() {
                break;
            }
        }

        info!("[{}] Direct API found {} scripts", self.name(), files.len());
        Ok(Some(files))
    }

    async fn list_via_clasp(&self) -> Result<Vec<Value>> {
        std::fs::create_dir_all(&self.workspace)?;
        let output = self
            .clasp
            .run(&["list"], &self.workspace)
            .await
            .map_err(|e| self.api.error(format!("Failed to list scripts via CLI: {}", e)))?;
        Ok(parse_clasp_list(&output)
            .into_iter()
            .map(|s| json!({ "id": s.id, "name": s.name }))
            .collect())
    }

    fn mark_local(&self, mut scenarios: Vec<Scenario>) -> Vec<Scenario> {
        let local: HashSet<String> = project::local_projects(&self.scripts_dir())
            .into_iter()
            .map(|p| p.script_id)
            .collect();
        for scenario in &mut scenarios {
            scenario.is_local = Some(local.contains(&scenario.id.to_string()));
        }
        scenarios
    }

    /// Display name from Drive, or `project-<id>`.
    async fn script_title(&self, id: &str) -> String {
        let fallback = format!("project-{}", id);
        let result: Result<Option<String>> = async {
            let Some(token) = self.tokens.get_valid_token().await? else {
                return Ok(None);
            };
            let url = self.api.build_api_url("scenario", &[("id", id)], None)?;
            let data = self
                .api
                .send(&url, ApiRequest::get().query("fields", "name"), bearer(&token.access_token)?)
                .await?;
            Ok(str_field(&data, "name"))
        }
        .await;

        match result {
            Ok(Some(name)) => name,
            Ok(None) => fallback,
            Err(e) => {
                warn!("[{}] Could not fetch script name, using default: {}", self.name(), e);
                fallback
            }
        }
    }

    /// Create `scripts_dir/<safe name>` and run `args` in it. The folder is
    /// removed again if it is still empty after a failure.
    async fn run_in_new_project(
        &self,
        scripts_dir: &Path,
        title: &str,
        args: &[&str],
        action: &str,
    ) -> Result<PathBuf> {
        let safe_name = project::sanitize_name(title);
        let project_path = scripts_dir.join(&safe_name);
        if project_path.exists() {
            return Err(self.api.error(format!(
                "Directory '{}' already exists. Please delete it or rename the project.",
                safe_name
            )));
        }
        std::fs::create_dir_all(&project_path)?;

        if let Err(e) = self.clasp.run(args, &project_path).await {
            project::remove_if_empty(&project_path);
            return Err(self.api.error(format!("Failed to {}: {}", action, e)));
        }
        Ok(project_path)
    }

    /// `clasp push -f` then `clasp deploy`. Returns both outputs.
    async fn push_and_deploy(&self, project_path: &Path, description: &str) -> Result<String> {
        let pushed = self.clasp.run(&["push", "-f"], project_path).await?;
        let deployed = self
            .clasp
            .run(&["deploy", "--description", description], project_path)
            .await?;
        Ok(format!("{}{}", pushed, deployed))
    }

    fn write_new_tracking(&self, project_path: &Path, script_id: &str) -> Result<ProjectTracking> {
        let now = now_iso();
        let mut record = ProjectTracking {
            script_id: Some(script_id.to_string()),
            ..Default::default()
        };
        record.mark_created(&now);
        record.stamp(SyncOperation::Pull, &now);
        write_record_in(project_path, &self.descriptor().storage.metadata_file, &record)?;
        Ok(record)
    }

    fn update_tracking(&self, project_path: &Path, script_id: &str, op: SyncOperation) -> ProjectTracking {
        let path = project_path.join(&self.descriptor().storage.metadata_file);
        let mut record: ProjectTracking = tracking::read_record_lenient(&path).unwrap_or_default();
        if record.script_id.is_none() {
            record.script_id = Some(script_id.to_string());
        }
        record.stamp(op, &now_iso());
        if let Err(e) = tracking::write_record(&path, &record) {
            warn!("[{}] Failed to update tracking file: {}", self.name(), e);
        }
        record
    }
}

fn write_record_in(dir: &Path, file: &str, record: &ProjectTracking) -> Result<()> {
    tracking::write_record(&dir.join(file), record)
}

#[async_trait]
impl PlatformAdapter for AppScriptAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::AppScript
    }

    fn descriptor(&self) -> &PlatformDescriptor {
        self.api.descriptor()
    }

    fn workspace_path(&self) -> &Path {
        &self.workspace
    }

    fn normalize_scenario(&self, raw: Value) -> Scenario {
        let id = ScenarioId::from_value(raw.get("id").unwrap_or(&Value::Null));
        let name = str_field(&raw, "name").unwrap_or_else(|| "Untitled Script".into());
        let url = str_field(&raw, "webViewLink").or_else(|| self.web_url(&id.to_string()));
        let mut scenario = Scenario::new(id, name, PlatformId::AppScript, Value::Null);
        scenario.is_active = true;
        scenario.last_modified = str_field(&raw, "modifiedTime");
        scenario.url = url;
        scenario.raw = raw;
        scenario
    }

    async fn get_scenarios(&self) -> Result<Vec<Scenario>> {
        info!("[{}] Fetching available scripts...", self.name());

        let raw = match self.list_via_drive().await {
            Ok(Some(files)) => files,
            Ok(None) => {
                info!("[{}] No OAuth token, listing with clasp", self.name());
                self.list_via_clasp().await?
            }
            Err(e) => {
                warn!("[{}] Direct API failed, falling back to CLI: {}", self.name(), e);
                self.list_via_clasp().await?
            }
        };

        let scenarios = raw
            .into_iter()
            .map(|r| self.normalize_scenario(r))
            .collect();
        Ok(self.mark_local(scenarios))
    }

    async fn get_scenario_details(&self, id: &str) -> Result<Scenario> {
        let token = self.token().await?;
        let url = self.api.build_api_url("scenario", &[("id", id)], None)?;
        let data = self
            .api
            .send(
                &url,
                ApiRequest::get().query("fields", DRIVE_FILE_FIELDS),
                bearer(&token.access_token)?,
            )
            .await?;
        let scenario = self.normalize_scenario(data);
        Ok(self.mark_local(vec![scenario]).remove(0))
    }

    /// `local_path` is the scripts directory. An existing project is pulled
    /// in place; otherwise the script is cloned into a new folder.
    async fn pull_scenario(&self, id: &str, local_path: &Path) -> Result<PullResult> {
        if let Some(project) = project::find_local_project(local_path, id) {
            info!("[{}] Pulling {} in {}...", self.name(), project.name, project.path.display());
            self.clasp
                .run(&["pull"], &project.path)
                .await
                .map_err(|e| self.api.error(format!("Failed to pull project: {}", e)))?;
            let record = self.update_tracking(&project.path, id, SyncOperation::Pull);
            return Ok(PullResult {
                success: true,
                scenario_id: id.to_string(),
                local_path: project.path.to_string_lossy().into_owned(),
                metadata: serde_json::to_value(&record)?,
            });
        }

        let title = self.script_title(id).await;
        info!("[{}] Cloning script {} ({})...", self.name(), title, id);
        let project_path = self
            .run_in_new_project(local_path, &title, &["clone", id], "clone script")
            .await?;
        let record = self.write_new_tracking(&project_path, id)?;

        Ok(PullResult {
            success: true,
            scenario_id: id.to_string(),
            local_path: project_path.to_string_lossy().into_owned(),
            metadata: serde_json::to_value(&record)?,
        })
    }

    async fn push_scenario(&self, id: &str, local_path: &Path) -> Result<PushResult> {
        let project = self.require_project(local_path, id)?;
        info!("[{}] Pushing {}...", self.name(), project.name);
        self.clasp
            .run(&["push", "-f"], &project.path)
            .await
            .map_err(|e| self.api.error(format!("Failed to push: {}", e)))?;

        let record = self.update_tracking(&project.path, id, SyncOperation::Push);
        Ok(PushResult {
            success: true,
            scenario_id: id.to_string(),
            pushed_at: record.last_push.unwrap_or_else(now_iso),
        })
    }

    /// Options: `type` (sheets, docs, webapp, ...; default standalone) and `parentId`.
    async fn create_scenario(&self, name: &str, options: Value) -> Result<Scenario> {
        info!("[{}] Creating new script: {}", self.name(), name);
        let script_type = str_field(&options, "type").unwrap_or_else(|| DEFAULT_SCRIPT_TYPE.into());
        let parent_id = str_field(&options, "parentId");

        let mut args = vec!["create", "--title", name, "--type", script_type.as_str()];
        if let Some(parent) = &parent_id {
            args.extend(["--parentId", parent.as_str()]);
        }

        let scripts_dir = self.scripts_dir();
        let project_path = self
            .run_in_new_project(&scripts_dir, name, &args, "create script")
            .await?;

        let Some(script_id) = project::read_script_id(&project_path) else {
            project::discard_project(&project_path);
            return Err(self.api.error(format!(
                "clasp create finished but {} has no scriptId in {}",
                CLASP_CONFIG_FILE,
                project_path.display()
            )));
        };
        self.write_new_tracking(&project_path, &script_id)?;

        let mut scenario = self.normalize_scenario(json!({
            "id": script_id,
            "name": name,
            "path": project_path.to_string_lossy(),
        }));
        scenario.is_local = Some(true);
        Ok(scenario)
    }

    async fn delete_scenario(&self, id: &str) -> Result<bool> {
        warn!(
            "[{}] Deleting script {} is not supported; remove it from Google Drive",
            self.name(),
            id
        );
        Ok(false)
    }

    async fn test_connection(&self) -> ConnectionStatus {
        match self.tokens.get_valid_token().await {
            Ok(Some(token)) => ConnectionStatus::ok(format!("Connected via {}", token.source.label())),
            Ok(None) => {
                let message = "No valid tokens found. Please run clasp login.";
                ConnectionStatus::failed(message, message)
            }
            Err(e) => ConnectionStatus::failed("Failed to read Google credentials", e.to_string()),
        }
    }

    fn list_local(&self) -> Result<Vec<LocalProject>> {
        let metadata_file = &self.descriptor().storage.metadata_file;
        Ok(project::local_projects(&self.scripts_dir())
            .into_iter()
            .map(|p| {
                let record: ProjectTracking =
                    tracking::read_record_lenient(&p.path.join(metadata_file)).unwrap_or_default();
                LocalProject {
                    id: p.script_id,
                    name: p.name,
                    path: p.path.to_string_lossy().into_owned(),
                    last_pull: record.last_pull,
                    last_push: record.last_push,
                }
            })
            .collect())
    }

    async fn run_function(
        &self,
        id: &str,
        function_name: &str,
        params: Option<Value>,
    ) -> Result<RunResult> {
        let project = self.require_project(&self.scripts_dir(), id)?;
        info!("[{}] Running {} in {}...", self.name(), function_name, project.name);

        let params = params.map(|p| p.to_string());
        let mut args = vec!["run", function_name];
        if let Some(params) = &params {
            args.extend(["--params", params.as_str()]);
        }

        let output = self
            .clasp
            .run(&args, &project.path)
            .await
            .map_err(|e| self.api.error(format!("Execution failed: {}", e)))?;
        Ok(RunResult {
            success: true,
            message: format!("Successfully ran function {}", function_name),
            output,
        })
    }

    async fn get_logs(&self, id: &str, options: LogsOptions) -> Result<LogsResult> {
        let project = self.require_project(&self.scripts_dir(), id)?;
        info!("[{}] Fetching logs for {}...", self.name(), project.name);

        let mut args = vec!["logs"];
        if options.setup {
            args.push("--setup");
        }
        let logs = self
            .clasp
            .run(&args, &project.path)
            .await
            .map_err(|e| self.api.error(format!("Failed to fetch logs: {}", e)))?;
        Ok(LogsResult {
            success: true,
            message: "Logs fetched successfully".into(),
            logs,
        })
    }

    async fn get_functions(&self, id: &str) -> Result<Vec<String>> {
        let project = self.require_project(&self.scripts_dir(), id)?;
        Ok(project::discover_functions(&project.path))
    }

    async fn deploy_scenario(&self, id: &str, options: DeployOptions) -> Result<DeployResult> {
        let project = self.require_project(&self.scripts_dir(), id)?;
        let mut history = deploy::read_history(&project.path)?;
        let version = deploy::next_version(&history, options.version.as_deref());
        let record_id = deploy::new_record_id(&history);
        info!("[{}] Deploying {} v{}...", self.name(), project.name, version);

        let tracking_file = self.descriptor().storage.metadata_file.clone();
        deploy::snapshot(&project.path, &record_id, &[tracking_file.as_str()])?;

        let message = options
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Deployed version {}", version));
        let mut record = DeploymentRecord::new(
            record_id.as_str(),
            version.as_str(),
            DeploymentKind::Deployment,
            message.as_str(),
            DeploymentStatus::InProgress,
        );
        record.backup_id = Some(record_id.clone());
        history.insert(0, record.clone());
        deploy::write_history(&project.path, &history)?;

        let description = format!("v{}: {}", version, message);
        let outcome = self.push_and_deploy(&project.path, &description).await;
        record.completed_at = Some(now_iso());
        match &outcome {
            Ok(output) => {
                record.status = DeploymentStatus::Completed;
                record.deployment_id = deploy::parse_deploy_output(output).map(|(id, _)| id);
            }
            Err(e) => {
                record.status = DeploymentStatus::Failed;
                record.error = Some(e.to_string());
            }
        }
        if let Some(entry) = history.iter_mut().find(|r| r.id == record_id) {
            *entry = record.clone();
        }
        deploy::write_history(&project.path, &history)?;

        let output = outcome.map_err(|e| {
            warn!("[{}] Deployment of {} failed: {}", self.name(), project.name, e);
            self.api.error(format!("Deployment failed: {}", e))
        })?;
        self.update_tracking(&project.path, id, SyncOperation::Push);
        info!("[{}] Deployed {} v{}", self.name(), project.name, version);

        Ok(DeployResult {
            success: true,
            message: format!("Successfully deployed {} v{}", project.name, version),
            deployment: record,
            output: Some(output),
        })
    }

    async fn deployment_history(&self, id: &str) -> Result<Vec<DeploymentRecord>> {
        let project = self.require_project(&self.scripts_dir(), id)?;
        deploy::read_history(&project.path)
    }

    /// Restores local files only. Push or deploy afterwards to apply them remotely.
    async fn rollback_scenario(&self, id: &str, version_id: &str) -> Result<DeployResult> {
        let project = self.require_project(&self.scripts_dir(), id)?;
        let mut history = deploy::read_history(&project.path)?;
        let Some(target) = history.iter().find(|r| r.id == version_id).cloned() else {
            return Err(Error::NotFound(format!(
                "Version {} not found in deployment history",
                version_id
            )));
        };

        let backup_id = target.backup_id.clone().unwrap_or_else(|| target.id.clone());
        deploy::restore(&project.path, &backup_id)?;
        info!("[{}] Rolled {} back to v{}", self.name(), project.name, target.version);

        let mut record = DeploymentRecord::new(
            deploy::new_record_id(&history),
            target.version.as_str(),
            DeploymentKind::Rollback,
            format!("Rolled back to version {}", target.version),
            DeploymentStatus::Completed,
        );
        record.rolled_back_from = Some(
            history
                .first()
                .map(|r| r.version.clone())
                .unwrap_or_else(|| "unknown".into()),
        );
        record.completed_at = Some(now_iso());
        history.insert(0, record.clone());
        deploy::write_history(&project.path, &history)?;

        Ok(DeployResult {
            success: true,
            message: format!("Successfully rolled back to version {}", target.version),
            deployment: record,
            output: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlatformRegistry;

    fn adapter(workspace: &Path) -> AppScriptAdapter {
        let descriptor = PlatformRegistry::builtin()
            .get(PlatformId::AppScript)
            .unwrap()
            .clone();
        let credentials = Credentials::new()
            .with("customTokenPath", workspace.join("none.json").to_string_lossy().into_owned())
            .with("clasprcPath", workspace.join("none-rc.json").to_string_lossy().into_owned());
        AppScriptAdapter::new(
            Client::new(),
            descriptor,
            credentials,
            workspace,
            vec!["clasp".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_drive_file() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = adapter(dir.path()).normalize_scenario(json!({
            "id": "1xYz",
            "name": "Budget",
            "modifiedTime": "2024-05-01T08:00:00.000Z"
        }));
        assert_eq!(scenario.id, ScenarioId::Text("1xYz".into()));
        assert!(scenario.is_active);
        assert_eq!(
            scenario.url.as_deref(),
            Some("https://script.google.com/d/1xYz/edit")
        );

        let unnamed = adapter(dir.path()).normalize_scenario(json!({"id": "2"}));
        assert_eq!(unnamed.name, "Untitled Script");
    }

    #[tokio::test]
    async fn test_connection_without_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let status = adapter(dir.path()).test_connection().await;
        assert!(!status.success);
        assert!(status.error.unwrap().contains("clasp login"));
    }

    #[tokio::test]
    async fn test_push_requires_local_project() {
        let dir = tempfile::tempdir().unwrap();
        let appscript = adapter(dir.path());
        let err = appscript
            .push_scenario("missing", &appscript.storage_directory())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not found: Project for script missing not found locally.");
    }

    #[tokio::test]
    async fn test_get_functions_reads_project_sources() {
        let dir = tempfile::tempdir().unwrap();
        let appscript = adapter(dir.path());
        let project = appscript.storage_directory().join("Budget");
        tracking::write_record(&project.join(CLASP_CONFIG_FILE), &json!({"scriptId": "s1"})).unwrap();
        std::fs::write(project.join("Code.js"), "function report() {}").unwrap();

        assert_eq!(appscript.get_functions("s1").await.unwrap(), vec!["report"]);
        let local = appscript.list_local().unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].id, "s1");
    }
}
