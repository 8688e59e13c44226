//! n8n adapter for self-hosted and cloud instances.
//!
//! There is no fixed host: every URL is `<instanceUrl>/api/v1<endpoint>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use flowsync_core::{Error, Result};

use crate::adapter::{unwrap_list, unwrap_object, ApiClient, ApiRequest, PlatformAdapter};
use crate::registry::PlatformDescriptor;
use crate::tracking::{self, ScenarioMetadata};
use crate::types::*;

/// Fields the public API accepts on workflow update.
const WRITABLE_FIELDS: &[&str] = &["name", "nodes", "connections", "settings", "staticData"];

pub struct N8nAdapter {
    api: ApiClient,
    workspace: PathBuf,
    instance_url: String,
}

impl N8nAdapter {
    /// Requires `instanceUrl` (validated, trailing slash stripped) and `apiKey`.
    pub fn new(
        http: Client,
        descriptor: PlatformDescriptor,
        credentials: Credentials,
        workspace: impl Into<PathBuf>,
    ) -> Result<Self> {
        let instance_url = credentials
            .get_str("instanceUrl")
            .ok_or_else(|| Error::Config("n8n instance URL is required".into()))?;
        Url::parse(&instance_url).map_err(|e| {
            Error::Config(format!("Invalid n8n instance URL '{}': {}", instance_url, e))
        })?;
        credentials.require("apiKey", &descriptor.name)?;

        Ok(Self {
            api: ApiClient::new(http, descriptor, credentials),
            workspace: workspace.into(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn url(&self, endpoint_key: &str, params: &[(&str, &str)]) -> Result<String> {
        let base = format!("{}/api/v1", self.instance_url);
        self.api.build_url_with_base(&base, endpoint_key, params)
    }

    fn name(&self) -> &str {
        self.api.platform_name()
    }
}

/// Keep only the fields n8n accepts on update.
fn update_body(workflow: &Value) -> Value {
    let mut body = Map::new();
    for key in WRITABLE_FIELDS {
        if let Some(value) = workflow.get(*key).filter(|v| !v.is_null()) {
            body.insert(key.to_string(), value.clone());
        }
    }
    if !body.contains_key("settings") {
        body.insert("settings".into(), json!({}));
    }
    Value::Object(body)
}

#[async_trait]
impl PlatformAdapter for N8nAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::N8n
    }

    fn descriptor(&self) -> &PlatformDescriptor {
        self.api.descriptor()
    }

    fn workspace_path(&self) -> &Path {
        &self.workspace
    }

    fn web_url(&self, id: &str) -> Option<String> {
        Some(format!("{}/workflow/{}", self.instance_url, id))
    }

    fn normalize_scenario(&self, raw: Value) -> Scenario {
        let id = ScenarioId::from_value(raw.get("id").unwrap_or(&Value::Null));
        let name = str_field(&raw, "name").unwrap_or_else(|| "Untitled Workflow".into());
        let mut scenario = Scenario::new(id, name, PlatformId::N8n, Value::Null);
        scenario.is_active = raw.get("active").and_then(Value::as_bool).unwrap_or(false);
        scenario.last_modified = str_field(&raw, "updatedAt");
        scenario.description = str_field(&raw, "description");
        scenario.operations = array_len(&raw, "nodes");
        scenario.tags = raw
            .get("tags")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        scenario.raw = raw;
        scenario
    }

    async fn get_scenarios(&self) -> Result<Vec<Scenario>> {
        info!("[{}] Fetching workflows from {}...", self.name(), self.instance_url);
        let url = self.url("scenarios", &[])?;
        let data = self.api.request(&url, ApiRequest::get()).await?;
        let workflows = unwrap_list(data, &["data"])
            .ok_or_else(|| self.api.error("Unexpected response: no workflow list"))?;
        Ok(workflows
            .into_iter()
            .map(|raw| self.normalize_scenario(raw))
            .collect())
    }

    async fn get_scenario_details(&self, id: &str) -> Result<Scenario> {
        let url = self.url("scenario", &[("id", id)])?;
        let data = self.api.request(&url, ApiRequest::get()).await?;
        Ok(self.normalize_scenario(unwrap_object(data, "data")))
    }

    async fn pull_scenario(&self, id: &str, local_path: &Path) -> Result<PullResult> {
        info!("[{}] Pulling workflow {}...", self.name(), id);
        tracking::validate_id(id)?;
        let workflow = self.get_scenario_details(id).await?;

        let metadata =
            ScenarioMetadata::new(workflow.id.clone(), workflow.name.clone(), PlatformId::N8n)
                .with("instanceUrl", self.instance_url.clone())
                .with("active", workflow.is_active)
                .with("tags", Value::Array(workflow.tags.clone()));

        let (dir, metadata) = tracking::write_pulled(
            local_path,
            &self.descriptor().storage,
            id,
            metadata,
            &workflow.raw,
        )?;

        info!("[{}] Pulled workflow to {}", self.name(), dir.display());
        Ok(PullResult {
            success: true,
            scenario_id: id.to_string(),
            local_path: dir.to_string_lossy().into_owned(),
            metadata: serde_json::to_value(&metadata)?,
        })
    }

    async fn push_scenario(&self, id: &str, local_path: &Path) -> Result<PushResult> {
        info!("[{}] Pushing workflow {}...", self.name(), id);
        let storage = &self.descriptor().storage;
        let workflow = tracking::read_body(local_path, storage, id)?;

        let url = self.url("scenario", &[("id", id)])?;
        self.api
            .request(&url, ApiRequest::with_body(Method::PUT, update_body(&workflow)))
            .await?;

        let pushed_at = tracking::stamp_push(local_path, storage, PlatformId::N8n, id)?;
        info!("[{}] Pushed workflow {}", self.name(), id);
        Ok(PushResult {
            success: true,
            scenario_id: id.to_string(),
            pushed_at,
        })
    }

    async fn create_scenario(&self, name: &str, options: Value) -> Result<Scenario> {
        info!("[{}] Creating workflow: {}", self.name(), name);
        let mut body = json!({
            "name": name,
            "nodes": [],
            "connections": {},
            "settings": {},
        });
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), options) {
            target.extend(extra);
        }

        let url = self.url("scenarios", &[])?;
        let data = self
            .api
            .request(&url, ApiRequest::with_body(Method::POST, body))
            .await?;
        Ok(self.normalize_scenario(unwrap_object(data, "data")))
    }

    async fn delete_scenario(&self, id: &str) -> Result<bool> {
        let url = self.url("scenario", &[("id", id)])?;
        match self.api.request(&url, ApiRequest::delete()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("[{}] Failed to delete workflow {}: {}", self.name(), id, e);
                Ok(false)
            }
        }
    }

    async fn test_connection(&self) -> ConnectionStatus {
        // No user endpoint; listing workflows proves the key works.
        let result: Result<Value> = async {
            let url = self.url("scenarios", &[])?;
            self.api.request(&url, ApiRequest::get()).await
        }
        .await;

        let status = match result {
            Ok(_) => ConnectionStatus::ok("Successfully connected to n8n instance"),
            Err(e) => ConnectionStatus::failed(
                "Failed to connect to n8n instance. Please verify your instance URL and API key.",
                e.to_string(),
            ),
        };
        ConnectionStatus {
            instance_url: Some(self.instance_url.clone()),
            ..status
        }
    }
}
