//! Zapier adapter. Read-only: Zaps can be listed and pulled, but every
//! mutation is refused with a pointer to Zapier's own editor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use flowsync_core::{Error, Result};

use crate::adapter::{unwrap_list, ApiClient, ApiRequest, PlatformAdapter};
use crate::registry::PlatformDescriptor;
use crate::tracking::{self, ScenarioMetadata};
use crate::types::*;

const EDITOR_URL: &str = "https://zapier.com/app/editor";

pub struct ZapierAdapter {
    api: ApiClient,
    workspace: PathBuf,
}

impl ZapierAdapter {
    /// Requires an `apiKey`.
    pub fn new(
        http: Client,
        descriptor: PlatformDescriptor,
        credentials: Credentials,
        workspace: impl Into<PathBuf>,
    ) -> Result<Self> {
        credentials.require("apiKey", &descriptor.name)?;
        Ok(Self {
            api: ApiClient::new(http, descriptor, credentials),
            workspace: workspace.into(),
        })
    }

    fn name(&self) -> &str {
        self.api.platform_name()
    }
}

#[async_trait]
impl PlatformAdapter for ZapierAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Zapier
    }

    fn descriptor(&self) -> &PlatformDescriptor {
        self.api.descriptor()
    }

    fn workspace_path(&self) -> &Path {
        &self.workspace
    }

    fn normalize_scenario(&self, raw: Value) -> Scenario {
        let id = ScenarioId::from_value(raw.get("id").unwrap_or(&Value::Null));
        let name = str_field(&raw, "title")
            .or_else(|| str_field(&raw, "name"))
            .unwrap_or_else(|| "Untitled Zap".into());
        let mut scenario = Scenario::new(id, name, PlatformId::Zapier, Value::Null);
        scenario.is_active = raw.get("state").and_then(Value::as_str) == Some("on");
        scenario.last_modified = str_field(&raw, "modified_at");
        scenario.description = str_field(&raw, "description");
        scenario.operations = array_len(&raw, "steps");
        scenario.url = str_field(&raw, "url");
        scenario.raw = raw;
        scenario
    }

    async fn get_scenarios(&self) -> Result<Vec<Scenario>> {
        info!("[{}] Fetching Zaps...", self.name());
        let url = self.api.build_api_url("scenarios", &[], None)?;
        let data = self.api.request(&url, ApiRequest::get()).await?;
        let zaps = unwrap_list(data, &["objects", "data"])
            .ok_or_else(|| self.api.error("Unexpected response: no Zap list"))?;
        Ok(zaps
            .into_iter()
            .map(|raw| self.normalize_scenario(raw))
            .collect())
    }

    async fn get_scenario_details(&self, id: &str) -> Result<Scenario> {
        let url = self.api.build_api_url("scenario", &[("id", id)], None)?;
        let data = self.api.request(&url, ApiRequest::get()).await?;
        Ok(self.normalize_scenario(data))
    }

    async fn pull_scenario(&self, id: &str, local_path: &Path) -> Result<PullResult> {
        info!("[{}] Pulling Zap {}...", self.name(), id);
        tracking::validate_id(id)?;
        let zap = self.get_scenario_details(id).await?;

        let mut metadata =
            ScenarioMetadata::new(zap.id.clone(), zap.name.clone(), PlatformId::Zapier);
        for key in ["state", "url"] {
            if let Some(value) = zap.raw.get(key).filter(|v| !v.is_null()) {
                metadata = metadata.with(key, value.clone());
            }
        }

        let (dir, metadata) = tracking::write_pulled(
            local_path,
            &self.descriptor().storage,
            id,
            metadata,
            &zap.raw,
        )?;

        info!("[{}] Pulled Zap to {}", self.name(), dir.display());
        Ok(PullResult {
            success: true,
            scenario_id: id.to_string(),
            local_path: dir.to_string_lossy().into_owned(),
            metadata: serde_json::to_value(&metadata)?,
        })
    }

    async fn push_scenario(&self, id: &str, _local_path: &Path) -> Result<PushResult> {
        Err(Error::Unsupported(format!(
            "Zapier API does not support programmatic updates to Zaps. Please edit your Zap at {}/{}",
            EDITOR_URL, id
        )))
    }

    async fn create_scenario(&self, _name: &str, _options: Value) -> Result<Scenario> {
        Err(Error::Unsupported(format!(
            "Zapier API requires OAuth and complex setup for creating Zaps. Please create Zaps directly in the Zapier editor at {}",
            EDITOR_URL
        )))
    }

    async fn delete_scenario(&self, id: &str) -> Result<bool> {
        Err(Error::Unsupported(format!(
            "Zapier API does not support deleting Zaps programmatically. Please delete your Zap at {}/{}",
            EDITOR_URL, id
        )))
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let result: Result<Value> = async {
            let url = self.api.build_api_url("user", &[], None)?;
            self.api.request(&url, ApiRequest::get()).await
        }
        .await;

        match result {
            Ok(data) => ConnectionStatus {
                user: Some(
                    str_field(&data, "email")
                        .or_else(|| str_field(&data, "full_name"))
                        .unwrap_or_else(|| "Unknown".into()),
                ),
                ..ConnectionStatus::ok("Successfully connected to Zapier API")
            },
            Err(e) => ConnectionStatus::failed(
                format!(
                    "Failed to connect to Zapier API. Please verify your API key at {}",
                    self.descriptor()
                        .settings_url
                        .as_deref()
                        .unwrap_or("https://zapier.com/app/settings/api")
                ),
                e.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlatformRegistry;
    use serde_json::json;

    fn adapter() -> ZapierAdapter {
        let descriptor = PlatformRegistry::builtin()
            .get(PlatformId::Zapier)
            .unwrap()
            .clone();
        ZapierAdapter::new(
            Client::new(),
            descriptor,
            Credentials::new().with("apiKey", "zk"),
            "/tmp/flowsync",
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_maps_state() {
        let zapier = adapter();
        let on = zapier.normalize_scenario(json!({
            "id": "z1",
            "title": "Leads to Slack",
            "state": "on",
            "steps": [{}, {}],
            "modified_at": "2024-03-01T10:00:00Z"
        }));
        assert!(on.is_active);
        assert_eq!(on.name, "Leads to Slack");
        assert_eq!(on.operations, 2);

        let off = zapier.normalize_scenario(json!({"id": 5, "state": "off"}));
        assert!(!off.is_active);
        assert_eq!(off.name, "Untitled Zap");
    }

    #[tokio::test]
    async fn test_mutations_always_refused() {
        let zapier = adapter();
        let dir = tempfile::tempdir().unwrap();
        for id in ["1", "abc", ""] {
            let push = zapier.push_scenario(id, dir.path()).await.unwrap_err();
            assert!(push.to_string().contains(EDITOR_URL));
            let delete = zapier.delete_scenario(id).await.unwrap_err();
            assert!(delete.to_string().contains(EDITOR_URL));
        }
        let create = zapier.create_scenario("New", json!({})).await.unwrap_err();
        assert!(matches!(create, Error::Unsupported(_)));
        assert!(create.to_string().contains(EDITOR_URL));
    }

    #[test]
    fn test_web_url() {
        assert_eq!(
            adapter().web_url("z1").as_deref(),
            Some("https://zapier.com/app/editor/z1")
        );
    }
}
