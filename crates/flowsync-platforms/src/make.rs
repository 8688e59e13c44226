//! Make.com adapter.
//!
//! Make accounts live behind one of several regional hosts. Listing probes
//! regions (and, within a region, team/organization scoping) until one answers
//! with a scenario list, then sticks to that region for later calls.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use flowsync_core::Result;

use crate::adapter::{unwrap_list, unwrap_object, ApiClient, ApiRequest, PlatformAdapter};
use crate::registry::PlatformDescriptor;
use crate::tracking::{self, ScenarioMetadata};
use crate::types::*;

/// Fixed fallback order after the configured region.
const FALLBACK_REGIONS: &[&str] = &["eu1", "us1", "ap1", "www"];

/// Query scoping tried against the scenarios endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Scope {
    Team(String),
    Organization(String),
    Unscoped,
}

impl Scope {
    fn query(&self) -> Option<(&'static str, &str)> {
        match self {
            Scope::Team(id) => Some(("teamId", id)),
            Scope::Organization(id) => Some(("organizationId", id)),
            Scope::Unscoped => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Team(id) => write!(f, "teamId={}", id),
            Scope::Organization(id) => write!(f, "organizationId={}", id),
            Scope::Unscoped => f.write_str("unscoped"),
        }
    }
}

/// Which region/scope combination last produced a scenario list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub region: String,
    pub scope: Scope,
}

pub struct MakeAdapter {
    api: ApiClient,
    workspace: PathBuf,
    region: RwLock<String>,
    probe: RwLock<Option<ProbeOutcome>>,
}

impl MakeAdapter {
    /// Requires an `apiToken`. `region` defaults to the descriptor's default.
    pub fn new(
        http: Client,
        descriptor: PlatformDescriptor,
        credentials: Credentials,
        workspace: impl Into<PathBuf>,
    ) -> Result<Self> {
        credentials.require("apiToken", &descriptor.name)?;
        let region = credentials
            .get_str("region")
            .unwrap_or_else(|| descriptor.default_region.clone());
        descriptor.base_url(&region)?;

        Ok(Self {
            api: ApiClient::new(http, descriptor, credentials),
            workspace: workspace.into(),
            region: RwLock::new(region),
            probe: RwLock::new(None),
        })
    }

    /// Region used for non-listing calls.
    pub fn region(&self) -> String {
        self.region.read().clone()
    }

    /// Last successful listing combination, if any.
    pub fn probe_outcome(&self) -> Option<ProbeOutcome> {
        self.probe.read().clone()
    }

    /// Current region first, then the fixed fallbacks, limited to configured hosts.
    fn probe_regions(&self) -> Vec<String> {
        let current = self.region();
        let mut regions: Vec<String> = Vec::new();
        for region in std::iter::once(current.as_str()).chain(FALLBACK_REGIONS.iter().copied()) {
            if self.api.descriptor().base_urls.contains_key(region)
                && !regions.iter().any(|r| r == region)
            {
                regions.push(region.to_string());
            }
        }
        regions
    }

    fn scopes(&self) -> Vec<Scope> {
        let creds = self.api.credentials();
        let mut scopes = Vec::new();
        if let Some(team) = creds.get_str("teamId") {
            scopes.push(Scope::Team(team));
        }
        if let Some(org) = creds.get_str("organizationId") {
            scopes.push(Scope::Organization(org));
        }
        scopes.push(Scope::Unscoped);
        scopes
    }

    fn scenario_url(&self, id: &str) -> Result<String> {
        self.api
            .build_api_url("scenario", &[("id", id)], Some(&self.region()))
    }

    fn name(&self) -> &str {
        self.api.platform_name()
    }
}

#[async_trait]
impl PlatformAdapter for MakeAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Make
    }

    fn descriptor(&self) -> &PlatformDescriptor {
        self.api.descriptor()
    }

    fn workspace_path(&self) -> &Path {
        &self.workspace
    }

    fn normalize_scenario(&self, raw: Value) -> Scenario {
        let id = ScenarioId::from_value(raw.get("id").unwrap_or(&Value::Null));
        let name = str_field(&raw, "name").unwrap_or_else(|| "Untitled Scenario".into());
        let mut scenario = Scenario::new(id, name, PlatformId::Make, Value::Null);
        scenario.is_active = raw
            .pointer("/scheduling/active")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        scenario.last_modified = str_field(&raw, "updatedAt");
        scenario.description = str_field(&raw, "description");
        scenario.operations = array_len(&raw, "flow");
        scenario.folder = Some(str_field(&raw, "folderName").unwrap_or_else(|| "Root".into()));
        scenario.raw = raw;
        scenario
    }

    async fn get_scenarios(&self) -> Result<Vec<Scenario>> {
        info!("[{}] Fetching scenarios...", self.name());

        for region in self.probe_regions() {
            let url = match self.api.build_api_url("scenarios", &[], Some(&region)) {
                Ok(url) => url,
                Err(e) => {
                    warn!("[{}] Skipping region {}: {}", self.name(), region, e);
                    continue;
                }
            };

            for scope in self.scopes() {
                let mut request = ApiRequest::get();
                if let Some((key, value)) = scope.query() {
                    request = request.query(key, value);
                }

                match self.api.request(&url, request).await {
                    Ok(data) => match unwrap_list(data, &["scenarios"]) {
                        Some(items) => {
                            info!(
                                "[{}] Found {} scenarios in {} ({})",
                                self.name(),
                                items.len(),
                                region,
                                scope
                            );
                            *self.region.write() = region.clone();
                            *self.probe.write() = Some(ProbeOutcome {
                                region: region.clone(),
                                scope,
                            });
                            return Ok(items
                                .into_iter()
                                .map(|raw| self.normalize_scenario(raw))
                                .collect());
                        }
                        None => warn!(
                            "[{}] Unexpected response from {} ({}): no scenario list",
                            self.name(),
                            region,
                            scope
                        ),
                    },
                    Err(e) => warn!(
                        "[{}] Failed to fetch from {} ({}): {}",
                        self.name(),
                        region,
                        scope,
                        e
                    ),
                }
            }
        }

        Err(self.api.error("Failed to fetch scenarios from all regions"))
    }

    async fn get_scenario_details(&self, id: &str) -> Result<Scenario> {
        let url = self.scenario_url(id)?;
        let data = self.api.request(&url, ApiRequest::get()).await?;
        Ok(self.normalize_scenario(unwrap_object(data, "scenario")))
    }

    async fn pull_scenario(&self, id: &str, local_path: &Path) -> Result<PullResult> {
        info!("[{}] Pulling scenario {}...", self.name(), id);
        tracking::validate_id(id)?;
        let scenario = self.get_scenario_details(id).await?;

        let mut metadata =
            ScenarioMetadata::new(scenario.id.clone(), scenario.name.clone(), PlatformId::Make);
        for key in ["teamId", "folderId", "scheduling"] {
            if let Some(value) = scenario.raw.get(key).filter(|v| !v.is_null()) {
                metadata = metadata.with(key, value.clone());
            }
        }

        let blueprint = scenario
            .raw
            .get("flow")
            .filter(|v| !v.is_null())
            .unwrap_or(&scenario.raw);
        let (dir, metadata) = tracking::write_pulled(
            local_path,
            &self.descriptor().storage,
            id,
            metadata,
            blueprint,
        )?;

        info!("[{}] Pulled scenario to {}", self.name(), dir.display());
        Ok(PullResult {
            success: true,
            scenario_id: id.to_string(),
            local_path: dir.to_string_lossy().into_owned(),
            metadata: serde_json::to_value(&metadata)?,
        })
    }

    async fn push_scenario(&self, id: &str, local_path: &Path) -> Result<PushResult> {
        info!("[{}] Pushing scenario {}...", self.name(), id);
        let storage = &self.descriptor().storage;
        let blueprint = tracking::read_body(local_path, storage, id)?;

        let url = self.scenario_url(id)?;
        self.api
            .request(
                &url,
                ApiRequest::with_body(Method::PATCH, json!({ "flow": blueprint })),
            )
            .await?;

        let pushed_at = tracking::stamp_push(local_path, storage, PlatformId::Make, id)?;
        info!("[{}] Pushed scenario {}", self.name(), id);
        Ok(PushResult {
            success: true,
            scenario_id: id.to_string(),
            pushed_at,
        })
    }

    async fn create_scenario(&self, name: &str, options: Value) -> Result<Scenario> {
        info!("[{}] Creating scenario: {}", self.name(), name);

        let mut body = json!({
            "name": name,
            "flow": [],
            "scheduling": { "type": "indefinitely" },
        });
        if let Some(target) = body.as_object_mut() {
            if let Value::Object(extra) = options {
                target.extend(extra);
            }
            if !target.contains_key("teamId") {
                if let Some(team) = self.api.credentials().get_str("teamId") {
                    let team = team.parse::<i64>().map(Value::from).unwrap_or(Value::String(team));
                    target.insert("teamId".into(), team);
                }
            }
        }

        let url = self
            .api
            .build_api_url("scenarios", &[], Some(&self.region()))?;
        let data = self
            .api
            .request(&url, ApiRequest::with_body(Method::POST, body))
            .await?;
        Ok(self.normalize_scenario(unwrap_object(data, "scenario")))
    }

    async fn delete_scenario(&self, id: &str) -> Result<bool> {
        let url = self.scenario_url(id)?;
        match self.api.request(&url, ApiRequest::delete()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("[{}] Failed to delete scenario {}: {}", self.name(), id, e);
                Ok(false)
            }
        }
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let result: Result<Value> = async {
            let url = self.api.build_api_url("user", &[], Some(&self.region()))?;
            self.api.request(&url, ApiRequest::get()).await
        }
        .await;

        match result {
            Ok(data) => ConnectionStatus {
                user: Some(
                    data.pointer("/authUser/email")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown")
                        .to_string(),
                ),
                region: Some(self.region()),
                ..ConnectionStatus::ok("Successfully connected to Make.com API")
            },
            Err(e) => ConnectionStatus::failed("Failed to connect to Make.com API", e.to_string()),
        }
    }
}
