//! The platform adapter contract and the HTTP helpers every adapter shares.
//!
//! `PlatformAdapter` is the single seam between the manager and a platform.
//! The seven core operations have no default: each adapter must say what
//! they mean on its platform. Optional capabilities (function runs, logs,
//! function discovery, deployments) default to a descriptive "unsupported"
//! error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use flowsync_core::{Error, Result};

use crate::registry::{AuthType, Feature, PlatformDescriptor};
use crate::tracking;
use crate::types::*;

/// Operations every platform integration provides.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform_id(&self) -> PlatformId;

    fn descriptor(&self) -> &PlatformDescriptor;

    /// Root under which the platform's storage directory lives.
    fn workspace_path(&self) -> &Path;

    /// Map a raw platform payload onto the common `Scenario` shape.
    /// Total: any object with an `id` yields a scenario with a defaulted name.
    fn normalize_scenario(&self, raw: Value) -> Scenario;

    /// Fetch all remote scenarios, normalized.
    async fn get_scenarios(&self) -> Result<Vec<Scenario>>;

    /// Fetch one scenario with its full raw payload.
    async fn get_scenario_details(&self, id: &str) -> Result<Scenario>;

    /// Materialize metadata + body under `local_path/<id>/`. Overwrites.
    async fn pull_scenario(&self, id: &str, local_path: &Path) -> Result<PullResult>;

    /// Submit the local body as an update, then stamp `lastPush`.
    async fn push_scenario(&self, id: &str, local_path: &Path) -> Result<PushResult>;

    async fn create_scenario(&self, name: &str, options: Value) -> Result<Scenario>;

    /// Best-effort delete. `Ok(false)` when the platform refused.
    async fn delete_scenario(&self, id: &str) -> Result<bool>;

    /// Cheap read-only credential check.
    async fn test_connection(&self) -> ConnectionStatus;

    fn storage_directory(&self) -> PathBuf {
        self.workspace_path()
            .join(&self.descriptor().storage.directory)
    }

    fn supports_feature(&self, feature: Feature) -> bool {
        self.descriptor().features.supports(feature)
    }

    /// Link to the scenario in the platform's own editor.
    fn web_url(&self, id: &str) -> Option<String> {
        self.descriptor()
            .web_url
            .as_ref()
            .map(|template| template.replace(":id", id))
    }

    /// Items already pulled to disk.
    fn list_local(&self) -> Result<Vec<LocalProject>> {
        Ok(tracking::scan_scenario_dirs(
            &self.storage_directory(),
            &self.descriptor().storage.metadata_file,
        ))
    }

    async fn run_function(
        &self,
        _id: &str,
        _function_name: &str,
        _params: Option<Value>,
    ) -> Result<RunResult> {
        Err(unsupported(self.descriptor(), "direct execution"))
    }

    async fn get_logs(&self, _id: &str, _options: LogsOptions) -> Result<LogsResult> {
        Err(unsupported(self.descriptor(), "fetching logs"))
    }

    async fn get_functions(&self, _id: &str) -> Result<Vec<String>> {
        Err(unsupported(self.descriptor(), "listing functions"))
    }

    /// Snapshot, push and deploy, recording the attempt in the history.
    async fn deploy_scenario(&self, _id: &str, _options: DeployOptions) -> Result<DeployResult> {
        Err(unsupported(self.descriptor(), "deployments"))
    }

    /// Deployment history, newest first.
    async fn deployment_history(&self, _id: &str) -> Result<Vec<DeploymentRecord>> {
        Err(unsupported(self.descriptor(), "deployment history"))
    }

    /// Restore the local files saved for a history entry.
    async fn rollback_scenario(&self, _id: &str, _version_id: &str) -> Result<DeployResult> {
        Err(unsupported(self.descriptor(), "rollback"))
    }
}

fn unsupported(descriptor: &PlatformDescriptor, what: &str) -> Error {
    Error::Unsupported(format!(
        "Platform {} does not support {} via this API",
        descriptor.id, what
    ))
}

/// Options for a single API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl Default for ApiRequest {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
        }
    }
}

impl ApiRequest {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    pub fn with_body(method: Method, body: Value) -> Self {
        Self {
            method,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }
}

/// Descriptor-driven HTTP client shared by the REST adapters.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    descriptor: PlatformDescriptor,
    credentials: Credentials,
}

impl ApiClient {
    pub fn new(http: Client, descriptor: PlatformDescriptor, credentials: Credentials) -> Self {
        Self {
            http,
            descriptor,
            credentials,
        }
    }

    pub fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Display name used to prefix errors and log lines.
    pub fn platform_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Platform-prefixed error.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::platform(self.platform_name(), message)
    }

    /// Resolve an endpoint for a region, substituting `:param` placeholders.
    /// `None` means the descriptor's default region.
    pub fn build_api_url(
        &self,
        endpoint_key: &str,
        params: &[(&str, &str)],
        region: Option<&str>,
    ) -> Result<String> {
        let region = region.unwrap_or(&self.descriptor.default_region);
        let base = self.descriptor.base_url(region)?;
        self.build_url_with_base(base, endpoint_key, params)
    }

    /// Same as `build_api_url` against an explicit base (self-hosted hosts).
    pub fn build_url_with_base(
        &self,
        base: &str,
        endpoint_key: &str,
        params: &[(&str, &str)],
    ) -> Result<String> {
        let mut path = self.descriptor.endpoint(endpoint_key)?.to_string();
        for (key, value) in params {
            path = path.replace(&format!(":{}", key), value);
        }
        Ok(format!("{}{}", base.trim_end_matches('/'), path))
    }

    /// Auth headers for the descriptor's auth type.
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        match self.descriptor.auth_type {
            AuthType::Token => {
                let token = self.credentials.require("apiToken", self.platform_name())?;
                headers.insert(AUTHORIZATION, header_value(&format!("Token {}", token))?);
            }
            AuthType::ApiKey => {
                let key = self.credentials.require("apiKey", self.platform_name())?;
                let name = self.descriptor.auth_header.as_deref().unwrap_or("X-API-Key");
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::Config(format!("Invalid auth header '{}': {}", name, e)))?;
                headers.insert(name, header_value(&key)?);
            }
            AuthType::OAuth2 => {
                if let Some(token) = self.credentials.get_str("accessToken") {
                    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
                }
            }
        }
        Ok(headers)
    }

    /// Authenticated call with the descriptor's auth headers.
    pub async fn request(&self, url: &str, request: ApiRequest) -> Result<Value> {
        let headers = self.auth_headers()?;
        self.send(url, request, headers).await
    }

    /// Issue a call with explicit base headers (e.g. a bearer token obtained
    /// outside the credential bag). Non-2xx becomes an error carrying the
    /// body's `message` if present, otherwise the HTTP status text.
    pub async fn send(&self, url: &str, request: ApiRequest, auth: HeaderMap) -> Result<Value> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(auth);
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header '{}': {}", key, e)))?;
            headers.insert(name, header_value(value)?);
        }

        debug!("[{}] {} {}", self.platform_name(), request.method, url);

        let mut builder = self.http.request(request.method, url).headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.error(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.error(format!("Failed to read response from {}: {}", url, e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "API request failed: {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("")
                    )
                    .trim_end()
                    .to_string()
                });
            return Err(self.error(message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| self.error(format!("Invalid JSON from {}: {}", url, e)))
    }
}

/// `Authorization: Bearer <token>` for calls made with a token from elsewhere.
pub fn bearer(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Config(format!("Invalid header value: {}", e)))
}

/// Unwrap a list payload that may be `{key: [...]}` for any of `keys`, or a bare array.
pub(crate) fn unwrap_list(data: Value, keys: &[&str]) -> Option<Vec<Value>> {
    match data {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => keys.iter().find_map(|k| match map.remove(*k) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

/// Unwrap a single-object payload that may be nested under `key`.
pub(crate) fn unwrap_object(data: Value, key: &str) -> Value {
    match data {
        Value::Object(mut map) if matches!(map.get(key), Some(Value::Object(_))) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
