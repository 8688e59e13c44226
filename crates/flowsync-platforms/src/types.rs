//! Shared platform types: the normalized shapes the UI layer consumes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowsync_core::Error;

/// Supported automation platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    AppScript,
    Make,
    Zapier,
    N8n,
}

impl PlatformId {
    pub fn all() -> &'static [PlatformId] {
        &[
            PlatformId::AppScript,
            PlatformId::Make,
            PlatformId::Zapier,
            PlatformId::N8n,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::AppScript => "appscript",
            PlatformId::Make => "make",
            PlatformId::Zapier => "zapier",
            PlatformId::N8n => "n8n",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appscript" => Ok(PlatformId::AppScript),
            "make" => Ok(PlatformId::Make),
            "zapier" => Ok(PlatformId::Zapier),
            "n8n" => Ok(PlatformId::N8n),
            other => Err(Error::UnknownPlatform(other.to_string())),
        }
    }
}

/// Platform-native scenario identifier, kept in its original JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioId {
    Number(i64),
    Text(String),
}

impl ScenarioId {
    /// Take the id from a raw payload without reformatting it.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => ScenarioId::Number(i),
                None => ScenarioId::Text(n.to_string()),
            },
            Value::String(s) => ScenarioId::Text(s.clone()),
            Value::Null => ScenarioId::Text(String::new()),
            other => ScenarioId::Text(other.to_string()),
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioId::Number(n) => write!(f, "{}", n),
            ScenarioId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ScenarioId {
    fn from(s: &str) -> Self {
        ScenarioId::Text(s.to_string())
    }
}

impl From<i64> for ScenarioId {
    fn from(n: i64) -> Self {
        ScenarioId::Number(n)
    }
}

/// Normalized scenario. Transient: the remote platform is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    pub platform: PlatformId,
    pub is_active: bool,
    pub last_modified: Option<String>,
    pub operations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    /// Full original payload, enough to rebuild a push body.
    pub raw: Value,
}

impl Scenario {
    /// Minimal scenario with every optional field empty.
    pub fn new(id: ScenarioId, name: impl Into<String>, platform: PlatformId, raw: Value) -> Self {
        Self {
            id,
            name: name.into(),
            platform,
            is_active: false,
            last_modified: None,
            operations: 0,
            description: None,
            url: None,
            folder: None,
            tags: Vec::new(),
            is_local: None,
            raw,
        }
    }
}

/// Result of a pull.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub success: bool,
    pub scenario_id: String,
    pub local_path: String,
    pub metadata: Value,
}

/// Result of a push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub success: bool,
    pub scenario_id: String,
    pub pushed_at: String,
}

/// Outcome of a read-only credential check. Never an error.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_url: Option<String>,
}

impl ConnectionStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Captured output of a remote function run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub message: String,
    pub output: String,
}

/// Captured execution logs.
#[derive(Debug, Clone, Serialize)]
pub struct LogsResult {
    pub success: bool,
    pub message: String,
    pub logs: String,
}

/// Options for log retrieval.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsOptions {
    #[serde(default)]
    pub setup: bool,
}

/// Whether a history entry is a deployment or a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentKind {
    Deployment,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    InProgress,
    Completed,
    Failed,
}

/// One entry of a project's deployment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    pub version: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: DeploymentKind,
    pub message: String,
    pub status: DeploymentStatus,
    /// Snapshot under `.backups/` taken before this deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    /// Deployment id reported by clasp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_from: Option<String>,
}

impl DeploymentRecord {
    /// Entry stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        kind: DeploymentKind,
        message: impl Into<String>,
        status: DeploymentStatus,
    ) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            timestamp: crate::tracking::now_iso(),
            kind,
            message: message.into(),
            status,
            backup_id: None,
            deployment_id: None,
            completed_at: None,
            error: None,
            rolled_back_from: None,
        }
    }
}

/// Options for a deployment. Without a version the patch number is bumped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOptions {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of a deployment or rollback.
#[derive(Debug, Clone, Serialize)]
pub struct DeployResult {
    pub success: bool,
    pub message: String,
    pub deployment: DeploymentRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// A scenario or project that has been pulled to disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalProject {
    pub id: String,
    pub name: String,
    pub path: String,
    pub last_pull: Option<String>,
    pub last_push: Option<String>,
}

/// Opaque per-platform credential bag. Shape depends on the auth type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Non-empty string value for a key. Numbers are rendered as strings.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Like `get_str`, but a missing value is a configuration error.
    pub fn require(&self, key: &str, platform: &str) -> flowsync_core::Result<String> {
        self.get_str(key).ok_or_else(|| {
            Error::Config(format!("{} credentials are missing required field '{}'", platform, key))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Credentials {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Read a non-empty string field from a raw payload.
pub(crate) fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Length of an array field, or 0.
pub(crate) fn array_len(raw: &Value, key: &str) -> usize {
    raw.get(key).and_then(|v| v.as_array()).map_or(0, |a| a.len())
}
