//! Local sync state: the tracking files written next to pulled items.
//!
//! REST platforms keep a `metadata.json` beside the scenario body. Apps Script
//! projects keep a `.clasp-deployer.json` sidecar next to clasp's own files.
//! Every write replaces the whole file.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use flowsync_core::{Error, Result};

use crate::registry::StorageLayout;
use crate::types::{LocalProject, PlatformId, ScenarioId};

/// Which operation is stamping a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Pull,
    Push,
}

/// `metadata.json` for a pulled REST scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioMetadata {
    pub id: ScenarioId,
    pub name: String,
    pub platform: PlatformId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub last_pull: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_push: Option<String>,
    /// Platform-specific fields (team, folder, state, tags...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScenarioMetadata {
    pub fn new(id: ScenarioId, name: impl Into<String>, platform: PlatformId) -> Self {
        Self {
            id,
            name: name.into(),
            platform,
            created: None,
            last_pull: None,
            last_push: None,
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// `.clasp-deployer.json` sidecar for an Apps Script project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTracking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pull: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_push: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Anything carrying pull/push timestamps.
pub trait SyncRecord {
    fn timestamps_mut(&mut self) -> (&mut Option<String>, &mut Option<String>, &mut Option<String>);

    /// Set the timestamp for `op` only.
    fn stamp(&mut self, op: SyncOperation, at: &str) {
        let (_, last_pull, last_push) = self.timestamps_mut();
        match op {
            SyncOperation::Pull => *last_pull = Some(at.to_string()),
            SyncOperation::Push => *last_push = Some(at.to_string()),
        }
    }

    /// Fill `created` if this record has never had one.
    fn mark_created(&mut self, at: &str) {
        let (created, _, _) = self.timestamps_mut();
        if created.is_none() {
            *created = Some(at.to_string());
        }
    }
}

impl SyncRecord for ScenarioMetadata {
    fn timestamps_mut(&mut self) -> (&mut Option<String>, &mut Option<String>, &mut Option<String>) {
        (&mut self.created, &mut self.last_pull, &mut self.last_push)
    }
}

impl SyncRecord for ProjectTracking {
    fn timestamps_mut(&mut self) -> (&mut Option<String>, &mut Option<String>, &mut Option<String>) {
        (&mut self.created, &mut self.last_pull, &mut self.last_push)
    }
}

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a JSON record. A missing file is `Ok(None)`.
pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Write a record as pretty JSON, replacing the file.
pub fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(record)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Read a record, treating an unreadable file as absent.
pub fn read_record_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_record(path) {
        Ok(record) => record,
        Err(e) => {
            warn!("Ignoring unreadable tracking file {}: {}", path.display(), e);
            None
        }
    }
}

/// Reject ids that cannot name a single folder under the storage directory.
pub fn validate_id(id: &str) -> Result<()> {
    let invalid = id.trim().is_empty()
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\');
    if invalid {
        return Err(Error::Config(format!("Invalid scenario id: {:?}", id)));
    }
    Ok(())
}

/// Write a pulled scenario under `local_path/<id>/`, where `id` is the id the
/// caller asked for. A payload without an id takes the requested one.
///
/// The body is written first, then the metadata. `created` and `lastPush`
/// survive from any previous pull.
pub fn write_pulled(
    local_path: &Path,
    layout: &StorageLayout,
    id: &str,
    mut metadata: ScenarioMetadata,
    body: &Value,
) -> Result<(PathBuf, ScenarioMetadata)> {
    validate_id(id)?;
    if metadata.id.to_string().is_empty() {
        metadata.id = ScenarioId::from(id);
    }
    let dir = local_path.join(id);
    std::fs::create_dir_all(&dir)?;

    let metadata_path = dir.join(&layout.metadata_file);
    if let Some(previous) = read_record_lenient::<ScenarioMetadata>(&metadata_path) {
        metadata.created = previous.created;
        metadata.last_push = previous.last_push;
    }
    let now = now_iso();
    metadata.mark_created(&now);
    metadata.stamp(SyncOperation::Pull, &now);

    write_record(&dir.join(&layout.scenario_file), body)?;
    write_record(&metadata_path, &metadata)?;
    Ok((dir, metadata))
}

/// Read the local scenario body for `id`. Missing body is an error.
pub fn read_body(local_path: &Path, layout: &StorageLayout, id: &str) -> Result<Value> {
    validate_id(id)?;
    let path = local_path.join(id).join(&layout.scenario_file);
    read_record(&path)?.ok_or_else(|| {
        Error::NotFound(format!(
            "Local {} for {} not found at {}",
            layout.scenario_file,
            id,
            path.display()
        ))
    })
}

/// Stamp `lastPush` in the scenario's metadata, creating a minimal record if needed.
pub fn stamp_push(
    local_path: &Path,
    layout: &StorageLayout,
    platform: PlatformId,
    id: &str,
) -> Result<String> {
    validate_id(id)?;
    let path = local_path.join(id).join(&layout.metadata_file);
    let mut metadata = read_record_lenient::<ScenarioMetadata>(&path)
        .unwrap_or_else(|| ScenarioMetadata::new(ScenarioId::from(id), id, platform));
    let at = now_iso();
    metadata.stamp(SyncOperation::Push, &at);
    write_record(&path, &metadata)?;
    Ok(at)
}

/// List subdirectories of `storage_dir` that carry a metadata file.
pub fn scan_scenario_dirs(storage_dir: &Path, metadata_file: &str) -> Vec<LocalProject> {
    let Ok(entries) = std::fs::read_dir(storage_dir) else {
        return Vec::new();
    };

    let mut projects: Vec<LocalProject> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|entry| {
            let dir = entry.path();
            let metadata: ScenarioMetadata =
                read_record_lenient(&dir.join(metadata_file))?;
            Some(LocalProject {
                id: metadata.id.to_string(),
                name: metadata.name,
                path: dir.to_string_lossy().into_owned(),
                last_pull: metadata.last_pull,
                last_push: metadata.last_push,
            })
        })
        .collect();
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> StorageLayout {
        StorageLayout {
            directory: "make-scenarios".into(),
            metadata_file: "metadata.json".into(),
            scenario_file: "blueprint.json".into(),
        }
    }

    #[test]
    fn test_stamp_touches_only_its_operation() {
        let mut tracking = ProjectTracking::default();
        tracking.stamp(SyncOperation::Pull, "2024-01-01T00:00:00.000Z");
        tracking.stamp(SyncOperation::Push, "2024-02-01T00:00:00.000Z");
        assert!(tracking.created.is_none());
        tracking.mark_created("2024-03-01T00:00:00.000Z");
        tracking.mark_created("2024-04-01T00:00:00.000Z");
        assert_eq!(tracking.created.as_deref(), Some("2024-03-01T00:00:00.000Z"));
        assert_eq!(tracking.last_pull.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(tracking.last_push.as_deref(), Some("2024-02-01T00:00:00.000Z"));
    }

    #[test]
    fn test_write_pulled_preserves_created_and_last_push() {
        let dir = tempfile::tempdir().unwrap();
        let meta = || ScenarioMetadata::new(ScenarioId::Number(7), "Flow", PlatformId::Make);

        let (_, first) = write_pulled(dir.path(), &layout(), "7", meta(), &json!([])).unwrap();
        stamp_push(dir.path(), &layout(), PlatformId::Make, "7").unwrap();
        let pushed: ScenarioMetadata =
            read_record(&dir.path().join("7/metadata.json")).unwrap().unwrap();

        let (_, second) = write_pulled(dir.path(), &layout(), "7", meta(), &json!([1])).unwrap();
        assert_eq!(second.created, first.created);
        assert_eq!(second.last_push, pushed.last_push);
        assert!(second.last_push.is_some());
    }

    #[test]
    fn test_extra_fields_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let meta = ScenarioMetadata::new(ScenarioId::Number(1), "A", PlatformId::Make)
            .with("teamId", 55);
        write_pulled(dir.path(), &layout(), "1", meta, &json!({})).unwrap();

        let raw: Value = read_record(&dir.path().join("1/metadata.json")).unwrap().unwrap();
        assert_eq!(raw["teamId"], json!(55));
        assert_eq!(raw["platform"], json!("make"));
        assert_eq!(raw["id"], json!(1));
    }

    #[test]
    fn test_pull_dir_follows_requested_id() {
        let dir = tempfile::tempdir().unwrap();
        let nameless = ScenarioMetadata::new(ScenarioId::from_value(&Value::Null), "Z", PlatformId::Zapier);
        let (path, meta) = write_pulled(dir.path(), &layout(), "z1", nameless, &json!({})).unwrap();
        assert_eq!(path, dir.path().join("z1"));
        assert_eq!(meta.id, ScenarioId::from("z1"));
        assert!(!dir.path().join("metadata.json").exists());

        let remote = ScenarioMetadata::new(ScenarioId::from("../../escaped"), "Z", PlatformId::Zapier);
        let (path, meta) = write_pulled(dir.path(), &layout(), "z2", remote, &json!({})).unwrap();
        assert_eq!(path, dir.path().join("z2"));
        assert_eq!(meta.id, ScenarioId::from("../../escaped"));
    }

    #[test]
    fn test_path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["", ".", "..", "../up", "a/b", "a\\b"] {
            let meta = ScenarioMetadata::new(ScenarioId::from(id), "X", PlatformId::Make);
            assert!(matches!(
                write_pulled(dir.path(), &layout(), id, meta, &json!([])).unwrap_err(),
                Error::Config(_)
            ));
            assert!(matches!(read_body(dir.path(), &layout(), id).unwrap_err(), Error::Config(_)));
            assert!(stamp_push(dir.path(), &layout(), PlatformId::Make, id).is_err());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_read_body_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_body(dir.path(), &layout(), "404").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_scan_scenario_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for (id, name) in [(2, "Beta"), (1, "Alpha")] {
            let meta = ScenarioMetadata::new(ScenarioId::Number(id), name, PlatformId::Make);
            write_pulled(dir.path(), &layout(), &id.to_string(), meta, &json!([])).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("stray")).unwrap();

        let projects = scan_scenario_dirs(dir.path(), "metadata.json");
        let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(projects[0].last_pull.is_some());
        assert!(scan_scenario_dirs(&dir.path().join("missing"), "metadata.json").is_empty());
    }
}
