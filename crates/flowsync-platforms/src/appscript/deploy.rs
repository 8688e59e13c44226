//! Deployment history and file snapshots for Apps Script projects.
//!
//! Every deployment copies the project's files into `.backups/<record id>/`
//! and is recorded, newest first, in `.deployment-history.json`. Rolling back
//! copies a snapshot over the project folder again.

use std::path::{Path, PathBuf};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use flowsync_core::{Error, Result};

use crate::tracking;
use crate::types::DeploymentRecord;

pub const HISTORY_FILE: &str = ".deployment-history.json";
pub const BACKUP_DIR: &str = ".backups";

const INITIAL_VERSION: &str = "0.0.0";

/// `clasp deploy` prints e.g. `Deployed AKfycbx... @4` (older: `- AKfycbx... @4.`).
static DEPLOYMENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(AKfyc[\w\-]+)\s+@(\d+)").unwrap());

pub fn history_path(project: &Path) -> PathBuf {
    project.join(HISTORY_FILE)
}

/// History entries, newest first. A project never deployed has none.
pub fn read_history(project: &Path) -> Result<Vec<DeploymentRecord>> {
    Ok(tracking::read_record(&history_path(project))?.unwrap_or_default())
}

pub fn write_history(project: &Path, history: &[DeploymentRecord]) -> Result<()> {
    tracking::write_record(&history_path(project), &history)
}

/// `requested` when given, else the latest version with its patch number bumped.
pub fn next_version(history: &[DeploymentRecord], requested: Option<&str>) -> String {
    if let Some(version) = requested.map(str::trim).filter(|v| !v.is_empty()) {
        return version.to_string();
    }

    let last = history
        .first()
        .map(|r| r.version.as_str())
        .unwrap_or(INITIAL_VERSION);
    let mut parts: Vec<u64> = last
        .split('.')
        .map(|p| p.trim().parse().unwrap_or(0))
        .collect();
    parts.resize(parts.len().max(3), 0);
    parts[2] += 1;
    parts
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Millisecond timestamp not already used by an entry in `history`.
pub fn new_record_id(history: &[DeploymentRecord]) -> String {
    let mut stamp = Utc::now().timestamp_millis();
    while history.iter().any(|r| r.id == stamp.to_string()) {
        stamp += 1;
    }
    stamp.to_string()
}

/// Deployment id and version number reported by `clasp deploy`.
pub fn parse_deploy_output(output: &str) -> Option<(String, u32)> {
    let caps = DEPLOYMENT_ID.captures(output)?;
    Some((caps[1].to_string(), caps[2].parse().ok()?))
}

pub fn backup_path(project: &Path, record_id: &str) -> PathBuf {
    project.join(BACKUP_DIR).join(record_id)
}

/// Copy the project's files into `.backups/<record_id>/`. Backups, the history
/// file and `skip` (the tracking sidecar) are left out.
pub fn snapshot(project: &Path, record_id: &str, skip: &[&str]) -> Result<PathBuf> {
    let target = backup_path(project, record_id);
    copy_tree(project, &target, |name| {
        name != BACKUP_DIR && name != HISTORY_FILE && !skip.contains(&name)
    })?;
    Ok(target)
}

/// Copy the snapshot for `record_id` back over the project folder.
pub fn restore(project: &Path, record_id: &str) -> Result<()> {
    let source = backup_path(project, record_id);
    if !source.is_dir() {
        return Err(Error::NotFound(format!(
            "Backup not found for version {}",
            record_id
        )));
    }
    copy_tree(&source, project, |_| true)
}

/// Copy `src` into `dest`, keeping top-level entries for which `keep` holds.
fn copy_tree(src: &Path, dest: &Path, keep: impl Fn(&str) -> bool) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|e| {
        e.depth() > 1 || e.file_name().to_str().is_some_and(|name| keep(name))
    });

    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeploymentKind, DeploymentStatus};

    fn record(id: &str, version: &str) -> DeploymentRecord {
        DeploymentRecord::new(id, version, DeploymentKind::Deployment, "m", DeploymentStatus::Completed)
    }

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(&[], None), "0.0.1");
        assert_eq!(next_version(&[record("1", "1.4.9")], None), "1.4.10");
        assert_eq!(next_version(&[record("1", "2.1")], None), "2.1.1");
        assert_eq!(next_version(&[record("1", "beta")], None), "0.0.1");
        assert_eq!(next_version(&[record("1", "1.0.0")], Some(" 3.0.0 ")), "3.0.0");
        assert_eq!(next_version(&[record("1", "1.0.0")], Some("")), "1.0.1");
    }

    #[test]
    fn test_record_ids_do_not_collide() {
        let first = new_record_id(&[]);
        let second = new_record_id(&[record(&first, "0.0.1")]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_parse_deploy_output() {
        assert_eq!(
            parse_deploy_output("Deployed AKfycbx-12_ab @4\n"),
            Some(("AKfycbx-12_ab".into(), 4))
        );
        assert_eq!(
            parse_deploy_output("Created version 2.\n- AKfycbQ9 @2.\n"),
            Some(("AKfycbQ9".into(), 2))
        );
        assert_eq!(parse_deploy_output("nothing here"), None);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path();
        std::fs::write(project.join("Code.js"), "function v1() {}").unwrap();
        std::fs::create_dir_all(project.join("lib")).unwrap();
        std::fs::write(project.join("lib/util.js"), "// v1").unwrap();
        std::fs::write(project.join(".clasp-deployer.json"), "{}").unwrap();
        write_history(project, &[record("1", "0.0.1")]).unwrap();

        let backup = snapshot(project, "100", &[".clasp-deployer.json"]).unwrap();
        assert!(backup.join("Code.js").exists());
        assert!(backup.join("lib/util.js").exists());
        assert!(!backup.join(".clasp-deployer.json").exists());
        assert!(!backup.join(HISTORY_FILE).exists());
        assert!(!backup.join(BACKUP_DIR).exists());

        std::fs::write(project.join("Code.js"), "function v2() {}").unwrap();
        std::fs::write(project.join("lib/util.js"), "// v2").unwrap();
        restore(project, "100").unwrap();
        assert_eq!(std::fs::read_to_string(project.join("Code.js")).unwrap(), "function v1() {}");
        assert_eq!(std::fs::read_to_string(project.join("lib/util.js")).unwrap(), "// v1");
        assert_eq!(read_history(project).unwrap().len(), 1);

        assert!(matches!(restore(project, "404").unwrap_err(), Error::NotFound(_)));
    }
}
