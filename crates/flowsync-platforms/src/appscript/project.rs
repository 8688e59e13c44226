//! Local clasp projects under the scripts directory.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::tracking::read_record_lenient;

pub const CLASP_CONFIG_FILE: &str = ".clasp.json";

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\-_]").unwrap());

static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:export\s+)?(?:async\s+)?function\s+([a-zA-Z0-9_$]+)\s*\(").unwrap()
});

static ARROW_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:export\s+)?(?:const|let|var)\s+([a-zA-Z0-9_$]+)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[a-zA-Z0-9_$]+)\s*=>",
    )
    .unwrap()
});

const SOURCE_EXTENSIONS: &[&str] = &["js", "ts", "gs"];

/// A project folder whose `.clasp.json` names a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalScript {
    /// Folder name.
    pub name: String,
    pub path: PathBuf,
    pub script_id: String,
}

/// Directory name derived from a script title.
pub fn sanitize_name(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name, "_").into_owned()
}

/// Every project under `scripts_dir`, sorted by folder name.
pub fn local_projects(scripts_dir: &Path) -> Vec<LocalScript> {
    let Ok(entries) = std::fs::read_dir(scripts_dir) else {
        return Vec::new();
    };

    let mut projects: Vec<LocalScript> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|path| {
            let config: Value = read_record_lenient(&path.join(CLASP_CONFIG_FILE))?;
            let script_id = config.get("scriptId")?.as_str()?.to_string();
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some(LocalScript {
                name,
                path,
                script_id,
            })
        })
        .collect();
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    projects
}

pub fn find_local_project(scripts_dir: &Path, script_id: &str) -> Option<LocalScript> {
    local_projects(scripts_dir)
        .into_iter()
        .find(|p| p.script_id == script_id)
}

/// Script id recorded in a project's `.clasp.json`.
pub fn read_script_id(project_dir: &Path) -> Option<String> {
    let config: Value = read_record_lenient(&project_dir.join(CLASP_CONFIG_FILE))?;
    config.get("scriptId")?.as_str().map(String::from)
}

/// Remove `dir` if it exists and is empty.
pub fn remove_if_empty(dir: &Path) {
    let empty = std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(false);
    if empty {
        if let Err(e) = std::fs::remove_dir(dir) {
            warn!("Failed to clean up {}: {}", dir.display(), e);
        }
    }
}

/// Remove a project folder this process just created, contents included.
pub fn discard_project(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!("Failed to clean up {}: {}", dir.display(), e);
    }
}

/// Function names declared in the project's top-level source files.
/// Never empty: `main` is returned when nothing is found.
pub fn discover_functions(project_dir: &Path) -> Vec<String> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(project_dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
            })
            .collect(),
        Err(e) => {
            warn!("Error scanning functions in {}: {}", project_dir.display(), e);
            Vec::new()
        }
    };
    files.sort();

    let mut functions: Vec<String> = Vec::new();
    for file in files {
        let Ok(source) = std::fs::read_to_string(&file) else {
            continue;
        };
        let found = FUNCTION_DECL
            .captures_iter(&source)
            .chain(ARROW_DECL.captures_iter(&source))
            .map(|caps| caps[1].to_string());
        for name in found {
            if !functions.contains(&name) {
                functions.push(name);
            }
        }
    }

    if functions.is_empty() {
        functions.push("main".to_string());
    }
    functions
}
