//! Running the clasp CLI and parsing what it prints.

use std::path::Path;
use std::process::Stdio;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use flowsync_core::config::{parse_command, DEFAULT_CLASP_COMMAND};
use flowsync_core::{Error, Result};

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1B\[[0-9;]*m").unwrap());

/// `Name - https://script.google.com/d/ID/edit`
static DASH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(.+?)\s+-\s+https://script\.google\.com/d/([\w\-]+)(?:/edit)?").unwrap()
});

/// `Name (https://script.google.com/d/ID/edit)` or `Name (id: ID)`
static PAREN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(.+)\s+\((?:https://script\.google\.com/d/|id:)\s*([\w\-]+)(?:/edit)?\)").unwrap()
});

/// One script from `clasp list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedScript {
    pub name: String,
    pub id: String,
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Parse `clasp list` output. Lines matching neither format are skipped.
pub fn parse_clasp_list(output: &str) -> Vec<ListedScript> {
    strip_ansi(output)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            DASH_LINE
                .captures(line)
                .or_else(|| PAREN_LINE.captures(line))
                .map(|caps| ListedScript {
                    name: caps[1].trim().to_string(),
                    id: caps[2].to_string(),
                })
        })
        .filter(|script| !script.name.is_empty())
        .collect()
}

/// Spawns clasp with captured output. No timeout is applied.
#[derive(Debug, Clone)]
pub struct ClaspRunner {
    program: String,
    base_args: Vec<String>,
}

impl ClaspRunner {
    /// `command` is the program followed by leading arguments, e.g. `["npx", "clasp"]`.
    pub fn new(command: Vec<String>) -> Self {
        let mut parts = if command.is_empty() {
            parse_command(DEFAULT_CLASP_COMMAND)
        } else {
            command
        };
        let program = parts.remove(0);
        Self {
            program,
            base_args: parts,
        }
    }

    /// Run in `cwd` and return stdout. Non-zero exit is an error carrying
    /// stderr, else stdout, else the exit code.
    pub async fn run(&self, args: &[&str], cwd: &Path) -> Result<String> {
        debug!("Running {} {:?} {:?} in {}", self.program, self.base_args, args, cwd.display());

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Command(format!("Failed to start {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            match output.status.code() {
                Some(code) => format!("Command failed with code {}", code),
                None => "Command terminated by signal".to_string(),
            }
        };
        Err(Error::Command(message))
    }
}
