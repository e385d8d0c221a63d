use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const LOG_DIR: &str = ".bulkedit";
const LOG_FILE: &str = "change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Serialize)]
pub struct ChangeLogEntry<'a> {
    pub timestamp: &'a str,
    pub action: &'a str,
    pub root: &'a Path,
    pub summary: &'a str,
}

/// Appends one line per committed batch, keeping only the newest entries.
pub fn record_commit(action: &str, root: &Path, summary: &str) -> Result<()> {
    let dir = PathBuf::from(LOG_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let entry = ChangeLogEntry {
        timestamp: &timestamp,
        action,
        root,
        summary,
    };
    append_capped(&dir.join(LOG_FILE), serde_json::to_string(&entry)?)
}

/// Rewrites the log with the new line appended, dropping the oldest lines
/// once the cap is exceeded.
fn append_capped(path: &Path, line: String) -> Result<()> {
    let mut lines: Vec<String> = match fs::read_to_string(path) {
        Ok(data) => data.lines().map(str::to_string).collect(),
        Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    };
    lines.push(line);

    let start = lines.len().saturating_sub(MAX_ENTRIES);
    let mut out = lines[start..].join("\n");
    out.push('\n');
    fs::write(path, out).with_context(|| format!("writing {}", path.display()))
}
