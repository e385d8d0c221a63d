use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::plan::{ActionType, TargetChoice};

const PRESET_DIR: &str = ".bulkedit";
const PRESET_FILE: &str = "presets.json";

/// Named snapshot of every user-facing setting. Pure value object; the
/// engine never reads the store, it only consumes a settings record the CLI
/// builds from one of these.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Preset {
    pub action: ActionType,
    pub target: TargetChoice,
    pub recursive: bool,
    pub case_sensitive: bool,
    pub auto_confirm: bool,
    pub file_pattern_is_regex: bool,
    pub search_is_regex: bool,
    pub highlight_match: bool,
    pub dir_path: String,
    pub file_pattern: String,
    pub search_text: String,
    pub replace_text: String,
}

pub fn default_store_path() -> PathBuf {
    PathBuf::from(PRESET_DIR).join(PRESET_FILE)
}

/// Loads every stored preset, keyed and ordered by name. A missing store is
/// an empty store.
pub fn load_all(path: &Path) -> Result<BTreeMap<String, Preset>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read(path).with_context(|| format!("reading presets {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("parsing presets {}", path.display()))
}

pub fn save(path: &Path, name: &str, preset: Preset) -> Result<()> {
    if name.is_empty() {
        bail!("preset name can't be empty");
    }
    let mut presets = load_all(path)?;
    presets.insert(name.to_string(), preset);
    write_store(path, &presets)
}

/// Removes a preset by name; `Ok(false)` when no such preset exists.
pub fn remove(path: &Path, name: &str) -> Result<bool> {
    let mut presets = load_all(path)?;
    if presets.remove(name).is_none() {
        return Ok(false);
    }
    write_store(path, &presets)?;
    Ok(true)
}

fn write_store(path: &Path, presets: &BTreeMap<String, Preset>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(presets)?;
    fs::write(path, json).with_context(|| format!("writing presets {}", path.display()))?;
    Ok(())
}
