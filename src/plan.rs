use std::path::PathBuf;

use bitflags::bitflags;
use clap::ValueEnum;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Remove,
    Replace,
}

bitflags! {
    /// Which filesystem entry kinds a name-based action applies to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FsTargets: u8 {
        const FILES = 0b01;
        const DIRS  = 0b10;
    }
}

/// Name-based actions operate on a combinable Files|Dirs set; content edits
/// are a disjoint mode, never combined with the flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionTarget {
    Filesystem(FsTargets),
    Contents,
}

/// User-facing spelling of `ActionTarget`, shared by the CLI and presets.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetChoice {
    Files,
    Dirs,
    FilesDirs,
    FileContents,
}

impl TargetChoice {
    pub fn to_target(self) -> ActionTarget {
        match self {
            TargetChoice::Files => ActionTarget::Filesystem(FsTargets::FILES),
            TargetChoice::Dirs => ActionTarget::Filesystem(FsTargets::DIRS),
            TargetChoice::FilesDirs => {
                ActionTarget::Filesystem(FsTargets::FILES | FsTargets::DIRS)
            }
            TargetChoice::FileContents => ActionTarget::Contents,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Per-item outcome, filled in during commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

/// One directory or file candidate in a name-based plan.
///
/// `executable` distinguishes real targets from ancestor directories kept
/// only because they contain matching descendants.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    pub name: String,
    pub proposed_name: Option<String>,
    pub kind: EntryKind,
    pub selected: bool,
    pub executable: bool,
    pub path: PathBuf,
    pub children: Vec<PlanNode>,
    pub status: ItemStatus,
}

impl PlanNode {
    /// Container node: present to anchor descendants, not itself a target.
    pub fn container(name: String, path: PathBuf) -> Self {
        PlanNode {
            name,
            proposed_name: None,
            kind: EntryKind::Directory,
            selected: true,
            executable: false,
            path,
            children: Vec::new(),
            status: ItemStatus::Pending,
        }
    }

    pub fn target(name: String, path: PathBuf, kind: EntryKind) -> Self {
        PlanNode {
            name,
            proposed_name: None,
            kind,
            selected: true,
            executable: true,
            path,
            children: Vec::new(),
            status: ItemStatus::Pending,
        }
    }

    /// Child-index paths of every executable node, in discovery (pre-)order.
    /// Committing a rename batch walks this list backwards so descendants
    /// move under their original parent name before the parent itself moves.
    pub fn executable_paths(&self) -> Vec<Vec<usize>> {
        let mut acc = Vec::new();
        self.collect_executable(&mut Vec::new(), &mut acc);
        acc
    }

    fn collect_executable(&self, prefix: &mut Vec<usize>, acc: &mut Vec<Vec<usize>>) {
        if self.executable {
            acc.push(prefix.clone());
        }
        for (idx, child) in self.children.iter().enumerate() {
            prefix.push(idx);
            child.collect_executable(prefix, acc);
            prefix.pop();
        }
    }

    pub fn node_mut(&mut self, path: &[usize]) -> &mut PlanNode {
        let mut node = self;
        for &idx in path {
            node = &mut node.children[idx];
        }
        node
    }
}

/// One line inside a file that matches the search condition.
#[derive(Clone, Debug, PartialEq)]
pub struct LineEdit {
    pub line_index: usize,
    pub original: String,
    pub proposed: String,
    pub selected: bool,
    pub status: ItemStatus,
}

/// One matching file in a content-mode plan. `lines` holds every line read
/// at scan time (matching or not) so the file can be rewritten verbatim with
/// only the approved edits substituted in; `encoding` is what the bytes were
/// decoded from, and the rewrite encodes back into it.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentPlanEntry {
    pub path: PathBuf,
    pub lines: Vec<String>,
    pub edits: Vec<LineEdit>,
    pub encoding: &'static Encoding,
    pub status: ItemStatus,
    pub error: Option<String>,
}

/// The previewed mutation batch: shape plus the action that produced it, so
/// commit can refuse a mismatched combination outright.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub action: ActionType,
    pub target: ActionTarget,
    pub shape: PlanShape,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlanShape {
    Tree(PlanNode),
    Contents(Vec<ContentPlanEntry>),
}

impl Plan {
    /// Number of user-selectable items (executable nodes or line edits).
    pub fn selectable_count(&self) -> usize {
        match &self.shape {
            PlanShape::Tree(root) => root.executable_paths().len(),
            PlanShape::Contents(entries) => entries.iter().map(|e| e.edits.len()).sum(),
        }
    }

    /// Deselects items by their display index; indices follow discovery
    /// order, the same order the preview is rendered in. Out-of-range
    /// indices are ignored.
    pub fn deselect(&mut self, indices: &[usize]) {
        match &mut self.shape {
            PlanShape::Tree(root) => {
                for (pos, path) in root.executable_paths().iter().enumerate() {
                    if indices.contains(&pos) {
                        root.node_mut(path).selected = false;
                    }
                }
            }
            PlanShape::Contents(entries) => {
                let mut pos = 0usize;
                for entry in entries {
                    for edit in &mut entry.edits {
                        if indices.contains(&pos) {
                            edit.selected = false;
                        }
                        pos += 1;
                    }
                }
            }
        }
    }
}
