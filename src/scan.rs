use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::encoding;
use crate::error::EngineError;
use crate::pattern::{NameMatcher, SearchCondition};
use crate::plan::{
    ActionTarget, ActionType, ContentPlanEntry, EntryKind, FsTargets, ItemStatus, LineEdit, Plan,
    PlanNode, PlanShape,
};

/// Immutable snapshot of every setting a scan needs. Built once by the
/// caller; nothing is shared between the scan and commit phases except the
/// plan itself.
#[derive(Clone, Debug)]
pub struct ScanRequest {
    pub action: ActionType,
    pub target: ActionTarget,
    pub root: PathBuf,
    pub file_pattern: String,
    pub file_pattern_is_regex: bool,
    pub search_text: String,
    pub search_is_regex: bool,
    pub replace_text: String,
    pub recursive: bool,
    pub case_sensitive: bool,
}

/// Walks the filesystem under the request's root and builds the preview
/// plan. Nothing on disk is modified.
pub fn scan(request: &ScanRequest) -> Result<Plan, EngineError> {
    let root = resolve_root(&request.root)?;

    let shape = match (request.target, request.action) {
        (ActionTarget::Filesystem(flags), ActionType::Remove) => {
            let matcher = NameMatcher::compile(
                &request.file_pattern,
                request.file_pattern_is_regex,
                request.case_sensitive,
            )?;
            let mut node =
                scan_for_removal(&root, flags, &matcher, request.recursive, request.case_sensitive);
            node.name = root.display().to_string();
            PlanShape::Tree(node)
        }
        (ActionTarget::Filesystem(flags), ActionType::Replace) => {
            let condition = SearchCondition::compile(
                &request.search_text,
                request.search_is_regex,
                request.case_sensitive,
            )?;
            let mut node = scan_for_rename(
                &root,
                flags,
                &condition,
                &request.replace_text,
                request.recursive,
                request.case_sensitive,
            );
            node.name = root.display().to_string();
            PlanShape::Tree(node)
        }
        (ActionTarget::Contents, action) => {
            let matcher = NameMatcher::compile(
                &request.file_pattern,
                request.file_pattern_is_regex,
                request.case_sensitive,
            )?;
            let condition = SearchCondition::compile(
                &request.search_text,
                request.search_is_regex,
                request.case_sensitive,
            )?;
            // Remove on contents is replace-with-empty.
            let replacement = match action {
                ActionType::Remove => "",
                ActionType::Replace => request.replace_text.as_str(),
            };
            let mut entries = Vec::new();
            scan_contents(
                &root,
                &matcher,
                &condition,
                replacement,
                request.recursive,
                request.case_sensitive,
                &mut entries,
            );
            PlanShape::Contents(entries)
        }
    };

    Ok(Plan {
        action: request.action,
        target: request.target,
        shape,
    })
}

fn resolve_root(root: &Path) -> Result<PathBuf, EngineError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {
            fs::canonicalize(root).map_err(|_| EngineError::InvalidRoot(root.to_path_buf()))
        }
        _ => Err(EngineError::InvalidRoot(root.to_path_buf())),
    }
}

/// Removal plan for one directory level. A matched directory becomes an
/// executable leaf without recursing into it: removing it removes its whole
/// subtree anyway. Unmatched directories are only kept when recursion found
/// candidates somewhere below them.
fn scan_for_removal(
    dir: &Path,
    flags: FsTargets,
    matcher: &NameMatcher,
    recursive: bool,
    case_sensitive: bool,
) -> PlanNode {
    let mut node = PlanNode::container(display_name(dir), dir.to_path_buf());
    let (dirs, files) = list_sorted(dir, case_sensitive);

    if flags.contains(FsTargets::DIRS) || recursive {
        for (name, path) in dirs {
            if flags.contains(FsTargets::DIRS) && matcher.is_match(&name) {
                node.children
                    .push(PlanNode::target(name, path, EntryKind::Directory));
            } else if recursive {
                let child = scan_for_removal(&path, flags, matcher, recursive, case_sensitive);
                if !child.children.is_empty() {
                    node.children.push(child);
                }
            }
        }
    }

    if flags.contains(FsTargets::FILES) {
        for (name, path) in files {
            if matcher.is_match(&name) {
                node.children
                    .push(PlanNode::target(name, path, EntryKind::File));
            }
        }
    }

    node
}

/// Rename plan for one directory level. A directory can appear because it
/// contains matches, because its own name matches, or both; the recursion
/// result is reused as the carrier node when the name also matches.
fn scan_for_rename(
    dir: &Path,
    flags: FsTargets,
    condition: &SearchCondition,
    replacement: &str,
    recursive: bool,
    case_sensitive: bool,
) -> PlanNode {
    let mut node = PlanNode::container(display_name(dir), dir.to_path_buf());
    let (dirs, files) = list_sorted(dir, case_sensitive);

    if flags.contains(FsTargets::DIRS) || recursive {
        for (name, path) in dirs {
            let mut child: Option<PlanNode> = None;
            if recursive {
                let sub =
                    scan_for_rename(&path, flags, condition, replacement, recursive, case_sensitive);
                if !sub.children.is_empty() {
                    child = Some(sub);
                }
            }
            if flags.contains(FsTargets::DIRS) && condition.matches(&name) {
                let mut carrier =
                    child.take().unwrap_or_else(|| PlanNode::container(name.clone(), path));
                carrier.proposed_name = Some(condition.apply(&name, replacement));
                carrier.executable = true;
                child = Some(carrier);
            }
            if let Some(child) = child {
                node.children.push(child);
            }
        }
    }

    if flags.contains(FsTargets::FILES) {
        for (name, path) in files {
            if condition.matches(&name) {
                let proposed = condition.apply(&name, replacement);
                let mut leaf = PlanNode::target(name, path, EntryKind::File);
                leaf.proposed_name = Some(proposed);
                node.children.push(leaf);
            }
        }
    }

    node
}

/// Content plan: subdirectories first (when recursive), then the current
/// level's matching files. Files with zero matching lines are discarded;
/// files that cannot be read stay in the plan as failed markers.
#[allow(clippy::too_many_arguments)]
fn scan_contents(
    dir: &Path,
    matcher: &NameMatcher,
    condition: &SearchCondition,
    replacement: &str,
    recursive: bool,
    case_sensitive: bool,
    acc: &mut Vec<ContentPlanEntry>,
) {
    let (dirs, files) = list_sorted(dir, case_sensitive);

    if recursive {
        for (_, path) in dirs {
            scan_contents(&path, matcher, condition, replacement, recursive, case_sensitive, acc);
        }
    }

    for (name, path) in files {
        if !matcher.is_match(&name) {
            continue;
        }
        match scan_one_file(&path, condition, replacement) {
            Ok(Some(entry)) => acc.push(entry),
            Ok(None) => {}
            Err(err) => acc.push(ContentPlanEntry {
                path,
                lines: Vec::new(),
                edits: Vec::new(),
                encoding: encoding_rs::UTF_8,
                status: ItemStatus::Failed,
                error: Some(err),
            }),
        }
    }
}

fn scan_one_file(
    path: &Path,
    condition: &SearchCondition,
    replacement: &str,
) -> Result<Option<ContentPlanEntry>, String> {
    let bytes = fs::read(path).map_err(|err| format!("failed to open file: {err}"))?;
    let decoded = encoding::decode(&bytes);

    let mut lines: Vec<String> = Vec::new();
    let mut edits: Vec<LineEdit> = Vec::new();
    for (line_index, line) in decoded.text.lines().enumerate() {
        if condition.matches(line) {
            edits.push(LineEdit {
                line_index,
                original: line.to_string(),
                proposed: condition.apply(line, replacement),
                selected: true,
                status: ItemStatus::Pending,
            });
        }
        lines.push(line.to_string());
    }

    if edits.is_empty() {
        return Ok(None);
    }

    trim_trailing_blank_lines(&mut lines, &edits);

    Ok(Some(ContentPlanEntry {
        path: path.to_path_buf(),
        lines,
        edits,
        encoding: decoded.encoding,
        status: ItemStatus::Pending,
        error: None,
    }))
}

/// Drops empty lines from the tail only, and never a line that carries an
/// edit, so every stored edit index stays valid.
fn trim_trailing_blank_lines(lines: &mut Vec<String>, edits: &[LineEdit]) {
    let floor = edits.iter().map(|edit| edit.line_index + 1).max().unwrap_or(0);
    while lines.len() > floor && lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
}

/// Immediate children of `dir`, directories and files separated, each group
/// ordered by configured case sensitivity. Unreadable directories list as
/// empty; entries that are neither file nor directory are skipped.
fn list_sorted(dir: &Path, case_sensitive: bool) -> (Vec<(String, PathBuf)>, Vec<(String, PathBuf)>) {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    let Ok(reader) = fs::read_dir(dir) else {
        return (dirs, files);
    };
    for entry in reader.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = dir.join(entry.file_name());
        if file_type.is_dir() {
            dirs.push((name, path));
        } else if file_type.is_file() {
            files.push((name, path));
        }
    }

    dirs.sort_by(|a, b| name_cmp(&a.0, &b.0, case_sensitive));
    files.sort_by(|a, b| name_cmp(&a.0, &b.0, case_sensitive));
    (dirs, files)
}

fn name_cmp(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    if case_sensitive {
        a.cmp(b)
    } else {
        a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
