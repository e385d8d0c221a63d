use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::encoding;
use crate::error::EngineError;
use crate::plan::{
    ActionTarget, ActionType, ContentPlanEntry, EntryKind, ItemStatus, Plan, PlanNode, PlanShape,
};
use crate::summary::{ContentCounts, FsCounts, Summary};

/// Commits the selected subset of `plan` to disk and records the per-item
/// outcome back into the plan. Per-item failures are counted and never abort
/// the batch; only a plan whose shape contradicts its own action is refused.
pub fn execute(plan: &mut Plan) -> Result<Summary, EngineError> {
    match (plan.target, plan.action) {
        (ActionTarget::Filesystem(_), ActionType::Remove) => {
            let PlanShape::Tree(root) = &mut plan.shape else {
                return Err(EngineError::InvariantViolation(
                    "removal committed against a content plan",
                ));
            };
            let mut counts = FsCounts::default();
            run_removal(root, &mut counts);
            Ok(Summary::Removal(counts))
        }
        (ActionTarget::Filesystem(_), ActionType::Replace) => {
            let PlanShape::Tree(root) = &mut plan.shape else {
                return Err(EngineError::InvariantViolation(
                    "rename committed against a content plan",
                ));
            };
            Ok(Summary::Rename(run_rename(root)?))
        }
        (ActionTarget::Contents, _) => {
            let PlanShape::Contents(entries) = &mut plan.shape else {
                return Err(EngineError::InvariantViolation(
                    "content edit committed against a filesystem plan",
                ));
            };
            Ok(Summary::ContentEdit(run_content(entries)))
        }
    }
}

/// Removal order is irrelevant: a matched directory is removed wholesale,
/// its subtree was never listed separately in the plan.
fn run_removal(node: &mut PlanNode, counts: &mut FsCounts) {
    if node.executable && node.selected {
        let ok = match node.kind {
            EntryKind::Directory => remove_dir_tree(&node.path).is_ok(),
            EntryKind::File => remove_one_file(&node.path).is_ok(),
        };
        counts.record(node.kind == EntryKind::Directory, ok);
        node.status = if ok { ItemStatus::Done } else { ItemStatus::Failed };
    }
    for child in &mut node.children {
        run_removal(child, counts);
    }
}

/// Renames run in reverse discovery order: a descendant must be moved under
/// its parent's original name before the parent itself is renamed, or the
/// descendant's scan-time path goes stale.
fn run_rename(root: &mut PlanNode) -> Result<FsCounts, EngineError> {
    let mut counts = FsCounts::default();
    let order = root.executable_paths();
    for path in order.iter().rev() {
        let node = root.node_mut(path);
        if !node.selected {
            continue;
        }
        let Some(proposed) = node.proposed_name.clone() else {
            return Err(EngineError::InvariantViolation(
                "executable rename node carries no proposed name",
            ));
        };
        let Some(parent) = node.path.parent() else {
            return Err(EngineError::InvariantViolation(
                "rename node resolves to a filesystem root",
            ));
        };
        let ok = fs::rename(&node.path, parent.join(&proposed)).is_ok();
        counts.record(node.kind == EntryKind::Directory, ok);
        node.status = if ok { ItemStatus::Done } else { ItemStatus::Failed };
    }
    Ok(counts)
}

fn run_content(entries: &mut [ContentPlanEntry]) -> ContentCounts {
    let mut counts = ContentCounts::default();
    for entry in entries {
        if !entry.edits.iter().any(|edit| edit.selected) {
            continue;
        }
        match rewrite_file(entry) {
            Ok(applied) => {
                counts.files_ok += 1;
                counts.lines_ok += applied;
                entry.status = ItemStatus::Done;
            }
            Err(err) => {
                counts.files_failed += 1;
                entry.status = ItemStatus::Failed;
                entry.error = Some(err.to_string());
                for edit in &mut entry.edits {
                    if edit.selected {
                        edit.status = ItemStatus::Failed;
                        counts.lines_failed += 1;
                    }
                }
            }
        }
    }
    counts
}

/// Writes the file back in full: every scan-time line in original order,
/// with the selected edits substituted in place. The output is encoded back
/// into the encoding the file was read as, so untouched lines keep their
/// original bytes.
fn rewrite_file(entry: &mut ContentPlanEntry) -> io::Result<u32> {
    let mut lines = entry.lines.clone();
    let mut applied = 0u32;
    for edit in &mut entry.edits {
        if !edit.selected {
            continue;
        }
        lines[edit.line_index] = edit.proposed.clone();
        edit.status = ItemStatus::Done;
        applied += 1;
    }

    let mut text = String::new();
    for line in &lines {
        text.push_str(line);
        text.push('\n');
    }
    fs::write(&entry.path, encoding::encode(&text, entry.encoding))?;
    Ok(applied)
}

fn remove_one_file(path: &Path) -> io::Result<()> {
    let _ = relax_permissions(path);
    fs::remove_file(path)
}

/// Bottom-up delete: a first top-down pass relaxes directory permissions so
/// every level can be listed, then a contents-first pass unlinks files and
/// removes each emptied directory.
fn remove_dir_tree(dir: &Path) -> io::Result<()> {
    for entry in WalkDir::new(dir).into_iter().flatten() {
        if entry.file_type().is_dir() {
            let _ = relax_permissions(entry.path());
        }
    }

    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = entry.map_err(|err| {
            err.into_io_error().unwrap_or_else(|| io::Error::other("unreadable directory entry"))
        })?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            let _ = relax_permissions(entry.path());
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn relax_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::symlink_metadata(path)?;
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | 0o700);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn relax_permissions(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let mut perms = meta.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FsTargets;
    use crate::scan::{ScanRequest, scan};
    use tempfile::tempdir;

    fn removal_request(root: &Path, pattern: &str, targets: FsTargets) -> ScanRequest {
        ScanRequest {
            action: ActionType::Remove,
            target: ActionTarget::Filesystem(targets),
            root: root.to_path_buf(),
            file_pattern: pattern.to_string(),
            file_pattern_is_regex: false,
            search_text: String::new(),
            search_is_regex: false,
            replace_text: String::new(),
            recursive: true,
            case_sensitive: true,
        }
    }

    fn rename_request(root: &Path, search: &str, replace: &str) -> ScanRequest {
        ScanRequest {
            action: ActionType::Replace,
            target: ActionTarget::Filesystem(FsTargets::FILES | FsTargets::DIRS),
            root: root.to_path_buf(),
            file_pattern: String::new(),
            file_pattern_is_regex: false,
            search_text: search.to_string(),
            search_is_regex: false,
            replace_text: replace.to_string(),
            recursive: true,
            case_sensitive: true,
        }
    }

    fn content_request(root: &Path, search: &str, replace: &str) -> ScanRequest {
        ScanRequest {
            action: ActionType::Replace,
            target: ActionTarget::Contents,
            root: root.to_path_buf(),
            file_pattern: "\"*.txt\"".to_string(),
            file_pattern_is_regex: false,
            search_text: search.to_string(),
            search_is_regex: false,
            replace_text: replace.to_string(),
            recursive: true,
            case_sensitive: true,
        }
    }

    #[test]
    fn removal_deletes_matched_files_and_directories() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        fs::write(temp.path().join("keep.log"), "x").unwrap();
        fs::create_dir_all(temp.path().join("a_dir/nested")).unwrap();
        fs::write(temp.path().join("a_dir/nested/deep.bin"), "x").unwrap();

        let mut plan = scan(&removal_request(
            temp.path(),
            "\"a*\"",
            FsTargets::FILES | FsTargets::DIRS,
        ))
        .unwrap();
        let summary = execute(&mut plan).unwrap();

        assert!(!temp.path().join("a.txt").exists());
        assert!(!temp.path().join("a_dir").exists());
        assert!(temp.path().join("keep.log").exists());
        assert_eq!(
            summary,
            Summary::Removal(FsCounts {
                dirs_ok: 1,
                files_ok: 1,
                ..FsCounts::default()
            })
        );
    }

    #[test]
    fn deselected_removal_item_is_left_on_disk_and_uncounted() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        fs::write(temp.path().join("b.txt"), "x").unwrap();

        let mut plan =
            scan(&removal_request(temp.path(), "\"*.txt\"", FsTargets::FILES)).unwrap();
        plan.deselect(&[1]);
        let summary = execute(&mut plan).unwrap();

        assert!(!temp.path().join("a.txt").exists());
        assert!(temp.path().join("b.txt").exists());
        assert_eq!(
            summary,
            Summary::Removal(FsCounts {
                files_ok: 1,
                ..FsCounts::default()
            })
        );
    }

    #[cfg(unix)]
    #[test]
    fn removal_clears_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let dir = temp.path().join("locked_dir");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("inner.txt"), "x").unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o500)).unwrap();

        let mut plan =
            scan(&removal_request(temp.path(), "\"locked*\"", FsTargets::DIRS)).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert!(!dir.exists());
        assert_eq!(
            summary,
            Summary::Removal(FsCounts {
                dirs_ok: 1,
                ..FsCounts::default()
            })
        );
    }

    #[test]
    fn rename_commits_descendants_before_their_parent() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("old")).unwrap();
        fs::write(temp.path().join("old/old_item.txt"), "payload").unwrap();

        let mut plan = scan(&rename_request(temp.path(), "old", "new")).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert!(!temp.path().join("old").exists());
        assert!(temp.path().join("new").is_dir());
        let renamed = temp.path().join("new/new_item.txt");
        assert_eq!(fs::read_to_string(&renamed).unwrap(), "payload");
        assert_eq!(
            summary,
            Summary::Rename(FsCounts {
                dirs_ok: 1,
                files_ok: 1,
                ..FsCounts::default()
            })
        );
    }

    #[test]
    fn rename_of_deeply_nested_chain_never_uses_stale_paths() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("old_a/old_b")).unwrap();
        fs::write(temp.path().join("old_a/old_b/old_c.txt"), "x").unwrap();

        let mut plan = scan(&rename_request(temp.path(), "old", "new")).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert!(temp.path().join("new_a/new_b/new_c.txt").is_file());
        assert_eq!(
            summary,
            Summary::Rename(FsCounts {
                dirs_ok: 2,
                files_ok: 1,
                ..FsCounts::default()
            })
        );
    }

    #[test]
    fn deselected_rename_keeps_the_original_name() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("old_one.txt"), "x").unwrap();
        fs::write(temp.path().join("old_two.txt"), "x").unwrap();

        let mut plan = scan(&rename_request(temp.path(), "old", "new")).unwrap();
        plan.deselect(&[0]);
        let summary = execute(&mut plan).unwrap();

        assert!(temp.path().join("old_one.txt").exists());
        assert!(temp.path().join("new_two.txt").exists());
        assert_eq!(
            summary,
            Summary::Rename(FsCounts {
                files_ok: 1,
                ..FsCounts::default()
            })
        );
    }

    #[test]
    fn content_commit_rewrites_only_selected_edits() {
        let temp = tempdir().unwrap();
        let notes = temp.path().join("notes.txt");
        fs::write(&notes, "foo\nbar foo\n\n").unwrap();

        let mut plan = scan(&content_request(temp.path(), "foo", "baz")).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert_eq!(fs::read_to_string(&notes).unwrap(), "baz\nbar baz\n");
        assert_eq!(
            summary,
            Summary::ContentEdit(ContentCounts {
                files_ok: 1,
                lines_ok: 2,
                ..ContentCounts::default()
            })
        );
    }

    #[test]
    fn deselected_line_edit_is_written_back_unchanged() {
        let temp = tempdir().unwrap();
        let notes = temp.path().join("notes.txt");
        fs::write(&notes, "foo\nbar foo\n").unwrap();

        let mut plan = scan(&content_request(temp.path(), "foo", "baz")).unwrap();
        plan.deselect(&[1]);
        let summary = execute(&mut plan).unwrap();

        assert_eq!(fs::read_to_string(&notes).unwrap(), "baz\nbar foo\n");
        assert_eq!(
            summary,
            Summary::ContentEdit(ContentCounts {
                files_ok: 1,
                lines_ok: 1,
                ..ContentCounts::default()
            })
        );
    }

    #[test]
    fn unedited_legacy_encoded_lines_survive_a_commit_byte_for_byte() {
        let temp = tempdir().unwrap();
        let notes = temp.path().join("notes.txt");
        fs::write(&notes, b"caf\xe9 au lait\nfoo\n").unwrap();

        let mut plan = scan(&content_request(temp.path(), "foo", "bar")).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert_eq!(fs::read(&notes).unwrap(), b"caf\xe9 au lait\nbar\n");
        assert_eq!(
            summary,
            Summary::ContentEdit(ContentCounts {
                files_ok: 1,
                lines_ok: 1,
                ..ContentCounts::default()
            })
        );
    }

    #[test]
    fn file_without_matches_is_never_touched() {
        let temp = tempdir().unwrap();
        let clean = temp.path().join("clean.txt");
        fs::write(&clean, "nothing relevant\nat all\n").unwrap();

        let mut plan = scan(&content_request(temp.path(), "foo", "baz")).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert_eq!(fs::read(&clean).unwrap(), b"nothing relevant\nat all\n");
        assert_eq!(summary, Summary::ContentEdit(ContentCounts::default()));
    }

    #[cfg(unix)]
    #[test]
    fn content_commit_failure_marks_the_entry_and_the_batch_continues() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let locked = temp.path().join("locked.txt");
        fs::write(&locked, "foo\n").unwrap();
        fs::write(temp.path().join("open.txt"), "foo\n").unwrap();

        let mut plan = scan(&content_request(temp.path(), "foo", "bar")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o400)).unwrap();
        if fs::write(&locked, "foo\n").is_ok() {
            // running as root, permission bits are not enforced
            return;
        }
        let summary = execute(&mut plan).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(
            summary,
            Summary::ContentEdit(ContentCounts {
                files_ok: 1,
                lines_ok: 1,
                files_failed: 1,
                lines_failed: 1,
            })
        );
        let PlanShape::Contents(entries) = &plan.shape else {
            unreachable!();
        };
        assert_eq!(entries[0].status, ItemStatus::Failed);
        assert!(entries[0].error.is_some());
        assert_eq!(entries[1].status, ItemStatus::Done);
        assert_eq!(fs::read_to_string(&locked).unwrap(), "foo\n");
    }

    #[test]
    fn mismatched_plan_shape_is_an_invariant_violation() {
        let mut plan = Plan {
            action: ActionType::Remove,
            target: ActionTarget::Filesystem(FsTargets::FILES),
            shape: PlanShape::Contents(Vec::new()),
        };
        assert!(matches!(
            execute(&mut plan),
            Err(EngineError::InvariantViolation(_))
        ));

        let mut plan = Plan {
            action: ActionType::Replace,
            target: ActionTarget::Contents,
            shape: PlanShape::Tree(PlanNode::container("root".into(), "/tmp".into())),
        };
        assert!(matches!(
            execute(&mut plan),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn item_that_vanishes_before_commit_is_counted_failed() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        fs::write(temp.path().join("b.txt"), "x").unwrap();

        let mut plan =
            scan(&removal_request(temp.path(), "\"*.txt\"", FsTargets::FILES)).unwrap();
        fs::remove_file(temp.path().join("a.txt")).unwrap();
        let summary = execute(&mut plan).unwrap();

        assert!(!temp.path().join("b.txt").exists());
        assert_eq!(
            summary,
            Summary::Removal(FsCounts {
                files_ok: 1,
                files_failed: 1,
                ..FsCounts::default()
            })
        );
        let PlanShape::Tree(root) = &plan.shape else {
            unreachable!();
        };
        assert_eq!(root.children[0].status, ItemStatus::Failed);
        assert_eq!(root.children[1].status, ItemStatus::Done);
    }

    #[test]
    fn statuses_are_recorded_per_item() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();

        let mut plan =
            scan(&removal_request(temp.path(), "\"*.txt\"", FsTargets::FILES)).unwrap();
        execute(&mut plan).unwrap();
        let PlanShape::Tree(root) = &plan.shape else {
            unreachable!();
        };
        assert_eq!(root.children[0].status, ItemStatus::Done);
    }
}
