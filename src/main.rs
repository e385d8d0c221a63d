use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use is_terminal::IsTerminal;

mod encoding;
mod error;
mod execute;
mod logging;
mod pattern;
mod plan;
mod preset;
mod scan;
mod summary;

use pattern::{NameMatcher, SearchCondition};
use plan::{
    ActionTarget, ActionType, ContentPlanEntry, ItemStatus, Plan, PlanNode, PlanShape,
    TargetChoice,
};
use preset::Preset;
use scan::ScanRequest;

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Remove(cmd) => handle_remove(cmd)?,
        Command::Rename(cmd) => handle_rename(cmd)?,
        Command::Edit(cmd) => handle_edit(cmd)?,
        Command::Preset(cmd) => handle_preset(cmd)?,
        Command::Run(cmd) => handle_run(cmd)?,
    }

    Ok(())
}

fn handle_remove(cmd: RemoveCommand) -> Result<()> {
    let target = filesystem_target(cmd.target)?;
    let request = ScanRequest {
        action: ActionType::Remove,
        target,
        root: cmd.common.dir.clone(),
        file_pattern: cmd.pattern,
        file_pattern_is_regex: cmd.regex_pattern,
        search_text: String::new(),
        search_is_regex: false,
        replace_text: String::new(),
        recursive: cmd.common.recursive,
        case_sensitive: cmd.common.case_sensitive,
    };
    run_batch(BatchSettings {
        request,
        label: "remove",
        auto_confirm: cmd.common.auto_confirm,
        dry_run: cmd.common.dry_run,
        skip: cmd.common.skip,
        highlight: false,
    })
}

fn handle_rename(cmd: RenameCommand) -> Result<()> {
    let target = filesystem_target(cmd.target)?;
    let request = ScanRequest {
        action: ActionType::Replace,
        target,
        root: cmd.common.dir.clone(),
        file_pattern: String::new(),
        file_pattern_is_regex: false,
        search_text: cmd.search,
        search_is_regex: cmd.regex,
        replace_text: cmd.replace,
        recursive: cmd.common.recursive,
        case_sensitive: cmd.common.case_sensitive,
    };
    run_batch(BatchSettings {
        request,
        label: "rename",
        auto_confirm: cmd.common.auto_confirm,
        dry_run: cmd.common.dry_run,
        skip: cmd.common.skip,
        highlight: false,
    })
}

fn handle_edit(cmd: EditCommand) -> Result<()> {
    // no --replace means strip the match: replace-with-empty
    let (action, replace_text) = match cmd.replace {
        Some(text) => (ActionType::Replace, text),
        None => (ActionType::Remove, String::new()),
    };
    let request = ScanRequest {
        action,
        target: ActionTarget::Contents,
        root: cmd.common.dir.clone(),
        file_pattern: cmd.pattern,
        file_pattern_is_regex: cmd.regex_pattern,
        search_text: cmd.search,
        search_is_regex: cmd.regex,
        replace_text,
        recursive: cmd.common.recursive,
        case_sensitive: cmd.common.case_sensitive,
    };
    run_batch(BatchSettings {
        request,
        label: "edit",
        auto_confirm: cmd.common.auto_confirm,
        dry_run: cmd.common.dry_run,
        skip: cmd.common.skip,
        highlight: cmd.highlight,
    })
}

fn handle_run(cmd: RunCommand) -> Result<()> {
    let store = preset::default_store_path();
    let presets = preset::load_all(&store)?;
    let Some(preset) = presets.get(&cmd.name) else {
        let available: Vec<_> = presets.keys().cloned().collect();
        if available.is_empty() {
            bail!("no presets stored yet; save one with 'preset save'");
        }
        bail!(
            "unknown preset '{}'; available: {}",
            cmd.name,
            available.join(", ")
        );
    };

    let settings = BatchSettings {
        request: request_from_preset(preset),
        label: preset_label(preset),
        auto_confirm: preset.auto_confirm || cmd.auto_confirm,
        dry_run: cmd.dry_run,
        skip: cmd.skip,
        highlight: preset.highlight_match,
    };
    run_batch(settings)
}

fn handle_preset(cmd: PresetCommand) -> Result<()> {
    let store = preset::default_store_path();
    match cmd.action {
        PresetAction::Save(save) => {
            let preset = Preset {
                action: save.action,
                target: save.target,
                recursive: save.recursive,
                case_sensitive: save.case_sensitive,
                auto_confirm: save.auto_confirm,
                file_pattern_is_regex: save.regex_pattern,
                search_is_regex: save.regex,
                highlight_match: save.highlight,
                dir_path: save.dir.display().to_string(),
                file_pattern: save.pattern,
                search_text: save.search,
                replace_text: save.replace,
            };
            validate_preset(&preset)?;
            preset::save(&store, &save.name, preset)?;
            println!("preset '{}' saved", save.name);
        }
        PresetAction::List => {
            let presets = preset::load_all(&store)?;
            if presets.is_empty() {
                println!("no presets stored");
            }
            for (name, preset) in &presets {
                println!(
                    "{name}: {} under {}",
                    preset_label(preset),
                    preset.dir_path
                );
            }
        }
        PresetAction::Show { name } => {
            let presets = preset::load_all(&store)?;
            let Some(preset) = presets.get(&name) else {
                bail!("unknown preset '{name}'");
            };
            println!("{}", serde_json::to_string_pretty(preset)?);
        }
        PresetAction::Delete { name } => {
            if !preset::remove(&store, &name)? {
                bail!("unknown preset '{name}'");
            }
            println!("preset '{name}' removed");
        }
    }
    Ok(())
}

/// Compiles the matchers a preset will need at run time, so broken patterns
/// are rejected at save time instead of on first use.
fn validate_preset(preset: &Preset) -> Result<()> {
    match preset.target {
        TargetChoice::FileContents => {
            NameMatcher::compile(
                &preset.file_pattern,
                preset.file_pattern_is_regex,
                preset.case_sensitive,
            )?;
            SearchCondition::compile(
                &preset.search_text,
                preset.search_is_regex,
                preset.case_sensitive,
            )?;
        }
        _ => match preset.action {
            ActionType::Remove => {
                NameMatcher::compile(
                    &preset.file_pattern,
                    preset.file_pattern_is_regex,
                    preset.case_sensitive,
                )?;
            }
            ActionType::Replace => {
                SearchCondition::compile(
                    &preset.search_text,
                    preset.search_is_regex,
                    preset.case_sensitive,
                )?;
            }
        },
    }
    Ok(())
}

fn request_from_preset(preset: &Preset) -> ScanRequest {
    ScanRequest {
        action: preset.action,
        target: preset.target.to_target(),
        root: PathBuf::from(&preset.dir_path),
        file_pattern: preset.file_pattern.clone(),
        file_pattern_is_regex: preset.file_pattern_is_regex,
        search_text: preset.search_text.clone(),
        search_is_regex: preset.search_is_regex,
        replace_text: preset.replace_text.clone(),
        recursive: preset.recursive,
        case_sensitive: preset.case_sensitive,
    }
}

fn preset_label(preset: &Preset) -> &'static str {
    match (preset.action, preset.target) {
        (_, TargetChoice::FileContents) => "edit",
        (ActionType::Remove, _) => "remove",
        (ActionType::Replace, _) => "rename",
    }
}

fn filesystem_target(choice: TargetChoice) -> Result<ActionTarget> {
    if choice == TargetChoice::FileContents {
        bail!("file contents are handled by the 'edit' command");
    }
    Ok(choice.to_target())
}

struct BatchSettings {
    request: ScanRequest,
    label: &'static str,
    auto_confirm: bool,
    dry_run: bool,
    skip: Vec<usize>,
    highlight: bool,
}

/// The preview-then-commit cycle: scan, apply per-item opt-outs, show the
/// plan, confirm, commit, show the plan again with per-item outcomes.
fn run_batch(settings: BatchSettings) -> Result<()> {
    let mut plan = scan::scan(&settings.request)
        .with_context(|| format!("scanning {}", settings.request.root.display()))?;

    plan.deselect(&settings.skip);
    let highlight = settings.highlight && io::stdout().is_terminal();
    render_plan(&plan, highlight, false);

    if plan.selectable_count() == 0 {
        println!("no matches found");
        return Ok(());
    }

    if settings.dry_run {
        println!("dry-run: no changes written");
        return Ok(());
    }

    if !settings.auto_confirm && !confirm_commit()? {
        println!("aborted; no changes written");
        return Ok(());
    }

    let summary = execute::execute(&mut plan)?;
    render_plan(&plan, highlight, true);
    println!("{summary}");

    if let Err(err) =
        logging::record_commit(settings.label, &settings.request.root, &summary.to_string())
    {
        eprintln!("warning: could not write change log: {err:#}");
    }

    Ok(())
}

fn confirm_commit() -> Result<bool> {
    if !io::stdin().is_terminal() {
        bail!("stdin is not a terminal; pass --yes to commit without a prompt");
    }
    print!("Commit these changes? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn render_plan(plan: &Plan, highlight: bool, with_status: bool) {
    match &plan.shape {
        PlanShape::Tree(root) => {
            println!("{}", root.path.display());
            let mut index = 0usize;
            for child in &root.children {
                render_node(child, 1, &mut index, highlight, with_status);
            }
        }
        PlanShape::Contents(entries) => {
            let mut index = 0usize;
            for entry in entries {
                render_content_entry(entry, &mut index, highlight, with_status);
            }
        }
    }
}

fn render_node(
    node: &PlanNode,
    depth: usize,
    index: &mut usize,
    highlight: bool,
    with_status: bool,
) {
    let indent = "  ".repeat(depth);
    let kind = match node.kind {
        plan::EntryKind::Directory => "dir",
        plan::EntryKind::File => "file",
    };

    if node.executable {
        let mark = if node.selected { "x" } else { " " };
        let mut line = format!("{indent}[{mark}] #{index} {} ({kind})", node.name);
        if let Some(proposed) = &node.proposed_name {
            line.push_str(" -> ");
            line.push_str(&emphasize(proposed, highlight));
        }
        line.push_str(status_marker(node.status, with_status));
        println!("{line}");
        *index += 1;
    } else {
        println!("{indent}{}/", node.name);
    }

    for child in &node.children {
        render_node(child, depth + 1, index, highlight, with_status);
    }
}

fn render_content_entry(
    entry: &ContentPlanEntry,
    index: &mut usize,
    highlight: bool,
    with_status: bool,
) {
    let mut header = entry.path.display().to_string();
    if let Some(error) = &entry.error {
        header.push_str(" - ");
        header.push_str(error);
    }
    header.push_str(status_marker(entry.status, with_status || entry.error.is_some()));
    println!("{header}");

    for edit in &entry.edits {
        let mark = if edit.selected { "x" } else { " " };
        println!(
            "  [{mark}] #{index} line {}: {} => {}{}",
            edit.line_index + 1,
            edit.original,
            emphasize(&edit.proposed, highlight),
            status_marker(edit.status, with_status)
        );
        *index += 1;
    }
}

fn status_marker(status: ItemStatus, with_status: bool) -> &'static str {
    if !with_status {
        return "";
    }
    match status {
        ItemStatus::Pending => "",
        ItemStatus::Done => "  ok",
        ItemStatus::Failed => "  FAILED",
    }
}

fn emphasize(text: &str, highlight: bool) -> String {
    if highlight {
        format!("\x1b[33m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "bulkedit",
    version,
    about = "Preview-first bulk remove, rename, and in-file replace"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Delete matching files and/or directories
    Remove(RemoveCommand),
    /// Rename matching files and/or directories
    Rename(RenameCommand),
    /// Find and replace text inside matching files
    Edit(EditCommand),
    /// Manage stored presets
    Preset(PresetCommand),
    /// Run a stored preset
    Run(RunCommand),
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    #[arg(long = "dir", value_name = "DIR", value_hint = ValueHint::DirPath)]
    dir: PathBuf,
    #[arg(long, action = ArgAction::SetTrue)]
    recursive: bool,
    #[arg(long = "case-sensitive", action = ArgAction::SetTrue)]
    case_sensitive: bool,
    #[arg(long = "yes", action = ArgAction::SetTrue)]
    auto_confirm: bool,
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Deselect a plan item by its displayed #index (repeatable)
    #[arg(long = "skip", value_name = "INDEX")]
    skip: Vec<usize>,
}

#[derive(Debug, Args)]
struct RemoveCommand {
    #[command(flatten)]
    common: CommonArgs,
    /// Quoted wildcard filters, e.g. '"*.txt" "*.md"'
    #[arg(long, value_name = "FILTERS")]
    pattern: String,
    #[arg(long = "regex-pattern", action = ArgAction::SetTrue)]
    regex_pattern: bool,
    #[arg(long, value_enum, default_value = "files")]
    target: TargetChoice,
}

#[derive(Debug, Args)]
struct RenameCommand {
    #[command(flatten)]
    common: CommonArgs,
    /// Text (or regex with --regex) matched against entry names
    #[arg(long, value_name = "TEXT")]
    search: String,
    #[arg(long, value_name = "TEXT", default_value = "")]
    replace: String,
    #[arg(long, action = ArgAction::SetTrue)]
    regex: bool,
    #[arg(long, value_enum, default_value = "files")]
    target: TargetChoice,
}

#[derive(Debug, Args)]
struct EditCommand {
    #[command(flatten)]
    common: CommonArgs,
    /// Quoted wildcard filters selecting which files to read
    #[arg(long, value_name = "FILTERS")]
    pattern: String,
    #[arg(long = "regex-pattern", action = ArgAction::SetTrue)]
    regex_pattern: bool,
    /// Text (or regex with --regex) matched against each line
    #[arg(long, value_name = "TEXT")]
    search: String,
    #[arg(long, action = ArgAction::SetTrue)]
    regex: bool,
    /// Replacement text; omit to delete the matched text instead
    #[arg(long, value_name = "TEXT")]
    replace: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    highlight: bool,
}

#[derive(Debug, Args)]
struct PresetCommand {
    #[command(subcommand)]
    action: PresetAction,
}

#[derive(Debug, Subcommand)]
enum PresetAction {
    /// Store the given settings under a name
    Save(PresetSaveCommand),
    /// List stored presets
    List,
    /// Print one preset in full
    Show {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Delete a stored preset
    Delete {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(Debug, Args)]
struct PresetSaveCommand {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(long, value_enum)]
    action: ActionType,
    #[arg(long, value_enum)]
    target: TargetChoice,
    #[arg(long = "dir", value_name = "DIR", value_hint = ValueHint::DirPath)]
    dir: PathBuf,
    #[arg(long, value_name = "FILTERS", default_value = "")]
    pattern: String,
    #[arg(long = "regex-pattern", action = ArgAction::SetTrue)]
    regex_pattern: bool,
    #[arg(long, value_name = "TEXT", default_value = "")]
    search: String,
    #[arg(long, action = ArgAction::SetTrue)]
    regex: bool,
    #[arg(long, value_name = "TEXT", default_value = "")]
    replace: String,
    #[arg(long, action = ArgAction::SetTrue)]
    recursive: bool,
    #[arg(long = "case-sensitive", action = ArgAction::SetTrue)]
    case_sensitive: bool,
    #[arg(long = "yes", action = ArgAction::SetTrue)]
    auto_confirm: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    highlight: bool,
}

#[derive(Debug, Args)]
struct RunCommand {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(long = "yes", action = ArgAction::SetTrue)]
    auto_confirm: bool,
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    #[arg(long = "skip", value_name = "INDEX")]
    skip: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_preset(action: ActionType, target: TargetChoice) -> Preset {
        Preset {
            action,
            target,
            recursive: true,
            case_sensitive: true,
            auto_confirm: false,
            file_pattern_is_regex: false,
            search_is_regex: false,
            highlight_match: false,
            dir_path: "/tmp/data".to_string(),
            file_pattern: "\"*.txt\"".to_string(),
            search_text: "old".to_string(),
            replace_text: "new".to_string(),
        }
    }

    #[test]
    fn preset_labels_follow_action_and_target() {
        assert_eq!(
            preset_label(&sample_preset(ActionType::Remove, TargetChoice::Files)),
            "remove"
        );
        assert_eq!(
            preset_label(&sample_preset(ActionType::Replace, TargetChoice::FilesDirs)),
            "rename"
        );
        assert_eq!(
            preset_label(&sample_preset(ActionType::Remove, TargetChoice::FileContents)),
            "edit"
        );
    }

    #[test]
    fn run_request_mirrors_the_preset() {
        let preset = sample_preset(ActionType::Replace, TargetChoice::FileContents);
        let request = request_from_preset(&preset);
        assert_eq!(request.action, ActionType::Replace);
        assert_eq!(request.target, ActionTarget::Contents);
        assert_eq!(request.root, PathBuf::from("/tmp/data"));
        assert_eq!(request.search_text, "old");
        assert_eq!(request.replace_text, "new");
    }

    #[test]
    fn preset_validation_rejects_broken_patterns() {
        let mut preset = sample_preset(ActionType::Remove, TargetChoice::Files);
        preset.file_pattern = "unquoted".to_string();
        assert!(validate_preset(&preset).is_err());

        let mut preset = sample_preset(ActionType::Replace, TargetChoice::FileContents);
        preset.search_is_regex = true;
        preset.search_text = "(unclosed".to_string();
        assert!(validate_preset(&preset).is_err());
    }

    #[test]
    fn contents_target_is_rejected_for_name_based_commands() {
        assert!(filesystem_target(TargetChoice::FileContents).is_err());
        assert!(filesystem_target(TargetChoice::FilesDirs).is_ok());
    }
}
