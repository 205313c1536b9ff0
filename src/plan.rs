/*!
 * The planner: turns a merged entry list into an ordered [`Action`] list
 * (§4.3), applying the per-entry decision table left to right.
 */

use std::path::{Path, PathBuf};

use crate::config::{BackupMode, CompareMethod};
use crate::model::{Action, ActionType, HtmlFlag, MergedEntry};
use crate::source::Connection;
use crate::stats::Statistics;

/// Runs the planner over `merged`, the scan/merge output for one source
/// tree, and returns the ordered action list the executor will apply.
///
/// `compare_dir` is `None` when there is no prior successful backup to
/// compare against; in that case every `in_compare` entry is necessarily
/// absent (the merger never produces one without a compare scan) and rows 4
/// through 7 of the decision table never fire.
#[allow(clippy::too_many_arguments)]
pub fn plan(
    merged: &[MergedEntry],
    mode: BackupMode,
    versioned: bool,
    compare_with_last_backup: bool,
    copy_empty_dirs: bool,
    compare_method: &[CompareMethod],
    compare_dir: Option<&Path>,
    connection: &mut dyn Connection,
    stats: &mut Statistics,
) -> Vec<Action> {
    if versioned && compare_with_last_backup && mode != BackupMode::Hardlink {
        tracing::warn!(
            "mode={mode:?} with versioned+compare_with_last_backup hard-links nothing; \
             unchanged files are neither copied nor linked into the new version"
        );
    }

    let mut actions = Vec::new();
    let mut new_dir_root: Option<PathBuf> = None;

    for entry in merged {
        let meta = &entry.metadata;

        if entry.in_source && !entry.in_compare && meta.is_directory {
            if meta.is_empty_dir {
                if copy_empty_dirs {
                    actions.push(Action {
                        action_type: ActionType::Copy,
                        is_dir: true,
                        rel_path: meta.rel_path.clone(),
                        mod_time: meta.mod_time,
                        html_flag: Some(HtmlFlag::EmptyDir),
                        file_size: 0,
                    });
                }
                // A directory that stays outside any tracked new-dir-root
                // does not reset it; an empty directory has no descendants
                // to tag regardless.
            } else {
                new_dir_root = Some(meta.rel_path.clone());
                actions.push(Action {
                    action_type: ActionType::Copy,
                    is_dir: true,
                    rel_path: meta.rel_path.clone(),
                    mod_time: meta.mod_time,
                    html_flag: Some(HtmlFlag::NewDir),
                    file_size: 0,
                });
            }
            continue;
        }

        if entry.in_source && !entry.in_compare && !meta.is_directory {
            let under_new_dir = is_under(&meta.rel_path, new_dir_root.as_deref());
            actions.push(Action {
                action_type: ActionType::Copy,
                is_dir: false,
                rel_path: meta.rel_path.clone(),
                mod_time: meta.mod_time,
                html_flag: Some(if under_new_dir { HtmlFlag::InNewDir } else { HtmlFlag::New }),
                file_size: meta.file_size,
            });
            stats.files_to_copy += 1;
            stats.bytes_to_copy += meta.file_size;
            continue;
        }

        if meta.is_directory && !is_under(&meta.rel_path, new_dir_root.as_deref()) {
            new_dir_root = None;
        }

        if entry.in_source && entry.in_compare && meta.is_directory {
            if versioned && compare_with_last_backup {
                actions.push(Action {
                    action_type: ActionType::Copy,
                    is_dir: true,
                    rel_path: meta.rel_path.clone(),
                    mod_time: meta.mod_time,
                    html_flag: Some(if meta.is_empty_dir {
                        HtmlFlag::EmptyDir
                    } else {
                        HtmlFlag::ExistingDir
                    }),
                    file_size: 0,
                });
            }
            continue;
        }

        if entry.in_source && entry.in_compare && !meta.is_directory {
            let compare_path = compare_dir.map(|dir| dir.join(&meta.rel_path));
            let files_eq = match &compare_path {
                Some(path) => connection
                    .files_equal(meta, path, compare_method)
                    .unwrap_or(false),
                None => false,
            };

            if files_eq && mode == BackupMode::Hardlink {
                actions.push(Action {
                    action_type: ActionType::Hardlink,
                    is_dir: false,
                    rel_path: meta.rel_path.clone(),
                    mod_time: meta.mod_time,
                    html_flag: None,
                    file_size: meta.file_size,
                });
                stats.files_to_hardlink += 1;
                stats.bytes_to_hardlink += meta.file_size;
            } else if !files_eq {
                actions.push(Action {
                    action_type: ActionType::Copy,
                    is_dir: false,
                    rel_path: meta.rel_path.clone(),
                    mod_time: meta.mod_time,
                    html_flag: Some(HtmlFlag::Modified),
                    file_size: meta.file_size,
                });
                stats.files_to_copy += 1;
                stats.bytes_to_copy += meta.file_size;
            }
            continue;
        }

        if !entry.in_source && entry.in_compare {
            let should_delete = mode == BackupMode::Mirror && !(compare_with_last_backup && versioned);
            if should_delete {
                actions.push(Action {
                    action_type: ActionType::Delete,
                    is_dir: meta.is_directory,
                    rel_path: meta.rel_path.clone(),
                    mod_time: meta.mod_time,
                    html_flag: None,
                    file_size: meta.file_size,
                });
                stats.files_to_delete += 1;
                stats.bytes_to_delete += meta.file_size;
            }
        }
    }

    actions
}

/// True if `rel_path` lies strictly under `root` (not equal to it).
fn is_under(rel_path: &Path, root: Option<&Path>) -> bool {
    match root {
        Some(root) => rel_path != root && rel_path.starts_with(root),
        None => false,
    }
}
