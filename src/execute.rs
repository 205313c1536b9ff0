/*!
 * The executor: applies a planned [`Action`] list to disk in two phases
 * (§4.4) — file operations, then a directory mtime restoration pass.
 */

use std::fs;
use std::path::Path;

use filetime::FileTime;

use crate::error::{BackupError, Result};
use crate::model::{Action, ActionType};
use crate::source::Connection;
use crate::stats::Statistics;

/// Runs both executor phases for one tree's action list against
/// `target_dir`. `compare_dir` must be `Some` if any action is a
/// `Hardlink` (the planner never emits one without a compare root).
///
/// Per-action failures are logged and counted into `stats.backup_errors`;
/// the run continues. A connection-level fatal error (per
/// [`BackupError::is_fatal`]) aborts immediately and propagates.
pub fn execute(
    actions: &[Action],
    target_dir: &Path,
    compare_dir: Option<&Path>,
    connection: &mut dyn Connection,
    stats: &mut Statistics,
) -> Result<()> {
    run_file_operations(actions, target_dir, compare_dir, connection, stats)?;
    restore_directory_mtimes(actions, target_dir);
    Ok(())
}

fn run_file_operations(
    actions: &[Action],
    target_dir: &Path,
    compare_dir: Option<&Path>,
    connection: &mut dyn Connection,
    stats: &mut Statistics,
) -> Result<()> {
    let (deletes, rest): (Vec<&Action>, Vec<&Action>) =
        actions.iter().partition(|a| a.action_type == ActionType::Delete);

    for action in rest.into_iter().chain(deletes.into_iter().rev()) {
        let outcome = apply_action(action, target_dir, compare_dir, connection, stats);
        if let Err(e) = outcome {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::error!(
                "action {:?} on '{}' failed: {e}",
                action.action_type,
                action.rel_path.display()
            );
            stats.backup_errors += 1;
        }
    }
    Ok(())
}

fn apply_action(
    action: &Action,
    target_dir: &Path,
    compare_dir: Option<&Path>,
    connection: &mut dyn Connection,
    stats: &mut Statistics,
) -> Result<()> {
    let target_path = target_dir.join(&action.rel_path);

    match action.action_type {
        ActionType::Copy if action.is_dir => {
            fs::create_dir_all(&target_path)?;
        }
        ActionType::Copy => {
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let bytes = connection.copy_file(&action_metadata(action), &target_path)?;
            stats.bytes_copied += bytes;
            stats.files_copied += 1;
        }
        ActionType::Hardlink => {
            let compare_dir = compare_dir.ok_or_else(|| {
                BackupError::Other(format!(
                    "cannot hardlink '{}': no compare backup available",
                    action.rel_path.display()
                ))
            })?;
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let compare_path = compare_dir.join(&action.rel_path);
            fs::hard_link(&compare_path, &target_path)?;
            stats.files_hardlinked += 1;
            stats.bytes_hardlinked += action.file_size;
        }
        ActionType::Delete if action.is_dir => {
            fs::remove_dir_all(&target_path)?;
            stats.files_deleted += 1;
        }
        ActionType::Delete => {
            if let Ok(metadata) = target_path.metadata() {
                if metadata.permissions().readonly() {
                    let mut perms = metadata.permissions();
                    #[allow(clippy::permissions_set_readonly_false)]
                    perms.set_readonly(false);
                    fs::set_permissions(&target_path, perms)?;
                }
            }
            stats.bytes_deleted += action.file_size;
            fs::remove_file(&target_path)?;
            stats.files_deleted += 1;
        }
    }
    Ok(())
}

/// Writing files into a directory resets its mtime on most filesystems, so
/// directory mtimes are restored in a pass run strictly after every
/// non-DELETE action has completed.
fn restore_directory_mtimes(actions: &[Action], target_dir: &Path) {
    for action in actions {
        if action.action_type == ActionType::Delete || !action.is_dir {
            continue;
        }
        let target_path = target_dir.join(&action.rel_path);
        let mtime = FileTime::from_system_time(action.mod_time);
        if let Err(e) = filetime::set_file_mtime(&target_path, mtime) {
            tracing::error!("failed to restore mtime on '{}': {e}", target_path.display());
        }
    }
}

fn action_metadata(action: &Action) -> crate::model::FileMetadata {
    crate::model::FileMetadata {
        rel_path: action.rel_path.clone(),
        is_directory: action.is_dir,
        mod_time: action.mod_time,
        file_size: action.file_size,
        is_empty_dir: false,
    }
}
