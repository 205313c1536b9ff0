/*!
 * The job controller: drives one backup run from config to finished
 * `metadata.json`, orchestrating the scan/merge/plan/execute pipeline
 * defined in [`crate::scan`], [`crate::plan`] and [`crate::execute`] (§4.5).
 */

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{Config, Policy};
use crate::error::{BackupError, Result};
use crate::model::{Action, ActionRecord, ActionTreeRecord, BackupMetadata, FileMetadata, SourceDescriptor};
use crate::source::{self, DataSource};
use crate::stats::Statistics;

const METADATA_FILENAME: &str = "metadata.json";
const ACTIONS_FILENAME: &str = "actions.json";
const LOG_FILENAME: &str = "log.txt";

/// One source's full pipeline state: the resolved connection, its target and
/// compare subdirectories, and the plan it produced.
struct Tree {
    name: String,
    target_dir: PathBuf,
    compare_dir: Option<PathBuf>,
    actions: Vec<Action>,
    source_descriptor: SourceDescriptor,
}

/// Runs one complete backup job against `config`, returning the accumulated
/// statistics. Mirrors `BackupJob`'s step sequence: availability checks,
/// target allocation, compare-backup discovery, scan/plan for every source,
/// a free-space check, then execution.
pub fn run(config: &Config) -> Result<Statistics> {
    let mut stats = Statistics::new();

    let available_sources = check_source_and_target_availability(config)?;

    let target_root = allocate_target_root(&config.backup_root_dir, &config.version_name, config.versioned)?;
    let log_path = target_root.join(LOG_FILENAME);
    crate::logging::attach_target_log(&log_path)?;

    let compare_root = find_compare_root(config, &target_root)?;

    let mut metadata = BackupMetadata {
        name: dir_name(&target_root),
        successful: false,
        started: unix_now(),
        sources: config
            .sources
            .iter()
            .map(|s| SourceDescriptor {
                name: s.name.clone(),
                dir: s.dir.clone(),
                exclude_paths: s.exclude_paths.clone(),
            })
            .collect(),
        compare_backup: compare_root.clone(),
        backup_directory: target_root.clone(),
    };
    write_metadata(&target_root, &metadata)?;

    let mut trees = Vec::new();
    for (config_source, available_source) in config.sources.iter().zip(available_sources.iter()) {
        let Some(available_source) = available_source else {
            continue;
        };
        tracing::info!("scanning source '{}' at '{}'", config_source.name, config_source.dir);

        let target_dir = target_root.join(&config_source.name);
        let compare_dir = compare_root.as_ref().map(|root| root.join(&config_source.name));

        let mut connection = available_source.connect()?;
        let source_entries = connection.scan(&config_source.exclude_paths, &mut stats)?;
        accumulate_source_stats(&source_entries, &mut stats);

        let compare_entries = match &compare_dir {
            Some(dir) if dir.is_dir() => {
                let entries = crate::scan::scan_compare_dir(dir, &mut stats)?;
                accumulate_compare_stats(&entries, &mut stats);
                entries
            }
            _ => Vec::new(),
        };

        let merged = crate::scan::merge(source_entries, compare_entries);
        if merged.is_empty() {
            tracing::warn!("there are no files in the source '{}'; no actions will be generated", config_source.name);
        }

        let actions = crate::plan::plan(
            &merged,
            config.mode,
            config.versioned,
            config.compare_with_last_backup,
            config.copy_empty_dirs,
            &config.compare_method,
            compare_dir.as_deref(),
            connection.as_mut(),
            &mut stats,
        );

        trees.push(Tree {
            name: config_source.name.clone(),
            target_dir,
            compare_dir,
            actions,
            source_descriptor: SourceDescriptor {
                name: config_source.name.clone(),
                dir: config_source.dir.clone(),
                exclude_paths: config_source.exclude_paths.clone(),
            },
        });
    }

    tracing::info!("{}", stats.scanning_protocol());
    tracing::info!("{}", stats.action_generation_protocol());

    if config.save_actionfile {
        write_action_file(&target_root, &trees)?;
    }

    enforce_scan_budget(stats.scanning_errors, config.max_scanning_errors)?;

    if !config.apply_actions {
        tracing::info!("apply_actions is false; no actions will be performed");
        write_metadata(&target_root, &metadata)?;
        return Ok(stats);
    }

    check_free_space(&target_root, stats.bytes_to_copy, config.target_drive_full_action)?;

    for tree in &trees {
        tracing::debug!("applying actions for tree '{}'", tree.name);
        let mut connection = resolve_connection(&tree.source_descriptor)?;
        crate::execute::execute(
            &tree.actions,
            &tree.target_dir,
            tree.compare_dir.as_deref(),
            connection.as_mut(),
            &mut stats,
        )?;
    }

    metadata.successful = backup_budget_ok(stats.backup_errors, config.max_backup_errors);
    write_metadata(&target_root, &metadata)?;

    if metadata.successful {
        tracing::info!("job finished successfully");
    } else {
        tracing::error!(
            "too many errors occurred during the backup ({} errors, {} permitted); the job is considered failed",
            stats.backup_errors,
            config.max_backup_errors
        );
    }
    tracing::info!("{}", stats.full_protocol());

    Ok(stats)
}

fn resolve_connection(descriptor: &SourceDescriptor) -> Result<Box<dyn crate::source::Connection>> {
    source::from_dir(&descriptor.dir)?.connect()
}

/// Step 2: checks every configured source and the target root, honoring
/// `source_unavailable_action`. Returns, for each configured source in
/// order, `Some(source)` if it should be scanned or `None` if it was
/// dropped (only possible under `Policy::Proceed`).
fn check_source_and_target_availability(config: &Config) -> Result<Vec<Option<Box<dyn DataSource>>>> {
    let mut resolved = Vec::new();
    for s in &config.sources {
        resolved.push(source::from_dir(&s.dir)?);
    }

    loop {
        let unavailable: Vec<usize> = resolved
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.available())
            .map(|(i, _)| i)
            .collect();
        let target_available = check_target_available(&config.backup_root_dir);

        if unavailable.is_empty() && target_available {
            break;
        }

        match config.source_unavailable_action {
            Policy::Proceed => {
                for &i in &unavailable {
                    tracing::error!("source '{}' is unavailable and will be skipped", config.sources[i].name);
                }
                if target_available {
                    break;
                }
                tracing::error!(
                    "the backup target root directory '{}' is not available",
                    config.backup_root_dir.display()
                );
                prompt_user("Please connect the backup target and press Enter");
            }
            Policy::Abort => {
                let mut message = String::new();
                if !unavailable.is_empty() {
                    let names: Vec<_> = unavailable.iter().map(|&i| config.sources[i].name.as_str()).collect();
                    message.push_str(&format!("the following sources are unavailable: {}\n", names.join(", ")));
                }
                if !target_available {
                    message.push_str(&format!("the target '{}' is unavailable", config.backup_root_dir.display()));
                }
                tracing::error!("{message}the backup will be aborted");
                return Err(BackupError::Aborted(message));
            }
            Policy::Prompt => {
                for &i in &unavailable {
                    tracing::error!("source '{}' is unavailable", config.sources[i].name);
                }
                if !target_available {
                    tracing::error!(
                        "the backup target root directory '{}' is not available",
                        config.backup_root_dir.display()
                    );
                }
                prompt_user("Please connect the missing source(s) and/or target and press Enter");
            }
        }
    }

    let unavailable_names: std::collections::HashSet<usize> = resolved
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.available())
        .map(|(i, _)| i)
        .collect();

    Ok(resolved
        .into_iter()
        .enumerate()
        .map(|(i, s)| if unavailable_names.contains(&i) { None } else { Some(s) })
        .collect())
}

fn check_target_available(backup_root_dir: &Path) -> bool {
    std::fs::create_dir_all(backup_root_dir).is_ok()
}

fn prompt_user(message: &str) {
    print!("{message}: ");
    let _ = std::io::stdout().flush();
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input);
}

/// Step 3: allocates a fresh target directory. Versioned mode uses
/// `backup_root_dir/<strftime(version_name)>`, applying a numeric `_N`
/// suffix on collision; non-versioned mode uses `backup_root_dir` directly.
fn allocate_target_root(backup_root_dir: &Path, version_name: &str, versioned: bool) -> Result<PathBuf> {
    if !versioned {
        std::fs::create_dir_all(backup_root_dir)?;
        return Ok(backup_root_dir.to_path_buf());
    }

    let base_name = chrono::Local::now().format(version_name).to_string();
    let mut suffix = 1u32;
    loop {
        let dirname = if suffix == 1 {
            base_name.clone()
        } else {
            format!("{base_name}_{suffix}")
        };
        let candidate = backup_root_dir.join(&dirname);
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                suffix += 1;
                tracing::error!("target backup directory '{}' already exists; trying suffix '_{suffix}'", candidate.display());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Step 5: if `versioned ∧ compare_with_last_backup`, scans `backup_root_dir`
/// for the most recent successful prior backup, skipping `target_root`.
/// Returns `None` (with a warning, not an error) if there is none.
fn find_compare_root(config: &Config, target_root: &Path) -> Result<Option<PathBuf>> {
    if !(config.versioned && config.compare_with_last_backup) {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    let entries = std::fs::read_dir(&config.backup_root_dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() || path == target_root {
            continue;
        }
        let metadata_path = path.join(METADATA_FILENAME);
        match std::fs::read_to_string(&metadata_path) {
            Ok(content) => match serde_json::from_str::<BackupMetadata>(&content) {
                Ok(metadata) => candidates.push((path, metadata)),
                Err(e) => tracing::error!("could not parse metadata file of old backup '{}': {e}", path.display()),
            },
            Err(_) => tracing::error!(
                "directory '{}' in the backup directory does not appear to be a backup, as it has no '{METADATA_FILENAME}' file",
                path.display()
            ),
        }
    }

    candidates.sort_by_key(|b| std::cmp::Reverse(b.1.started));
    for (path, metadata) in &candidates {
        if metadata.successful {
            tracing::info!("chose old backup to compare to: {}", path.display());
            return Ok(Some(path.clone()));
        }
        tracing::error!(
            "the most recent backup '{}' failed or did not run, so it will be skipped",
            metadata.name
        );
    }

    tracing::warn!("no old backup found; creating first backup");
    Ok(None)
}

/// Step 9: `-1` (or any negative value) disables the scan-phase budget.
fn enforce_scan_budget(scanning_errors: u64, max_scanning_errors: i64) -> Result<()> {
    if max_scanning_errors >= 0 && scanning_errors as i64 > max_scanning_errors {
        return Err(BackupError::ScanBudgetExceeded {
            errors: scanning_errors,
            max: max_scanning_errors as u64,
        });
    }
    Ok(())
}

/// Step 12: `-1` (or any negative value) disables the backup-phase budget.
fn backup_budget_ok(backup_errors: u64, max_backup_errors: i64) -> bool {
    max_backup_errors < 0 || backup_errors as i64 <= max_backup_errors
}

/// Step 10: consults `target_drive_full_action` if the target has less free
/// space than the plan is expected to use.
fn check_free_space(target_root: &Path, bytes_to_copy: u64, policy: Policy) -> Result<()> {
    let free_space = fs2::available_space(target_root)?;
    if free_space >= bytes_to_copy {
        return Ok(());
    }

    let message = format!(
        "the target drive has {} free space; the backup is expected to need another {}",
        crate::stats::format_bytes(free_space),
        crate::stats::format_bytes(bytes_to_copy)
    );
    match policy {
        Policy::Prompt => {
            loop {
                print!("{message}. Proceed anyway? (y/n): ");
                let _ = std::io::stdout().flush();
                let mut input = String::new();
                let _ = std::io::stdin().read_line(&mut input);
                match input.trim().to_lowercase().as_str() {
                    "y" => return Ok(()),
                    "n" => {
                        tracing::error!("the backup was interrupted by the user");
                        return Err(BackupError::Aborted("insufficient free space".to_string()));
                    }
                    _ => continue,
                }
            }
        }
        Policy::Abort => {
            tracing::error!("{message}; in accordance with the settings, the backup will be aborted");
            Err(BackupError::TargetUnavailable(target_root.to_path_buf(), message))
        }
        Policy::Proceed => {
            tracing::error!("{message}; in accordance with the settings, the backup will try to proceed anyway");
            Ok(())
        }
    }
}

fn write_metadata(target_root: &Path, metadata: &BackupMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| BackupError::Other(format!("failed to serialize metadata: {e}")))?;
    std::fs::write(target_root.join(METADATA_FILENAME), json)?;
    Ok(())
}

fn write_action_file(target_root: &Path, trees: &[Tree]) -> Result<()> {
    let records: Vec<ActionTreeRecord> = trees
        .iter()
        .map(|tree| ActionTreeRecord {
            name: tree.name.clone(),
            source: tree.source_descriptor.dir.clone(),
            target_dir: tree.target_dir.clone(),
            compare_dir: tree.compare_dir.clone(),
            actions: tree.actions.iter().map(ActionRecord::from).collect(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| BackupError::Other(format!("failed to serialize action file: {e}")))?;
    std::fs::write(target_root.join(ACTIONS_FILENAME), json)?;
    Ok(())
}

fn accumulate_source_stats(entries: &[FileMetadata], stats: &mut Statistics) {
    for entry in entries {
        if entry.is_directory {
            stats.folders_in_source += 1;
        } else {
            stats.files_in_source += 1;
            stats.bytes_in_source += entry.file_size;
        }
    }
}

fn accumulate_compare_stats(entries: &[FileMetadata], stats: &mut Statistics) {
    for entry in entries {
        if entry.is_directory {
            stats.folders_in_compare += 1;
        } else {
            stats.files_in_compare += 1;
            stats.bytes_in_compare += entry.file_size;
        }
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupMode, CompareMethod, ConfigFileSource};
    use tempfile::tempdir;

    fn base_config(backup_root_dir: PathBuf) -> Config {
        Config {
            sources: vec![ConfigFileSource {
                name: "docs".into(),
                dir: "/does/not/matter".into(),
                exclude_paths: vec![],
            }],
            backup_root_dir,
            mode: BackupMode::Hardlink,
            versioned: true,
            version_name: "%Y_%m_%d".into(),
            compare_with_last_backup: true,
            copy_empty_dirs: true,
            compare_method: vec![CompareMethod::Size],
            max_scanning_errors: 50,
            max_backup_errors: 50,
            target_drive_full_action: Policy::Prompt,
            source_unavailable_action: Policy::Abort,
            save_actionfile: true,
            save_actionhtml: false,
            apply_actions: true,
            open_actionfile: false,
            open_actionhtml: false,
            log_level: crate::config::LogLevel::Info,
        }
    }

    #[test]
    fn allocate_target_root_appends_numeric_suffix_on_collision() {
        let root = tempdir().unwrap();
        std::fs::create_dir(root.path().join("2024")).unwrap();

        let allocated = allocate_target_root(root.path(), "2024", true).unwrap();
        assert_eq!(allocated, root.path().join("2024_2"));
    }

    #[test]
    fn allocate_target_root_uses_backup_root_dir_directly_when_not_versioned() {
        let root = tempdir().unwrap();
        let backup_root_dir = root.path().join("backups");

        let allocated = allocate_target_root(&backup_root_dir, "2024", false).unwrap();
        assert_eq!(allocated, backup_root_dir);

        // A second, non-versioned run reuses the same directory rather than
        // failing on an "already exists" collision.
        let allocated_again = allocate_target_root(&backup_root_dir, "2024", false).unwrap();
        assert_eq!(allocated_again, backup_root_dir);
    }

    #[test]
    fn find_compare_root_picks_most_recent_successful_backup() {
        let root = tempdir().unwrap();
        let config = base_config(root.path().to_path_buf());

        let older = root.path().join("older");
        std::fs::create_dir(&older).unwrap();
        write_metadata(
            &older,
            &BackupMetadata {
                name: "older".into(),
                successful: true,
                started: 100,
                sources: vec![],
                compare_backup: None,
                backup_directory: older.clone(),
            },
        )
        .unwrap();

        let newer_failed = root.path().join("newer_failed");
        std::fs::create_dir(&newer_failed).unwrap();
        write_metadata(
            &newer_failed,
            &BackupMetadata {
                name: "newer_failed".into(),
                successful: false,
                started: 200,
                sources: vec![],
                compare_backup: None,
                backup_directory: newer_failed.clone(),
            },
        )
        .unwrap();

        let target = root.path().join("target");
        std::fs::create_dir(&target).unwrap();

        let found = find_compare_root(&config, &target).unwrap();
        assert_eq!(found, Some(older));
    }

    #[test]
    fn find_compare_root_returns_none_without_prior_backups() {
        let root = tempdir().unwrap();
        let config = base_config(root.path().to_path_buf());
        let target = root.path().join("target");
        std::fs::create_dir(&target).unwrap();

        assert_eq!(find_compare_root(&config, &target).unwrap(), None);
    }

    #[test]
    fn find_compare_root_is_none_when_not_versioned() {
        let root = tempdir().unwrap();
        let mut config = base_config(root.path().to_path_buf());
        config.versioned = false;
        let target = root.path().join("target");
        std::fs::create_dir(&target).unwrap();

        assert_eq!(find_compare_root(&config, &target).unwrap(), None);
    }

    #[test]
    fn check_free_space_proceeds_when_enough_space_is_available() {
        let root = tempdir().unwrap();
        check_free_space(root.path(), 1, Policy::Abort).unwrap();
    }

    #[test]
    fn check_free_space_aborts_when_policy_is_abort_and_space_is_insufficient() {
        let root = tempdir().unwrap();
        let huge = u64::MAX;
        let result = check_free_space(root.path(), huge, Policy::Abort);
        assert!(result.is_err());
    }

    #[test]
    fn check_free_space_proceeds_anyway_when_policy_is_proceed() {
        let root = tempdir().unwrap();
        let huge = u64::MAX;
        check_free_space(root.path(), huge, Policy::Proceed).unwrap();
    }

    #[test]
    fn enforce_scan_budget_fails_when_errors_exceed_a_non_negative_max() {
        assert!(enforce_scan_budget(5, 4).is_err());
        assert!(enforce_scan_budget(4, 4).is_ok());
    }

    #[test]
    fn enforce_scan_budget_allows_unlimited_errors_when_max_is_negative() {
        assert!(enforce_scan_budget(1_000, -1).is_ok());
    }

    #[test]
    fn backup_budget_ok_matches_enforce_scan_budget_semantics() {
        assert!(backup_budget_ok(4, 4));
        assert!(!backup_budget_ok(5, 4));
        assert!(backup_budget_ok(1_000, -1));
    }
}
