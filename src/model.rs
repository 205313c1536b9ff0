/*!
 * The data model shared by the scanner, merger, planner and executor
 */

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One entry discovered while walking a source or compare tree.
///
/// Invariant upheld by the scanner (§4.2): a parent directory's entry is
/// emitted strictly before any of its descendants, and siblings are emitted
/// in a stable, locale-aware order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Path relative to the scan root, using forward-slash segments internally.
    pub rel_path: PathBuf,
    pub is_directory: bool,
    /// Timezone-aware instant; mounted sources report local time, FTP sources UTC.
    pub mod_time: SystemTime,
    /// Zero for directories.
    pub file_size: u64,
    pub is_empty_dir: bool,
}

/// One row of the scanner/merger output: a [`FileMetadata`] plus presence
/// flags. At least one of `in_source`/`in_compare` is always true; when both
/// are true they describe the same `rel_path` and `is_directory`.
#[derive(Debug, Clone)]
pub struct MergedEntry {
    pub metadata: FileMetadata,
    pub in_source: bool,
    pub in_compare: bool,
}

/// The kind of filesystem operation a planned [`Action`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Copy,
    Hardlink,
    Delete,
}

/// Display-only classification of why an action was emitted, carried through
/// to the action report. Purely informational; never read back by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HtmlFlag {
    New,
    InNewDir,
    Modified,
    ExistingDir,
    NewDir,
    EmptyDir,
}

/// One planned filesystem operation, relative to the per-source subdirectory
/// of the backup root.
///
/// Invariants (§3): `Hardlink` implies `is_dir=false` and requires a compare
/// backup; `Delete` only appears in `mirror` mode without
/// compare-with-last-backup; a directory `Copy` never carries file bytes.
#[derive(Debug, Clone)]
pub struct Action {
    pub action_type: ActionType,
    pub is_dir: bool,
    pub rel_path: PathBuf,
    /// The authoritative modification time to apply after execution.
    pub mod_time: SystemTime,
    pub html_flag: Option<HtmlFlag>,
    /// Source file size; 0 for directories. Used for statistics accounting.
    pub file_size: u64,
}

/// Serializable form of an [`Action`] as written to `actions.json`.
/// `mod_time` is an ISO-8601 instant, per §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub is_dir: bool,
    pub rel_path: String,
    pub mod_time: chrono::DateTime<chrono::Utc>,
    pub html_flag: Option<HtmlFlag>,
}

impl From<&Action> for ActionRecord {
    fn from(action: &Action) -> Self {
        Self {
            action_type: action.action_type,
            is_dir: action.is_dir,
            rel_path: action.rel_path.to_string_lossy().replace('\\', "/"),
            mod_time: action.mod_time.into(),
            html_flag: action.html_flag,
        }
    }
}

/// One source descriptor as recorded into [`BackupMetadata`] (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub dir: String,
    pub exclude_paths: Vec<String>,
}

/// A per-tree object in `actions.json`: the source name plus its target and
/// compare directories and the ordered action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTreeRecord {
    pub name: String,
    pub source: String,
    pub target_dir: PathBuf,
    pub compare_dir: Option<PathBuf>,
    pub actions: Vec<ActionRecord>,
}

/// The durable per-run record persisted as `metadata.json` (§3, §4.5).
/// Written twice: once with `successful=false` right after planning begins,
/// once with the final verdict after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub name: String,
    pub successful: bool,
    pub started: u64,
    pub sources: Vec<SourceDescriptor>,
    pub compare_backup: Option<PathBuf>,
    pub backup_directory: PathBuf,
}

/// Per-source planning and execution context: the tree's human name, its
/// resolved target subdirectory, optional compare subdirectory, the merged
/// entry list produced by the scanner/merger, and the emitted action list.
pub struct BackupTree {
    pub name: String,
    pub target_dir: PathBuf,
    pub compare_dir: Option<PathBuf>,
    pub merged: Vec<MergedEntry>,
    pub actions: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_record_normalizes_path_separators() {
        let action = Action {
            action_type: ActionType::Copy,
            is_dir: false,
            rel_path: PathBuf::from("dir/sub/file.txt"),
            mod_time: SystemTime::UNIX_EPOCH,
            html_flag: Some(HtmlFlag::New),
            file_size: 42,
        };
        let record = ActionRecord::from(&action);
        assert_eq!(record.rel_path, "dir/sub/file.txt");
    }

    #[test]
    fn action_record_round_trips_through_json() {
        let action = Action {
            action_type: ActionType::Hardlink,
            is_dir: false,
            rel_path: PathBuf::from("a.txt"),
            mod_time: SystemTime::UNIX_EPOCH,
            html_flag: None,
            file_size: 10,
        };
        let record = ActionRecord::from(&action);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ActionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.rel_path, record.rel_path);
        assert_eq!(parsed.action_type, record.action_type);
    }
}
