/*!
 * Configuration structures and defaults for the backup engine
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BackupError, Result};

/// What a run does with files that exist in the compare backup but not in
/// the source, and how versions are laid out under `backup_root_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Every run is a full-looking tree, unchanged files hardlinked to the
    /// previous backup instead of copied.
    #[default]
    Hardlink,
    /// The target mirrors the source exactly; files absent from the source
    /// are deleted from the target.
    Mirror,
    /// Files are only ever added, never deleted or overwritten.
    Save,
}

/// A method the planner may use, in order, to decide whether a source file
/// and its compare counterpart are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMethod {
    Moddate,
    Size,
    Bytes,
}

/// The policy applied when the target drive is full, or when a source is
/// unavailable at job start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    #[default]
    Prompt,
    Abort,
    Proceed,
}

/// Verbosity of the `tracing` subscriber, mirrored from `logging._nameToLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical | LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

/// One configured source: a name (used as the per-source subdirectory under
/// the target), a `dir` (a mounted path or an `ftp://` URL), and a list of
/// glob exclude patterns relative to the source root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFileSource {
    pub name: String,
    pub dir: String,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

/// Configuration file structure (loaded from TOML).
///
/// Defaults and the two forcing rules below follow the original config
/// model: `mode=hardlink` forces `versioned=true`, and `versioned=true`
/// forces `compare_with_last_backup=true`; `open_actionfile`/`open_actionhtml`
/// are forced false when their corresponding `save_*` flag is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sources: Vec<ConfigFileSource>,
    pub backup_root_dir: PathBuf,

    #[serde(default)]
    pub mode: BackupMode,
    #[serde(default = "default_true")]
    pub versioned: bool,
    #[serde(default = "default_version_name")]
    pub version_name: String,
    #[serde(default = "default_true")]
    pub compare_with_last_backup: bool,
    #[serde(default = "default_true")]
    pub copy_empty_dirs: bool,
    #[serde(default = "default_compare_method")]
    pub compare_method: Vec<CompareMethod>,

    #[serde(default = "default_error_budget")]
    pub max_scanning_errors: i64,
    #[serde(default = "default_error_budget")]
    pub max_backup_errors: i64,

    #[serde(default)]
    pub target_drive_full_action: Policy,
    #[serde(default)]
    pub source_unavailable_action: Policy,

    #[serde(default = "default_true")]
    pub save_actionfile: bool,
    #[serde(default = "default_true")]
    pub save_actionhtml: bool,
    #[serde(default = "default_true")]
    pub apply_actions: bool,
    #[serde(default)]
    pub open_actionfile: bool,
    #[serde(default)]
    pub open_actionhtml: bool,

    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_true() -> bool {
    true
}

fn default_version_name() -> String {
    "%Y_%m_%d".to_string()
}

fn default_compare_method() -> Vec<CompareMethod> {
    vec![CompareMethod::Moddate, CompareMethod::Size]
}

fn default_error_budget() -> i64 {
    50
}

impl Config {
    /// Load configuration from a TOML file and normalize the forcing rules.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BackupError::Config(format!("failed to read config file: {e}")))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("failed to parse config file: {e}")))?;
        config.normalize();
        Ok(config)
    }

    /// Applies the cross-field defaulting rules that the original config
    /// model enforces via validators: `mode=hardlink` implies `versioned`,
    /// `versioned` implies `compare_with_last_backup`, and the two `open_*`
    /// flags cannot be true while their `save_*` counterpart is false.
    fn normalize(&mut self) {
        if self.mode == BackupMode::Hardlink && !self.versioned {
            tracing::error!("mode=hardlink forces versioned=true; overriding");
            self.versioned = true;
        }
        if self.versioned && !self.compare_with_last_backup {
            tracing::error!("versioned=true forces compare_with_last_backup=true; overriding");
            self.compare_with_last_backup = true;
        }
        if !self.save_actionfile && self.open_actionfile {
            tracing::error!("save_actionfile=false forces open_actionfile=false; overriding");
            self.open_actionfile = false;
        }
        if !self.save_actionhtml && self.open_actionhtml {
            tracing::error!("save_actionhtml=false forces open_actionhtml=false; overriding");
            self.open_actionhtml = false;
        }
    }
}
