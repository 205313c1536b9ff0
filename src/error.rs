/*!
 * Error types for the backup engine
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

/// The error taxonomy of the backup pipeline.
///
/// Most of these are recovered locally (counted into [`crate::stats::Statistics`] and
/// logged) and never surface as a propagated `BackupError`. The variants that *do*
/// propagate out of a job run are [`BackupError::ConnectionLost`],
/// [`BackupError::ScanBudgetExceeded`], [`BackupError::Config`],
/// [`BackupError::Aborted`] and [`BackupError::TargetUnavailable`]. The
/// backup-phase error budget, unlike the scan-phase one, never raises: it
/// only sets the final `successful` metadata flag (§4.5 step 12).
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("source '{0}' is not accessible")]
    SourceNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "too many scanning errors: {errors} occurred, {max} permitted"
    )]
    ScanBudgetExceeded { errors: u64, max: u64 },

    #[error("the connection to source '{0}' was lost")]
    ConnectionLost(String),

    #[error("the backup target '{0}' is unavailable: {1}")]
    TargetUnavailable(PathBuf, String),

    #[error("the operation was aborted: {0}")]
    Aborted(String),

    #[error("bytewise comparison is not supported by this source")]
    NotSupported,

    #[error("{0}")]
    Other(String),
}

impl BackupError {
    /// Whether this error should terminate the run rather than being folded
    /// into a statistics counter at the call site.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackupError::ConnectionLost(_)
                | BackupError::Config(_)
                | BackupError::ScanBudgetExceeded { .. }
                | BackupError::Aborted(_)
                | BackupError::TargetUnavailable(_, _)
        )
    }
}
