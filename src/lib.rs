/*!
 * frontguard - an incremental, versioned file backup engine
 *
 * Scans one or more sources (local directories or FTP servers), compares
 * against the most recent previous backup, and plans and executes a set of
 * copy/hardlink/delete actions into a new dated target directory.
 */

pub mod config;
pub mod error;
pub mod execute;
pub mod job;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod plan;
pub mod scan;
pub mod source;
pub mod stats;

pub use config::Config;
pub use error::{BackupError, Result};
pub use stats::Statistics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
