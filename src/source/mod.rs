/*!
 * The data source abstraction: a source tree is either a mounted filesystem
 * path or an FTP URL, and every operation on it is performed through a
 * [`Connection`] checked out from a [`DataSource`].
 */

mod ftp;
mod mounted;

pub use ftp::FtpSource;
pub use mounted::MountedSource;

use std::path::Path;
use std::time::Duration;

use crate::config::CompareMethod;
use crate::error::Result;
use crate::model::FileMetadata;
use crate::stats::Statistics;

/// `MODDATE` comparisons round differently depending on the filesystem and
/// the platform's clock resolution; anything closer than this counts as equal.
pub(crate) const MOD_TIME_TOLERANCE: Duration = Duration::from_micros(1);

/// A configured, not-yet-connected source tree.
///
/// Mirrors the split between `DataSource` (cheap, describes where the data
/// lives) and the connection it hands out (owns the actual socket or, for a
/// mounted path, nothing beyond the root `PathBuf`) in the original design.
pub trait DataSource {
    /// Best-effort reachability check performed at job start, before any
    /// scan begins (§4.5 step 2).
    fn available(&self) -> bool;

    /// A short label used in log messages and error text.
    fn describe(&self) -> String;

    /// Opens a connection. For a mounted source this never fails; for FTP it
    /// establishes the control connection.
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// A live handle to a source tree, scoped like the original's context-manager
/// connection: callers check one out via [`DataSource::connect`], use it, and
/// drop it when done. Implementations that hold a live socket close it in
/// their `Drop` impl rather than requiring an explicit close call.
pub trait Connection {
    /// Walks the whole tree rooted at the source, in the order defined by
    /// [`crate::ordering::compare_paths`], skipping any relative path that
    /// matches one of `exclude_paths` (and, for directories, its subtree).
    /// Per-entry stat failures are counted into `stats.scanning_errors`
    /// rather than aborting the walk.
    fn scan(&mut self, exclude_paths: &[String], stats: &mut Statistics) -> Result<Vec<FileMetadata>>;

    /// Copies the file described by `source_meta` to `to_path`, returning
    /// the number of bytes transferred. `to_path` is always a path on the
    /// local filesystem (the backup target), never another source.
    /// Implementations apply `source_meta.mod_time` to the copy themselves,
    /// since `std::fs::copy` does not preserve it; mounted sources also
    /// verify the file has not changed since the scan and log a warning if
    /// it has.
    fn copy_file(&mut self, source_meta: &FileMetadata, to_path: &Path) -> Result<u64>;

    /// True if `rel_path` and the local file at `compare_path` are equal
    /// under `method`. [`CompareMethod::Bytes`] requires reading both files
    /// in full and returns [`crate::error::BackupError::NotSupported`] for
    /// sources that cannot stream file contents for comparison.
    fn files_equal(
        &mut self,
        source_meta: &FileMetadata,
        compare_path: &Path,
        methods: &[CompareMethod],
    ) -> Result<bool>;
}

/// Resolves a configured `dir` string (from [`crate::config::ConfigFileSource`])
/// into a concrete source. `ftp://`-prefixed directories become an
/// [`FtpSource`]; anything else is treated as a local path and becomes a
/// [`MountedSource`], mirroring the original's `DataSource.parseConfigFileSource`.
pub fn from_dir(dir: &str) -> Result<Box<dyn DataSource>> {
    if let Some(ftp) = FtpSource::parse(dir)? {
        Ok(Box::new(ftp))
    } else {
        Ok(Box::new(MountedSource::new(dir)))
    }
}

/// Shared comparison logic behind every [`Connection::files_equal`]: stat the
/// compare file once, then apply each method in order, short-circuiting on
/// the first mismatch. Only [`CompareMethod::Bytes`] needs a source-specific
/// byte stream, provided by `bytewise_cmp`. Any I/O failure is logged and
/// treated as "not equal" rather than propagated, since the caller must still
/// decide what to do with the rest of the tree.
pub(crate) fn files_equal_via_stat(
    source_meta: &FileMetadata,
    compare_path: &Path,
    methods: &[CompareMethod],
    mut bytewise_cmp: impl FnMut() -> Result<bool>,
) -> Result<bool> {
    let result = (|| -> Result<bool> {
        let compare_stat = compare_path.metadata()?;
        let compare_mod_time = compare_stat.modified()?;
        for method in methods {
            match method {
                CompareMethod::Moddate => {
                    let delta = source_meta
                        .mod_time
                        .duration_since(compare_mod_time)
                        .unwrap_or_else(|e| e.duration());
                    if delta >= MOD_TIME_TOLERANCE {
                        return Ok(false);
                    }
                }
                CompareMethod::Size => {
                    if source_meta.file_size != compare_stat.len() {
                        return Ok(false);
                    }
                }
                CompareMethod::Bytes => {
                    if !bytewise_cmp()? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    })();

    match result {
        Ok(eq) => Ok(eq),
        Err(e) => {
            tracing::error!(
                "either stat-ing or comparing '{}' and '{}' failed: {e}",
                source_meta.rel_path.display(),
                compare_path.display()
            );
            Ok(false)
        }
    }
}
