/*!
 * The default data source: a plain directory on the local filesystem.
 */

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::Pattern;
use walkdir::WalkDir;

use crate::config::CompareMethod;
use crate::error::Result;
use crate::model::FileMetadata;
use crate::ordering::compare_paths;
use crate::stats::Statistics;

use super::{files_equal_via_stat, Connection, DataSource, MOD_TIME_TOLERANCE};

const COPY_BUFFER_SIZE: usize = 8192;

/// A source backed directly by a directory on the machine running the backup.
/// This is the default: any `dir` that does not start with `ftp://` is parsed
/// as one of these.
#[derive(Debug, Clone)]
pub struct MountedSource {
    root_dir: PathBuf,
}

impl MountedSource {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }
}

impl DataSource for MountedSource {
    fn available(&self) -> bool {
        self.root_dir.is_dir()
    }

    fn describe(&self) -> String {
        self.root_dir.display().to_string()
    }

    fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MountedConnection {
            root_dir: self.root_dir.clone(),
        }))
    }
}

struct MountedConnection {
    root_dir: PathBuf,
}

impl MountedConnection {
    fn full_path(&self, rel_path: &Path) -> PathBuf {
        self.root_dir.join(rel_path)
    }
}

impl Connection for MountedConnection {
    fn scan(&mut self, exclude_paths: &[String], stats: &mut Statistics) -> Result<Vec<FileMetadata>> {
        if !self.root_dir.is_dir() {
            tracing::error!(
                "the source path '{}' does not exist and will be skipped",
                self.root_dir.display()
            );
            return Ok(Vec::new());
        }

        let patterns: Vec<Pattern> = exclude_paths
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::error!("invalid exclude pattern '{p}': {e}");
                    None
                }
            })
            .collect();

        let root = self.root_dir.clone();
        let mut out = Vec::new();
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by(|a, b| compare_paths(a.file_name().as_ref(), b.file_name().as_ref()))
            .into_iter()
            .filter_entry(|entry| {
                let rel_path = match entry.path().strip_prefix(&root) {
                    Ok(p) => p,
                    Err(_) => return true,
                };
                !is_excluded(rel_path, &patterns)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!("error while scanning '{}': {e}", root.display());
                    stats.scanning_errors += 1;
                    continue;
                }
            };
            let path = entry.path();
            let rel_path = path.strip_prefix(&root).unwrap_or(path).to_path_buf();

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    log_stat_failure(path, &std::io::Error::other(e.to_string()));
                    stats.scanning_errors += 1;
                    continue;
                }
            };
            let mod_time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            if metadata.is_file() {
                out.push(FileMetadata {
                    rel_path,
                    is_directory: false,
                    mod_time,
                    file_size: metadata.len(),
                    is_empty_dir: false,
                });
            } else if metadata.is_dir() {
                out.push(FileMetadata {
                    is_empty_dir: dir_empty(path),
                    rel_path,
                    is_directory: true,
                    mod_time,
                    file_size: 0,
                });
            } else {
                tracing::error!("encountered an object which is neither directory nor file: {}", path.display());
            }
        }
        Ok(out)
    }

    fn copy_file(&mut self, source_meta: &FileMetadata, to_path: &Path) -> Result<u64> {
        let source_path = self.full_path(&source_meta.rel_path);

        if let Ok(metadata) = source_path.metadata() {
            if let Ok(modified) = metadata.modified() {
                let delta = modified
                    .duration_since(source_meta.mod_time)
                    .unwrap_or_else(|e| e.duration());
                if delta >= MOD_TIME_TOLERANCE {
                    tracing::warn!(
                        "file '{}' was modified after it was scanned",
                        source_path.display()
                    );
                }
            }
        }

        tracing::debug!("copy from '{}' to '{}'", source_path.display(), to_path.display());
        let bytes = fs::copy(&source_path, to_path)?;
        // std::fs::copy does not preserve mtime (unlike Python's shutil.copy2),
        // and the copy must carry the scanned mtime forward so a later run's
        // comparison against this file sees the source's timestamp, not the
        // moment it was copied.
        filetime::set_file_mtime(to_path, filetime::FileTime::from_system_time(source_meta.mod_time))?;
        Ok(bytes)
    }

    fn files_equal(
        &mut self,
        source_meta: &FileMetadata,
        compare_path: &Path,
        methods: &[CompareMethod],
    ) -> Result<bool> {
        let source_path = self.full_path(&source_meta.rel_path);
        files_equal_via_stat(source_meta, compare_path, methods, || {
            bytewise_cmp(&source_path, compare_path)
        })
    }
}

fn bytewise_cmp(a: &Path, b: &Path) -> Result<bool> {
    let mut file_a = fs::File::open(a)?;
    let mut file_b = fs::File::open(b)?;
    let mut buf_a = [0u8; COPY_BUFFER_SIZE];
    let mut buf_b = [0u8; COPY_BUFFER_SIZE];
    loop {
        let read_a = file_a.read(&mut buf_a)?;
        let read_b = file_b.read(&mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// True if `path` is a readable, empty directory. Unreadable directories are
/// conservatively treated as empty, matching the original's `dirEmpty`.
pub fn dir_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => {
            tracing::error!("scanning directory '{}' failed: {e}", path.display());
            true
        }
    }
}

fn is_excluded(rel_path: &Path, patterns: &[Pattern]) -> bool {
    let as_str = rel_path.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|p| p.matches(&as_str))
}

fn log_stat_failure(path: &Path, error: &std::io::Error) {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => tracing::error!("access denied to '{}'", path.display()),
        std::io::ErrorKind::NotFound => tracing::error!("file or folder '{}' cannot be found", path.display()),
        _ => tracing::error!("unexpected error handling '{}': {error}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, content: &[u8]) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_orders_directories_before_their_contents() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        touch(&dir.path().join("a").join("file.txt"), b"hi");
        touch(&dir.path().join("a.txt"), b"hi");

        let source = MountedSource::new(dir.path());
        let mut conn = source.connect().unwrap();
        let mut stats = Statistics::new();
        let entries = conn.scan(&[], &mut stats).unwrap();

        let names: Vec<_> = entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "a/file.txt", "a.txt"]);
    }

    #[test]
    fn scan_skips_excluded_entries_and_their_subtree() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("cache")).unwrap();
        touch(&dir.path().join("cache").join("data.bin"), b"x");
        touch(&dir.path().join("keep.txt"), b"y");

        let source = MountedSource::new(dir.path());
        let mut conn = source.connect().unwrap();
        let mut stats = Statistics::new();
        let entries = conn.scan(&["cache".to_string()], &mut stats).unwrap();

        let names: Vec<_> = entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["keep.txt"]);
    }

    #[test]
    fn files_equal_by_size_detects_mismatch() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"hello");
        touch(&dir.path().join("b.txt"), b"hello world");

        let source = MountedSource::new(dir.path());
        let mut conn = source.connect().unwrap();
        let meta = FileMetadata {
            rel_path: PathBuf::from("a.txt"),
            is_directory: false,
            mod_time: SystemTime::now(),
            file_size: 5,
            is_empty_dir: false,
        };
        let eq = conn
            .files_equal(&meta, &dir.path().join("b.txt"), &[CompareMethod::Size])
            .unwrap();
        assert!(!eq);
    }

    #[test]
    fn bytewise_cmp_detects_equal_and_different_content() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"same");
        touch(&dir.path().join("b.txt"), b"same");
        touch(&dir.path().join("c.txt"), b"diff");

        assert!(bytewise_cmp(&dir.path().join("a.txt"), &dir.path().join("b.txt")).unwrap());
        assert!(!bytewise_cmp(&dir.path().join("a.txt"), &dir.path().join("c.txt")).unwrap());
    }

    #[test]
    fn dir_empty_reports_correctly() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        std::fs::create_dir(dir.path().join("full")).unwrap();
        touch(&dir.path().join("full").join("f.txt"), b"x");

        assert!(dir_empty(&dir.path().join("empty")));
        assert!(!dir_empty(&dir.path().join("full")));
    }
}
