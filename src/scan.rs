/*!
 * The scan/merge phase: builds a [`MergedEntry`] list from a source tree and
 * its compare counterpart in a single linear pass (§4.2).
 */

use std::path::Path;

use crate::model::{FileMetadata, MergedEntry};
use crate::ordering::compare_paths;
use crate::stats::Statistics;

/// Scans `compare_dir` itself (never a source connection: the compare tree is
/// always local, the previous backup's target directory) in the same order
/// the scanner/merger contract requires.
pub fn scan_compare_dir(compare_dir: &Path, stats: &mut Statistics) -> crate::error::Result<Vec<FileMetadata>> {
    let source = crate::source::MountedSource::new(compare_dir);
    let mut conn = crate::source::DataSource::connect(&source)?;
    conn.scan(&[], stats)
}

/// Merges a fully materialized, ordered source scan with a lazily-walked
/// compare scan, producing the single ordered [`MergedEntry`] sequence the
/// planner consumes.
///
/// `source` must already be in scan order (ascending under
/// [`compare_paths`]); `compare` may be supplied in any iteration that is
/// itself ascending under the same order (true of any scan produced by this
/// crate's sources, mounted or FTP).
pub fn merge(source: Vec<FileMetadata>, compare: Vec<FileMetadata>) -> Vec<MergedEntry> {
    let mut merged: Vec<MergedEntry> = source
        .into_iter()
        .map(|metadata| MergedEntry {
            metadata,
            in_source: true,
            in_compare: false,
        })
        .collect();

    let mut cursor = 0usize;
    for compare_entry in compare {
        loop {
            if cursor >= merged.len() {
                merged.push(MergedEntry {
                    metadata: compare_entry,
                    in_source: false,
                    in_compare: true,
                });
                break;
            }
            match compare_paths(&compare_entry.rel_path, &merged[cursor].metadata.rel_path) {
                std::cmp::Ordering::Greater => cursor += 1,
                std::cmp::Ordering::Equal => {
                    merged[cursor].in_compare = true;
                    cursor += 1;
                    break;
                }
                std::cmp::Ordering::Less => {
                    merged.insert(
                        cursor,
                        MergedEntry {
                            metadata: compare_entry,
                            in_source: false,
                            in_compare: true,
                        },
                    );
                    cursor += 1;
                    break;
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn meta(rel_path: &str, is_directory: bool) -> FileMetadata {
        FileMetadata {
            rel_path: PathBuf::from(rel_path),
            is_directory,
            mod_time: SystemTime::UNIX_EPOCH,
            file_size: 0,
            is_empty_dir: false,
        }
    }

    #[test]
    fn source_only_entry_is_not_marked_in_compare() {
        let source = vec![meta("a.txt", false)];
        let merged = merge(source, vec![]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].in_source);
        assert!(!merged[0].in_compare);
    }

    #[test]
    fn matching_entry_merges_into_a_single_row() {
        let source = vec![meta("a.txt", false), meta("b.txt", false)];
        let compare = vec![meta("a.txt", false)];
        let merged = merge(source, compare);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].in_source && merged[0].in_compare);
        assert!(merged[1].in_source && !merged[1].in_compare);
    }

    #[test]
    fn compare_only_entry_is_inserted_in_order() {
        let source = vec![meta("a.txt", false), meta("c.txt", false)];
        let compare = vec![meta("b.txt", false)];
        let merged = merge(source, compare);
        let names: Vec<_> = merged.iter().map(|e| e.metadata.rel_path.to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(!merged[1].in_source && merged[1].in_compare);
    }

    #[test]
    fn directory_and_its_subtree_stay_adjacent_after_merge() {
        let source = vec![meta("dir", true), meta("dir/file.txt", false), meta("dir.txt", false)];
        let compare = vec![meta("dir", true), meta("dir/other.txt", false)];
        let merged = merge(source, compare);
        let names: Vec<_> = merged.iter().map(|e| e.metadata.rel_path.to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["dir", "dir/file.txt", "dir/other.txt", "dir.txt"]);
    }

    #[test]
    fn merge_restricted_to_in_source_equals_the_original_scan_order() {
        let source = vec![meta("a", false), meta("b", false), meta("c", false)];
        let compare = vec![meta("aa", false), meta("bb", false)];
        let merged = merge(source.clone(), compare);
        let recovered: Vec<_> = merged
            .iter()
            .filter(|e| e.in_source)
            .map(|e| e.metadata.rel_path.clone())
            .collect();
        let expected: Vec<_> = source.iter().map(|m| m.rel_path.clone()).collect();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn merge_restricted_to_in_compare_equals_the_compare_scan_order() {
        let source = vec![meta("b", false)];
        let compare = vec![meta("a", false), meta("b", false), meta("c", false)];
        let merged = merge(source, compare.clone());
        let recovered: Vec<_> = merged
            .iter()
            .filter(|e| e.in_compare)
            .map(|e| e.metadata.rel_path.clone())
            .collect();
        let expected: Vec<_> = compare.iter().map(|m| m.rel_path.clone()).collect();
        assert_eq!(recovered, expected);
    }
}
