/*!
 * Statistics counters for a single backup run
 */

use std::fmt;

/// Monotonic counters accumulated across the scan, plan and execute phases
/// of one run. A single `Statistics` is threaded through the pipeline by
/// `&mut` reference; the engine is single-threaded, so there is no atomics
/// or locking here.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    // scanning phase
    pub scanning_errors: u64,
    pub bytes_in_source: u64,
    pub bytes_in_compare: u64,
    pub files_in_source: u64,
    pub files_in_compare: u64,
    pub folders_in_source: u64,
    pub folders_in_compare: u64,

    // action generation phase
    pub files_to_copy: u64,
    pub bytes_to_copy: u64,
    pub files_to_hardlink: u64,
    pub bytes_to_hardlink: u64,
    pub files_to_delete: u64,
    pub bytes_to_delete: u64,

    // backup phase
    pub backup_errors: u64,
    pub bytes_copied: u64,
    pub files_copied: u64,
    pub bytes_hardlinked: u64,
    pub files_hardlinked: u64,
    pub files_deleted: u64,
    pub bytes_deleted: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of the scan phase: source/compare tree sizes and scan errors.
    pub fn scanning_protocol(&self) -> String {
        format!(
            "\tSource:\t\t\t{} folders, {} files, {}\n\tCompare:\t\t{} folders, {} files, {}\n\tScanning errors:\t{}",
            self.folders_in_source,
            self.files_in_source,
            format_bytes(self.bytes_in_source),
            self.folders_in_compare,
            self.files_in_compare,
            format_bytes(self.bytes_in_compare),
            self.scanning_errors
        )
    }

    /// Summary of the planning phase: the action counts produced by the planner.
    pub fn action_generation_protocol(&self) -> String {
        format!(
            "\tTo copy:\t\t{} files, {}\n\tTo hardlink:\t\t{} files, {}\n\tTo delete:\t\t{} files, {}",
            self.files_to_copy,
            format_bytes(self.bytes_to_copy),
            self.files_to_hardlink,
            format_bytes(self.bytes_to_hardlink),
            self.files_to_delete,
            format_bytes(self.bytes_to_delete)
        )
    }

    /// Summary of the execution phase: what actually happened on disk.
    pub fn backup_protocol(&self) -> String {
        format!(
            "\tCopied:\t\t\t{} files, {}\n\tHardlinked:\t\t{} files, {}\n\tDeleted:\t\t{} files, {}\n\tBackup Errors:\t\t{}",
            self.files_copied,
            format_bytes(self.bytes_copied),
            self.files_hardlinked,
            format_bytes(self.bytes_hardlinked),
            self.files_deleted,
            format_bytes(self.bytes_deleted),
            self.backup_errors
        )
    }

    pub fn full_protocol(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.scanning_protocol(),
            self.action_generation_protocol(),
            self.backup_protocol()
        )
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_protocol())
    }
}

/// Converts a byte count into a human-readable binary-unit string, e.g.
/// `1.0 MiB`. Mirrors the classic `sizeof_fmt` recipe: integral bytes get
/// zero decimals, everything above gets one, and values within 0.05 of the
/// next unit round up rather than printing `1024.0 KiB`.
pub fn format_bytes(num_bytes: u64) -> String {
    const UNITS: &[&str] = &["Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

    let mut value = num_bytes as f64;
    if value.abs() < 1024.0 {
        return format!("{value:3.0} B");
    }

    for unit in UNITS {
        value /= 1024.0;
        if value.abs() < 1024.0 - 0.05 {
            return format!("{value:3.1} {unit}B");
        }
    }
    format!("{value:3.1} YiB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_below_kib() {
        assert_eq!(format_bytes(0), "  0 B");
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_rounds_up_at_unit_boundary() {
        // 1023.95 KiB worth of bytes should show as 1.0 MiB, not 1024.0 KiB
        assert_eq!(format_bytes(1024 * 1024 - 1), "1.0 MiB");
    }

    #[test]
    fn format_bytes_mib_gib() {
        assert_eq!(format_bytes(1024 * 1024), "1.0 MiB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0 GiB");
    }

    #[test]
    fn action_generation_protocol_reports_planned_counts() {
        let mut stats = Statistics::new();
        stats.files_to_copy = 3;
        stats.bytes_to_copy = 2048;
        let report = stats.action_generation_protocol();
        assert!(report.contains("3 files"));
        assert!(report.contains("2.0 KiB"));
    }
}
