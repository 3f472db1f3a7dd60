//! Change detection between remote entries and their local destinations

use devmirror_types::{unix_seconds, LocalFilesystem, LocalStat, RemoteEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Outcome of comparing a remote file with its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeDecision {
    /// Destination does not exist
    Missing,
    /// Sizes differ
    SizeChanged {
        /// Remote size in bytes
        source: u64,
        /// Local size in bytes
        destination: u64,
    },
    /// Modification times differ at whole-second resolution
    ModifiedChanged {
        /// Remote modification time, Unix seconds
        source: i64,
        /// Local modification time, Unix seconds
        destination: i64,
    },
    /// Size and modification time both match
    Unchanged,
    /// Destination metadata could not be read; transfer anyway
    StatFailed,
}

impl ChangeDecision {
    /// Whether the entry must be transferred
    pub fn needs_transfer(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Compare remote size and modification time against a local stat
pub fn compare(source_size: u64, source_modified: SystemTime, destination: &LocalStat) -> ChangeDecision {
    if source_size != destination.size {
        return ChangeDecision::SizeChanged {
            source: source_size,
            destination: destination.size,
        };
    }

    let source = unix_seconds(source_modified);
    let destination = unix_seconds(destination.modified);
    if source != destination {
        return ChangeDecision::ModifiedChanged {
            source,
            destination,
        };
    }

    ChangeDecision::Unchanged
}

/// Decides whether remote files need transferring by diffing against the destination
#[derive(Debug)]
pub struct ChangeDetector<'a, F> {
    fs: &'a F,
}

impl<'a, F: LocalFilesystem> ChangeDetector<'a, F> {
    /// Create a detector querying `fs`
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Compare `source` with the entry at `destination`.
    ///
    /// Metadata failures other than "not found" are logged and resolve to
    /// [`ChangeDecision::StatFailed`], which still requests a transfer.
    pub async fn evaluate(&self, source: &RemoteEntry, destination: &Path) -> ChangeDecision {
        match self.fs.stat(destination).await {
            Ok(None) => ChangeDecision::Missing,
            Ok(Some(stat)) => compare(source.size(), source.modified, &stat),
            Err(error) => {
                warn!(
                    "Could not stat [{}], transferring anyway: {}",
                    destination.display(),
                    error
                );
                ChangeDecision::StatFailed
            }
        }
    }

    /// Whether `source` must be transferred to `destination`
    pub async fn needs_transfer(&self, source: &RemoteEntry, destination: &Path) -> bool {
        let decision = self.evaluate(source, destination).await;
        debug!("Entry [{}]: {:?}", source.name, decision);
        decision.needs_transfer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokioFilesystem;
    use devmirror_tests::{at, write_with_mtime, FaultyFilesystem};
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(100, 1000, 100, 1000, ChangeDecision::Unchanged)]
    #[case(100, 1000, 101, 1000, ChangeDecision::SizeChanged { source: 100, destination: 101 })]
    #[case(100, 1000, 100, 999, ChangeDecision::ModifiedChanged { source: 1000, destination: 999 })]
    #[case(0, 0, 0, 0, ChangeDecision::Unchanged)]
    fn test_compare(
        #[case] source_size: u64,
        #[case] source_secs: u64,
        #[case] destination_size: u64,
        #[case] destination_secs: u64,
        #[case] expected: ChangeDecision,
    ) {
        let destination = LocalStat {
            size: destination_size,
            modified: at(destination_secs),
        };
        assert_eq!(compare(source_size, at(source_secs), &destination), expected);
    }

    #[test]
    fn test_compare_ignores_sub_second_precision() {
        let destination = LocalStat {
            size: 5,
            modified: at(1000),
        };
        let source = at(1000) + std::time::Duration::from_millis(750);
        assert_eq!(compare(5, source, &destination), ChangeDecision::Unchanged);
    }

    #[tokio::test]
    async fn test_missing_destination_needs_transfer() {
        let temp_dir = TempDir::new().unwrap();
        let fs = TokioFilesystem::default();
        let detector = ChangeDetector::new(&fs);

        let entry = RemoteEntry::file("a.txt", 100, at(1000));
        let decision = detector
            .evaluate(&entry, &temp_dir.path().join("a.txt"))
            .await;

        assert_eq!(decision, ChangeDecision::Missing);
        assert!(decision.needs_transfer());
    }

    #[tokio::test]
    async fn test_matching_destination_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        write_with_mtime(&path, &[b'x'; 100], 1000);

        let fs = TokioFilesystem::default();
        let detector = ChangeDetector::new(&fs);

        assert!(!detector.needs_transfer(&RemoteEntry::file("a.txt", 100, at(1000)), &path).await);
        assert!(detector.needs_transfer(&RemoteEntry::file("a.txt", 99, at(1000)), &path).await);
        assert!(detector.needs_transfer(&RemoteEntry::file("a.txt", 100, at(1001)), &path).await);
    }

    #[tokio::test]
    async fn test_stat_failure_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        write_with_mtime(&path, &[b'x'; 100], 1000);

        let fs = FaultyFilesystem::new(TokioFilesystem::default()).fail_stat(&path);
        let detector = ChangeDetector::new(&fs);

        let decision = detector
            .evaluate(&RemoteEntry::file("a.txt", 100, at(1000)), &path)
            .await;
        assert_eq!(decision, ChangeDecision::StatFailed);
        assert!(decision.needs_transfer());
    }
}
