//! Core data types for devmirror
//!
//! This module provides the data model shared by the scanner, the synchronizer
//! and the remote channel implementations: folder configurations, remote
//! listing entries, scan items, transfer outcomes and aggregate statistics.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::Error;

/// Transfer rate in bytes per second
pub type TransferRate = f64;

/// One source-root to destination-root mapping with its own empty-folder policy
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FolderConfig {
    /// Remote (POSIX) directory to mirror
    #[cfg_attr(feature = "serde", serde(alias = "source", alias = "sourceRoot"))]
    pub source_root: String,
    /// Local directory receiving the mirror
    #[cfg_attr(
        feature = "serde",
        serde(alias = "destination", alias = "destinationRoot")
    )]
    pub destination_root: PathBuf,
    /// Materialize remote directories even when nothing inside them changed
    #[cfg_attr(
        feature = "serde",
        serde(
            default = "default_synchronize_empty_folders",
            alias = "synchronizeEmptyFolders"
        )
    )]
    pub synchronize_empty_folders: bool,
}

#[cfg(feature = "serde")]
fn default_synchronize_empty_folders() -> bool {
    true
}

impl FolderConfig {
    /// Create a folder configuration that synchronizes empty folders
    pub fn new<S: Into<String>, P: Into<PathBuf>>(source_root: S, destination_root: P) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            synchronize_empty_folders: true,
        }
    }

    /// Set the empty-folder policy
    pub fn with_empty_folders(mut self, synchronize: bool) -> Self {
        self.synchronize_empty_folders = synchronize;
        self
    }
}

/// Shape of a remote entry, decided once at listing time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RemoteEntryKind {
    /// Regular file with its size in bytes
    File {
        /// File size in bytes
        size: u64,
    },
    /// Directory
    Directory,
}

/// A single child returned by a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name, without any directory component
    pub name: String,
    /// File or directory
    pub kind: RemoteEntryKind,
    /// Last modification time on the remote endpoint
    pub modified: SystemTime,
}

impl RemoteEntry {
    /// Create a file entry
    pub fn file<S: Into<String>>(name: S, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            kind: RemoteEntryKind::File { size },
            modified,
        }
    }

    /// Create a directory entry
    pub fn directory<S: Into<String>>(name: S, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            kind: RemoteEntryKind::Directory,
            modified,
        }
    }

    /// Whether this entry is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, RemoteEntryKind::Directory)
    }

    /// Size in bytes (zero for directories)
    pub fn size(&self) -> u64 {
        match self.kind {
            RemoteEntryKind::File { size } => size,
            RemoteEntryKind::Directory => 0,
        }
    }
}

/// One unit of work produced by the tree scanner
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanItem {
    /// Path relative to the folder's source root, `/`-separated
    pub relative_path: String,
    /// Full remote path, `/`-separated
    pub source_path: String,
    /// Full local path, joined with platform-native semantics
    pub destination_path: PathBuf,
    /// File or directory
    pub kind: RemoteEntryKind,
    /// Remote modification time to restore on the destination
    pub modified: SystemTime,
}

impl ScanItem {
    /// Build a scan item for `entry` found in the directory at `parent_relative`
    pub fn from_entry(folder: &FolderConfig, parent_relative: &str, entry: &RemoteEntry) -> Self {
        let relative_path = join_remote(parent_relative, &entry.name);
        Self {
            source_path: join_remote(&folder.source_root, &relative_path),
            destination_path: join_local(&folder.destination_root, &relative_path),
            relative_path,
            kind: entry.kind,
            modified: entry.modified,
        }
    }

    /// Whether this item is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, RemoteEntryKind::Directory)
    }

    /// Size in bytes (zero for directories)
    pub fn size(&self) -> u64 {
        match self.kind {
            RemoteEntryKind::File { size } => size,
            RemoteEntryKind::Directory => 0,
        }
    }
}

/// Result of attempting to synchronize one scan item
#[derive(Debug)]
pub struct TransferOutcome {
    /// The item that was processed
    pub item: ScanItem,
    /// Whether the item was fully materialized on the destination
    pub transferred: bool,
    /// Bytes written to the destination
    pub bytes_transferred: u64,
    /// Failure captured while processing the item
    pub error: Option<Error>,
}

impl TransferOutcome {
    /// Outcome of a successful transfer
    pub fn success(item: ScanItem, bytes_transferred: u64) -> Self {
        Self {
            item,
            transferred: true,
            bytes_transferred,
            error: None,
        }
    }

    /// Outcome of a failed transfer
    pub fn failure(item: ScanItem, error: Error) -> Self {
        Self {
            item,
            transferred: false,
            bytes_transferred: 0,
            error: Some(error),
        }
    }
}

/// Metadata of an existing local destination entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStat {
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

/// Aggregate statistics for synchronized items
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransferStats {
    /// Number of files written
    pub files_transferred: u64,
    /// Number of directories materialized
    pub directories_synchronized: u64,
    /// Total bytes written
    pub bytes_transferred: u64,
    /// Number of items that failed
    pub items_failed: u64,
    /// Total duration spent synchronizing
    pub duration: Duration,
}

impl TransferStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one transfer outcome
    pub fn record(&mut self, outcome: &TransferOutcome) {
        if !outcome.transferred {
            self.items_failed += 1;
        } else if outcome.item.is_directory() {
            self.directories_synchronized += 1;
        } else {
            self.files_transferred += 1;
            self.bytes_transferred += outcome.bytes_transferred;
        }
    }

    /// Number of items successfully synchronized
    pub fn items_transferred(&self) -> u64 {
        self.files_transferred + self.directories_synchronized
    }

    /// Calculate the overall transfer rate
    pub fn transfer_rate(&self) -> TransferRate {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_transferred as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &TransferStats) {
        self.files_transferred += other.files_transferred;
        self.directories_synchronized += other.directories_synchronized;
        self.bytes_transferred += other.bytes_transferred;
        self.items_failed += other.items_failed;
        self.duration += other.duration;
    }
}

/// Join a remote path component with POSIX semantics.
///
/// Remote paths are always `/`-separated regardless of the host platform.
pub fn join_remote(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Join a `/`-separated relative path onto a local root with native semantics
pub fn join_local(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|component| !component.is_empty())
        .fold(root.to_path_buf(), |path, component| path.join(component))
}

/// Whole seconds since the Unix epoch; times before the epoch are negative
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as i64,
        Err(before) => {
            let before = before.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

/// Drop the sub-second part of a timestamp
pub fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    let secs = unix_seconds(time);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
