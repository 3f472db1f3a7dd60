//! Per-folder and per-run backup reports

use chrono::{DateTime, Utc};
use devmirror_types::{ErrorKind, FolderConfig, ScanItem, TransferOutcome, TransferStats};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How a folder configuration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    /// Scanned and every planned item was attempted
    Completed,
    /// The remote tree could not be listed
    ScanFailed,
    /// No sync session could be opened
    ChannelFailed,
}

/// One item that could not be synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Path relative to the source root
    pub relative_path: String,
    /// Full remote path
    pub source_path: String,
    /// Error classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
}

impl ItemFailure {
    /// Extract the failure from an outcome, if any
    pub fn from_outcome(outcome: &TransferOutcome) -> Option<Self> {
        outcome.error.as_ref().map(|error| Self {
            relative_path: outcome.item.relative_path.clone(),
            source_path: outcome.item.source_path.clone(),
            kind: error.kind(),
            message: error.to_string(),
        })
    }
}

/// Result of one folder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderReport {
    /// The folder configuration processed
    pub folder: FolderConfig,
    /// How the folder ended
    pub status: FolderStatus,
    /// Folder-level error message for failed scans and channels
    pub error: Option<String>,
    /// Items the scan planned
    pub items_planned: u64,
    /// Aggregate transfer statistics
    pub stats: TransferStats,
    /// Items that failed
    pub failures: Vec<ItemFailure>,
    /// Wall time spent on the folder
    pub duration: Duration,
}

impl FolderReport {
    pub(crate) fn new(folder: FolderConfig) -> Self {
        Self {
            folder,
            status: FolderStatus::Completed,
            error: None,
            items_planned: 0,
            stats: TransferStats::new(),
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub(crate) fn fail(&mut self, status: FolderStatus, message: String) {
        self.status = status;
        self.error = Some(message);
    }

    pub(crate) fn record(&mut self, outcome: &TransferOutcome) {
        self.stats.record(outcome);
        if let Some(failure) = ItemFailure::from_outcome(outcome) {
            self.failures.push(failure);
        }
    }

    /// Items synchronized successfully
    pub fn items_transferred(&self) -> u64 {
        self.stats.items_transferred()
    }

    /// Bytes written for files
    pub fn bytes_transferred(&self) -> u64 {
        self.stats.bytes_transferred
    }

    /// Whether the folder failed or any item in it failed
    pub fn has_failures(&self) -> bool {
        self.status != FolderStatus::Completed || !self.failures.is_empty()
    }
}

/// Result of a backup run for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    /// Identifier correlating logs of this run
    pub run_id: Uuid,
    /// Device that was backed up
    pub device_id: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall time of the whole run
    pub duration: Duration,
    /// One report per folder configuration, in processing order
    pub folders: Vec<FolderReport>,
}

impl BackupReport {
    /// Statistics summed across folders
    pub fn totals(&self) -> TransferStats {
        let mut totals = TransferStats::new();
        for folder in &self.folders {
            totals.merge(&folder.stats);
        }
        totals
    }

    /// Whether any folder or item failed
    pub fn has_failures(&self) -> bool {
        self.folders.iter().any(FolderReport::has_failures)
    }

    /// Number of folders that did not complete
    pub fn failed_folders(&self) -> usize {
        self.folders
            .iter()
            .filter(|folder| folder.status != FolderStatus::Completed)
            .count()
    }
}

/// Dry-run result for one folder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderPlan {
    /// The folder configuration scanned
    pub folder: FolderConfig,
    /// Items that would be synchronized, in processing order
    pub items: Vec<ScanItem>,
    /// Folder-level error when the folder could not be scanned
    pub error: Option<String>,
}

impl FolderPlan {
    /// Total bytes of planned files
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(ScanItem::size).sum()
    }
}
