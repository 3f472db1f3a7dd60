//! JSON output structures for the devmirror CLI

use anyhow::{Context, Result};
use devmirror_sync::{BackupReport, FolderPlan};
use devmirror_types::{unix_seconds, ScanItem};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// devmirror version
    pub version: String,
    /// Operation type
    pub operation: String,
    /// Timestamp when the output was produced
    pub timestamp: String,
}

impl OperationMetadata {
    /// Metadata for `operation`, stamped now
    pub fn new(operation: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Complete JSON output for the backup command
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupResultJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// One report per device backed up
    pub reports: Vec<BackupReport>,
    /// Requested devices missing from the configuration
    pub skipped_devices: Vec<String>,
    /// Overall result
    pub result: OperationResult,
}

/// Overall result across devices
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether every folder and item succeeded
    pub success: bool,
    /// Items synchronized
    pub items_transferred: u64,
    /// Bytes written
    pub bytes_transferred: u64,
    /// Items that failed
    pub items_failed: u64,
    /// Folders that could not be scanned or opened
    pub failed_folders: usize,
}

impl BackupResultJson {
    /// Wrap the reports of a backup command
    pub fn new(reports: Vec<BackupReport>, skipped_devices: Vec<String>) -> Self {
        let mut result = OperationResult {
            success: true,
            items_transferred: 0,
            bytes_transferred: 0,
            items_failed: 0,
            failed_folders: 0,
        };

        for report in &reports {
            let totals = report.totals();
            result.items_transferred += totals.items_transferred();
            result.bytes_transferred += totals.bytes_transferred;
            result.items_failed += totals.items_failed;
            result.failed_folders += report.failed_folders();
            result.success &= !report.has_failures();
        }

        Self {
            metadata: OperationMetadata::new("backup"),
            reports,
            skipped_devices,
            result,
        }
    }
}

/// Complete JSON output for the plan command
#[derive(Debug, Serialize, Deserialize)]
pub struct PlanResultJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Device scanned
    pub device_id: String,
    /// One entry per folder configuration
    pub folders: Vec<FolderPlanJson>,
}

/// Planned items of one folder configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct FolderPlanJson {
    /// Remote source root
    pub source_root: String,
    /// Local destination root
    pub destination_root: PathBuf,
    /// Scan error, when the folder could not be planned
    pub error: Option<String>,
    /// Total bytes of planned files
    pub total_bytes: u64,
    /// Planned items in processing order
    pub items: Vec<PlannedItemJson>,
}

/// One planned item
#[derive(Debug, Serialize, Deserialize)]
pub struct PlannedItemJson {
    /// Path relative to the source root
    pub relative_path: String,
    /// `file` or `directory`
    pub kind: String,
    /// Size in bytes, zero for directories
    pub size: u64,
    /// Remote modification time in Unix seconds
    pub modified: i64,
}

impl From<&ScanItem> for PlannedItemJson {
    fn from(item: &ScanItem) -> Self {
        Self {
            relative_path: item.relative_path.clone(),
            kind: if item.is_directory() { "directory" } else { "file" }.to_string(),
            size: item.size(),
            modified: unix_seconds(item.modified),
        }
    }
}

impl From<&FolderPlan> for FolderPlanJson {
    fn from(plan: &FolderPlan) -> Self {
        Self {
            source_root: plan.folder.source_root.clone(),
            destination_root: plan.folder.destination_root.clone(),
            error: plan.error.clone(),
            total_bytes: plan.total_bytes(),
            items: plan.items.iter().map(PlannedItemJson::from).collect(),
        }
    }
}

impl PlanResultJson {
    /// Wrap the plans of one device
    pub fn new(device_id: &str, plans: &[FolderPlan]) -> Self {
        Self {
            metadata: OperationMetadata::new("plan"),
            device_id: device_id.to_string(),
            folders: plans.iter().map(FolderPlanJson::from).collect(),
        }
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmirror_types::{FolderConfig, RemoteEntry};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_plan_json() {
        let folder = FolderConfig::new("/sdcard", "/backup");
        let modified = UNIX_EPOCH + Duration::from_secs(1000);
        let plan = FolderPlan {
            folder: folder.clone(),
            items: vec![
                ScanItem::from_entry(&folder, "", &RemoteEntry::file("a.txt", 5, modified)),
                ScanItem::from_entry(&folder, "", &RemoteEntry::directory("sub", modified)),
            ],
            error: None,
        };

        let output = PlanResultJson::new("emulator-5554", &[plan]);
        let value = serde_json::to_value(&output).unwrap();

        assert_eq!(value["metadata"]["operation"], "plan");
        assert_eq!(value["folders"][0]["total_bytes"], 5);
        assert_eq!(value["folders"][0]["items"][0]["modified"], 1000);
        assert_eq!(value["folders"][0]["items"][1]["kind"], "directory");
    }

    #[test]
    fn test_backup_json_without_reports_succeeds() {
        let output = BackupResultJson::new(Vec::new(), vec!["unknown".to_string()]);
        assert!(output.result.success);
        assert_eq!(output.skipped_devices, vec!["unknown"]);
        assert_eq!(output.metadata.operation, "backup");
    }
}
