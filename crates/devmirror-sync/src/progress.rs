//! Progress events published while a backup runs

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Events published by [`crate::BackupRun`]; they never affect control flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupEvent {
    /// A folder configuration started
    FolderStarted {
        /// Remote source root
        source_root: String,
    },
    /// The scan of the current folder finished
    ScanFinished {
        /// Number of items planned for synchronization
        items: u64,
        /// Total bytes of planned files
        bytes: u64,
    },
    /// One item was processed
    ItemFinished {
        /// Item path relative to the source root
        relative_path: String,
        /// Bytes written for the item
        bytes: u64,
        /// Whether the item was synchronized
        transferred: bool,
    },
    /// The current folder configuration finished, successfully or not
    FolderFinished {
        /// Remote source root
        source_root: String,
    },
}

/// Sending half used by the run to publish events
pub type EventSender = mpsc::UnboundedSender<BackupEvent>;

/// Receiving half handed to the renderer
pub type EventReceiver = mpsc::UnboundedReceiver<BackupEvent>;

/// Create an event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Folds [`BackupEvent`]s into the progress of the current folder
#[derive(Debug, Clone)]
pub struct BackupProgress {
    /// Folder being processed
    pub current_folder: Option<String>,
    /// Items planned for the current folder
    pub total_items: u64,
    /// Bytes planned for the current folder
    pub total_bytes: u64,
    /// Items processed so far
    pub items_processed: u64,
    /// Items that failed so far
    pub items_failed: u64,
    /// Bytes written so far
    pub bytes_processed: u64,
    /// Folders finished since this tracker was created
    pub folders_finished: u64,
    start_time: Instant,
}

impl Default for BackupProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupProgress {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            current_folder: None,
            total_items: 0,
            total_bytes: 0,
            items_processed: 0,
            items_failed: 0,
            bytes_processed: 0,
            folders_finished: 0,
            start_time: Instant::now(),
        }
    }

    /// Apply one event
    pub fn apply(&mut self, event: &BackupEvent) {
        match event {
            BackupEvent::FolderStarted { source_root } => {
                self.current_folder = Some(source_root.clone());
                self.total_items = 0;
                self.total_bytes = 0;
                self.items_processed = 0;
                self.items_failed = 0;
                self.bytes_processed = 0;
                self.start_time = Instant::now();
            }
            BackupEvent::ScanFinished { items, bytes } => {
                self.total_items = *items;
                self.total_bytes = *bytes;
            }
            BackupEvent::ItemFinished {
                bytes, transferred, ..
            } => {
                self.items_processed += 1;
                self.bytes_processed += bytes;
                if !transferred {
                    self.items_failed += 1;
                }
            }
            BackupEvent::FolderFinished { source_root } => {
                debug!("Folder [{}] finished", source_root);
                self.current_folder = None;
                self.folders_finished += 1;
            }
        }
    }

    /// Progress of the current folder in percent
    pub fn percent(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.bytes_processed as f64 / self.total_bytes as f64) * 100.0
        } else if self.total_items > 0 {
            (self.items_processed as f64 / self.total_items as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Time since the current folder started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Current transfer rate in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.bytes_processed as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Transfer rate as a human-readable string
    pub fn format_transfer_rate(&self) -> String {
        format_bytes_per_second(self.transfer_rate())
    }
}

/// Format bytes per second as human-readable string
pub fn format_bytes_per_second(bytes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    let mut size = bytes_per_sec;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}
