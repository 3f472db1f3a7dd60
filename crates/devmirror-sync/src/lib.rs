//! Incremental device-to-local mirroring engine for devmirror
//!
//! This crate holds the scan, diff and synchronize pipeline:
//!
//! - **Change detection**: size and whole-second modification time comparison
//!   against the destination, failing open when metadata cannot be read
//! - **Tree scanning**: depth-first, post-order enumeration of the remote tree
//!   so directories are always synchronized after their contents
//! - **Entry synchronization**: directory creation, streamed file content and
//!   timestamp restoration, with every failure captured per item
//! - **Backup runs**: sequential processing of a device's folder
//!   configurations with per-folder isolation, progress events and reports
//!
//! # Examples
//!
//! ```rust,no_run
//! use devmirror_sync::{BackupRun, TokioFilesystem};
//! use devmirror_types::{ChannelProvider, FolderConfig};
//!
//! # async fn example<P: ChannelProvider>(provider: P) {
//! let run = BackupRun::new(provider, TokioFilesystem::default());
//! let folders = vec![FolderConfig::new("/sdcard/DCIM", "/backup/phone/dcim")];
//! let report = run.run("emulator-5554", &folders).await;
//! println!("{} items transferred", report.totals().items_transferred());
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod diff;
pub mod local;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod synchronizer;

pub use backup::BackupRun;
pub use diff::{compare, ChangeDecision, ChangeDetector};
pub use local::{TokioFilesystem, DEFAULT_WRITE_BUFFER_SIZE};
pub use progress::{event_channel, BackupEvent, BackupProgress, EventReceiver, EventSender};
pub use report::{BackupReport, FolderPlan, FolderReport, FolderStatus, ItemFailure};
pub use scanner::TreeScanner;
pub use synchronizer::EntrySynchronizer;
