//! Core type system and error handling for devmirror
//!
//! This crate provides the foundational types shared across the devmirror
//! workspace:
//!
//! - **Data model**: folder configurations, remote entries, scan items and
//!   transfer outcomes
//! - **Error handling**: one error taxonomy aligned with how far each failure
//!   is allowed to propagate during a backup run
//! - **Traits**: the remote channel, channel provider and local filesystem
//!   contracts consumed by the synchronization core
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use devmirror_types::{FolderConfig, RemoteEntry, ScanItem};
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! let folder = FolderConfig::new("/sdcard/DCIM", "/backup/phone/dcim");
//! let entry = RemoteEntry::file("a.jpg", 1024, UNIX_EPOCH + Duration::from_secs(1000));
//! let item = ScanItem::from_entry(&folder, "", &entry);
//! assert_eq!(item.source_path, "/sdcard/DCIM/a.jpg");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use traits::*;
pub use types::*;
