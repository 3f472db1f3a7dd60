//! Integration tests and in-memory test doubles for devmirror
//!
//! The [`remote`] module provides a device tree held in memory that
//! implements the channel contracts, and [`test_utils`] holds timestamp
//! helpers plus a filesystem wrapper injecting local failures.

pub mod remote;
pub mod test_utils;

pub use remote::{MemoryChannel, MemoryChannelProvider, MemoryRemote};
pub use test_utils::{at, mtime_secs, write_with_mtime, FaultyFilesystem};
