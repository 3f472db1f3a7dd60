//! Collaborator traits consumed by the synchronization core
//!
//! The core never talks to a device or to the disk directly. It drives a
//! [`RemoteSyncChannel`] obtained from a [`ChannelProvider`] and a
//! [`LocalFilesystem`], which keeps the traversal and transfer logic testable
//! against in-memory implementations.

use crate::{LocalStat, RemoteEntry, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::time::SystemTime;
use tokio::io::AsyncWrite;

/// Lazy, finite, non-restartable sequence of file content chunks.
///
/// The stream borrows the channel it was pulled from, so at most one pull is
/// outstanding per session.
pub type PullStream<'a> = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'a>>;

/// An open file-sync session with one device
#[async_trait]
pub trait RemoteSyncChannel: Send {
    /// List the immediate children of a remote directory
    async fn list_directory(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Start streaming the content of a remote file
    async fn pull_file<'a>(&'a mut self, path: &str) -> Result<PullStream<'a>>;

    /// Release the session; calling it more than once is a no-op
    async fn close(&mut self) -> Result<()>;
}

/// Opens sync sessions for devices
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Channel type produced by this provider
    type Channel: RemoteSyncChannel;

    /// Open a new session for `device_id`
    async fn open(&self, device_id: &str) -> Result<Self::Channel>;
}

/// Local destination filesystem operations
#[async_trait]
pub trait LocalFilesystem: Send + Sync {
    /// Writable byte sink returned by [`LocalFilesystem::create_file`]
    type Writer: AsyncWrite + Send + Unpin;

    /// Query metadata; `Ok(None)` when the path does not exist
    async fn stat(&self, path: &Path) -> Result<Option<LocalStat>>;

    /// Create a directory and all of its parents; succeeds if it already exists
    async fn ensure_directory(&self, path: &Path) -> Result<()>;

    /// Create or truncate a file for writing
    async fn create_file(&self, path: &Path) -> Result<Self::Writer>;

    /// Set access and modification times
    async fn set_times(&self, path: &Path, accessed: SystemTime, modified: SystemTime)
        -> Result<()>;
}
