//! Materialization of a single scan item on the local destination

use devmirror_types::{
    truncate_to_seconds, Error, LocalFilesystem, RemoteSyncChannel, Result, ScanItem,
    TransferOutcome,
};
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Writes scan items to the destination and restores their modification time
#[derive(Debug)]
pub struct EntrySynchronizer<'a, F> {
    fs: &'a F,
}

impl<'a, F: LocalFilesystem> EntrySynchronizer<'a, F> {
    /// Create a synchronizer writing through `fs`
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Synchronize one item.
    ///
    /// Never fails: every error is captured in the returned outcome so the
    /// caller can keep going with the next item.
    pub async fn synchronize<C>(&self, channel: &mut C, item: ScanItem) -> TransferOutcome
    where
        C: RemoteSyncChannel + ?Sized,
    {
        match self.try_synchronize(channel, &item).await {
            Ok(bytes) => {
                debug!("Synchronized [{}] ({} bytes)", item.relative_path, bytes);
                TransferOutcome::success(item, bytes)
            }
            Err(error) => {
                warn!("Failed to synchronize [{}]: {}", item.relative_path, error);
                TransferOutcome::failure(item, error)
            }
        }
    }

    async fn try_synchronize<C>(&self, channel: &mut C, item: &ScanItem) -> Result<u64>
    where
        C: RemoteSyncChannel + ?Sized,
    {
        let destination = item.destination_path.as_path();

        let bytes = if item.is_directory() {
            self.fs.ensure_directory(destination).await?;
            0
        } else {
            if let Some(parent) = destination.parent() {
                self.fs.ensure_directory(parent).await?;
            }
            self.write_file(channel, &item.source_path, destination)
                .await?
        };

        let modified = truncate_to_seconds(item.modified);
        self.fs.set_times(destination, modified, modified).await?;

        Ok(bytes)
    }

    async fn write_file<C>(&self, channel: &mut C, source: &str, destination: &Path) -> Result<u64>
    where
        C: RemoteSyncChannel + ?Sized,
    {
        let mut stream = channel.pull_file(source).await?;
        let mut writer = self.fs.create_file(destination).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| Error::local_io(destination, format!("Failed to write: {}", e)))?;
            written += chunk.len() as u64;
        }

        writer
            .shutdown()
            .await
            .map_err(|e| Error::local_io(destination, format!("Failed to flush: {}", e)))?;
        drop(writer);

        Ok(written)
    }
}
