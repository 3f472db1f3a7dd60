//! Depth-first, post-order traversal of the remote tree
//!
//! Every directory's own scan item is emitted strictly after the items of its
//! descendants. Synchronizing items in scan order therefore restores a
//! directory's modification time only once nothing else will be written
//! inside it.

use crate::diff::ChangeDetector;
use devmirror_types::{
    join_remote, FolderConfig, LocalFilesystem, RemoteEntryKind, RemoteSyncChannel, Result,
    ScanItem,
};
use futures::future::BoxFuture;
use tracing::{debug, info};

/// Enumerates a folder configuration's remote tree into an ordered work list
#[derive(Debug)]
pub struct TreeScanner<'a, F> {
    detector: ChangeDetector<'a, F>,
}

impl<'a, F: LocalFilesystem> TreeScanner<'a, F> {
    /// Create a scanner diffing against `fs`
    pub fn new(fs: &'a F) -> Self {
        Self {
            detector: ChangeDetector::new(fs),
        }
    }

    /// Scan `folder` through `channel`.
    ///
    /// Listings are issued one at a time. A listing failure anywhere in the
    /// tree aborts the whole scan; partial results are never returned.
    pub async fn scan<C>(&self, channel: &mut C, folder: &FolderConfig) -> Result<Vec<ScanItem>>
    where
        C: RemoteSyncChannel + ?Sized,
    {
        info!("Reading directory [{}]", folder.source_root);
        let items = self.scan_directory(channel, folder, String::new()).await?;
        info!(
            "Scan of [{}] finished: {} entries to synchronize",
            folder.source_root,
            items.len()
        );
        Ok(items)
    }

    fn scan_directory<'s, C>(
        &'s self,
        channel: &'s mut C,
        folder: &'s FolderConfig,
        relative_path: String,
    ) -> BoxFuture<'s, Result<Vec<ScanItem>>>
    where
        C: RemoteSyncChannel + ?Sized,
    {
        Box::pin(async move {
            let scan_path = join_remote(&folder.source_root, &relative_path);
            debug!("Scanning in [{}]", scan_path);

            let entries = channel.list_directory(&scan_path).await?;
            let mut total = Vec::new();

            for entry in entries {
                let item = ScanItem::from_entry(folder, &relative_path, &entry);

                match entry.kind {
                    RemoteEntryKind::File { .. } => {
                        if self
                            .detector
                            .needs_transfer(&entry, &item.destination_path)
                            .await
                        {
                            total.push(item);
                        }
                    }
                    RemoteEntryKind::Directory => {
                        let subtree = self
                            .scan_directory(&mut *channel, folder, item.relative_path.clone())
                            .await?;
                        let include = !subtree.is_empty() || folder.synchronize_empty_folders;
                        total.extend(subtree);

                        if include {
                            total.push(item);
                        } else {
                            debug!("Directory [{}] unchanged, omitted", item.relative_path);
                        }
                    }
                }
            }

            Ok(total)
        })
    }
}
