//! Backup orchestration for one device
//!
//! A [`BackupRun`] walks the folder configurations of a device strictly one
//! after the other. Each folder gets its own sync session, which is closed on
//! every exit path. Scan and channel failures end only the folder they occur
//! in; item failures end only the item.

use crate::progress::{BackupEvent, EventSender};
use crate::report::{BackupReport, FolderPlan, FolderReport, FolderStatus};
use crate::scanner::TreeScanner;
use crate::synchronizer::EntrySynchronizer;
use chrono::Utc;
use devmirror_types::{
    ChannelProvider, FolderConfig, LocalFilesystem, RemoteSyncChannel, Result, ScanItem,
};
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives scan and synchronization of a device's folder configurations
#[derive(Debug)]
pub struct BackupRun<P, F> {
    provider: P,
    fs: F,
    events: Option<EventSender>,
}

impl<P, F> BackupRun<P, F>
where
    P: ChannelProvider,
    F: LocalFilesystem,
{
    /// Create a run opening sessions through `provider` and writing through `fs`
    pub fn new(provider: P, fs: F) -> Self {
        Self {
            provider,
            fs,
            events: None,
        }
    }

    /// Publish progress events to `sender`
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Back up every folder configuration of `device_id`, in order
    pub async fn run(&self, device_id: &str, folders: &[FolderConfig]) -> BackupReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!(
            "Backing up device [{}]: {} folder(s), run {}",
            device_id,
            folders.len(),
            run_id
        );

        let mut reports = Vec::with_capacity(folders.len());
        for folder in folders {
            reports.push(self.run_folder(device_id, run_id, folder).await);
        }

        let report = BackupReport {
            run_id,
            device_id: device_id.to_string(),
            started_at,
            duration: start_time.elapsed(),
            folders: reports,
        };

        let totals = report.totals();
        info!(
            "Backup of [{}] finished: {} transferred, {} failed, {} bytes in {:?}",
            device_id,
            totals.items_transferred(),
            totals.items_failed,
            totals.bytes_transferred,
            report.duration
        );

        report
    }

    /// Scan every folder configuration without writing anything
    pub async fn plan(&self, device_id: &str, folders: &[FolderConfig]) -> Vec<FolderPlan> {
        let mut plans = Vec::with_capacity(folders.len());

        for folder in folders {
            let span = info_span!("plan", device = %device_id, source = %folder.source_root);
            let plan = async {
                match self.scan_folder(device_id, folder).await {
                    Ok(items) => FolderPlan {
                        folder: folder.clone(),
                        items,
                        error: None,
                    },
                    Err(e) => {
                        error!("Could not plan [{}]: {}", folder.source_root, e);
                        FolderPlan {
                            folder: folder.clone(),
                            items: Vec::new(),
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            .instrument(span)
            .await;
            plans.push(plan);
        }

        plans
    }

    async fn scan_folder(&self, device_id: &str, folder: &FolderConfig) -> Result<Vec<ScanItem>> {
        let mut channel = self.provider.open(device_id).await?;
        let result = TreeScanner::new(&self.fs).scan(&mut channel, folder).await;
        close_channel(&mut channel).await;
        result
    }

    async fn run_folder(&self, device_id: &str, run_id: Uuid, folder: &FolderConfig) -> FolderReport {
        let span = info_span!(
            "folder",
            device = %device_id,
            source = %folder.source_root,
            run_id = %run_id
        );

        async {
            let start_time = Instant::now();
            let mut report = FolderReport::new(folder.clone());
            self.emit(BackupEvent::FolderStarted {
                source_root: folder.source_root.clone(),
            });

            match self.provider.open(device_id).await {
                Ok(mut channel) => {
                    if let Err(e) = self.synchronize_folder(&mut channel, folder, &mut report).await {
                        error!("Scan of [{}] failed: {}", folder.source_root, e);
                        report.fail(FolderStatus::ScanFailed, e.to_string());
                    }
                    close_channel(&mut channel).await;
                }
                Err(e) => {
                    error!("Could not open sync channel: {}", e);
                    report.fail(FolderStatus::ChannelFailed, e.to_string());
                }
            }

            report.duration = start_time.elapsed();
            report.stats.duration = report.duration;
            self.emit(BackupEvent::FolderFinished {
                source_root: folder.source_root.clone(),
            });

            info!(
                "Folder [{}] done: {}/{} items, {} bytes, {} failed",
                folder.source_root,
                report.items_transferred(),
                report.items_planned,
                report.bytes_transferred(),
                report.failures.len()
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Scan, then synchronize in scan order. Only a scan failure is returned.
    async fn synchronize_folder(
        &self,
        channel: &mut P::Channel,
        folder: &FolderConfig,
        report: &mut FolderReport,
    ) -> Result<()> {
        let items = TreeScanner::new(&self.fs).scan(channel, folder).await?;
        report.items_planned = items.len() as u64;
        self.emit(BackupEvent::ScanFinished {
            items: report.items_planned,
            bytes: items.iter().map(ScanItem::size).sum(),
        });

        let synchronizer = EntrySynchronizer::new(&self.fs);
        for item in items {
            let outcome = synchronizer.synchronize(channel, item).await;
            self.emit(BackupEvent::ItemFinished {
                relative_path: outcome.item.relative_path.clone(),
                bytes: outcome.bytes_transferred,
                transferred: outcome.transferred,
            });
            report.record(&outcome);
        }

        Ok(())
    }

    fn emit(&self, event: BackupEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is rendering progress
            let _ = events.send(event);
        }
    }
}

async fn close_channel<C: RemoteSyncChannel + ?Sized>(channel: &mut C) {
    if let Err(e) = channel.close().await {
        warn!("Failed to close sync channel: {}", e);
    }
}
