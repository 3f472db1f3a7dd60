//! Progress bars driven by backup events

use console::style;
use devmirror_sync::{BackupEvent, BackupProgress, EventReceiver};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const SCAN_TEMPLATE: &str = "{spinner:.blue} {msg}";
const TRANSFER_TEMPLATE: &str =
    "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})";

/// Renders one progress bar per folder configuration
pub struct ProgressRenderer {
    progress: BackupProgress,
    bar: Option<ProgressBar>,
    folder: String,
    visible: bool,
}

impl ProgressRenderer {
    /// Create a renderer; hidden renderers track progress without drawing
    pub fn new(visible: bool) -> Self {
        Self {
            progress: BackupProgress::new(),
            bar: None,
            folder: String::new(),
            visible,
        }
    }

    /// Apply one event and redraw
    pub fn handle(&mut self, event: &BackupEvent) {
        self.progress.apply(event);

        match event {
            BackupEvent::FolderStarted { source_root } => {
                self.finish_bar();
                let bar = self.new_bar();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template(SCAN_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.set_message(format!("Scanning {}", source_root));
                bar.enable_steady_tick(Duration::from_millis(100));
                self.bar = Some(bar);
                self.folder.clone_from(source_root);
            }
            BackupEvent::ScanFinished { items, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template(TRANSFER_TEMPLATE)
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("█▉▊▋▌▍▎▏  "),
                    );
                    bar.set_length(*items);
                    bar.set_position(0);
                }
            }
            BackupEvent::ItemFinished { relative_path, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(self.progress.items_processed);
                    bar.set_message(format!(
                        "{} {}",
                        file_name(relative_path),
                        style(self.progress.format_transfer_rate()).dim()
                    ));
                }
            }
            BackupEvent::FolderFinished { .. } => self.finish_bar(),
        }
    }

    /// Finish the current bar, if any
    pub fn finish(&mut self) {
        self.finish_bar();
    }

    fn new_bar(&self) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        if !self.visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar
    }

    fn finish_bar(&mut self) {
        let Some(bar) = self.bar.take() else {
            return;
        };

        let folder = &self.folder;
        let message = if self.progress.items_failed > 0 {
            format!(
                "{} {} ({} failed)",
                style("⚠").yellow(),
                folder,
                self.progress.items_failed
            )
        } else {
            format!("{} {}", style("✓").green(), folder)
        };
        bar.finish_with_message(message);
    }
}

/// Drain `receiver` until every sender is dropped
pub async fn render_events(mut receiver: EventReceiver, visible: bool) {
    let mut renderer = ProgressRenderer::new(visible);
    while let Some(event) = receiver.recv().await {
        renderer.handle(&event);
    }
    renderer.finish();
}

fn file_name(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}
