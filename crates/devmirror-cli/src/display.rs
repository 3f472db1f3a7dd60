//! Terminal output for backup reports and plans

use console::style;
use devmirror_sync::{BackupReport, FolderPlan, FolderReport, FolderStatus};
use devmirror_types::unix_seconds;
use std::time::Duration;

/// Print the header shown before a device is processed
pub fn display_device_header(device_id: &str, folders: usize) {
    println!();
    println!(
        "{} {} ({} folder{})",
        style("📱").blue().bold(),
        style(device_id).bold().underlined(),
        folders,
        if folders == 1 { "" } else { "s" }
    );
}

/// Print the summary of one device's backup
pub fn display_backup_report(report: &BackupReport) {
    display_device_header(&report.device_id, report.folders.len());

    for folder in &report.folders {
        display_folder_report(folder);
    }

    let totals = report.totals();
    println!();
    println!("{}", style("Backup Statistics:").bold().underlined());
    println!("  Files transferred: {}", style(totals.files_transferred).green());
    println!(
        "  Directories synchronized: {}",
        style(totals.directories_synchronized).green()
    );
    println!(
        "  Bytes transferred: {}",
        style(format_bytes(totals.bytes_transferred)).green()
    );
    println!(
        "  Failed items: {}",
        if totals.items_failed > 0 {
            style(totals.items_failed).red()
        } else {
            style(totals.items_failed).green()
        }
    );
    println!(
        "  Failed folders: {}",
        if report.failed_folders() > 0 {
            style(report.failed_folders()).red()
        } else {
            style(report.failed_folders()).green()
        }
    );
    println!("  Duration: {}", style(format_duration(report.duration)).cyan());
    println!("  Run: {}", style(report.run_id).dim());

    if report.has_failures() {
        display_warning(&format!(
            "Backup of {} finished with failures",
            report.device_id
        ));
    } else {
        display_success(&format!("Backup of {} completed", report.device_id));
    }
}

fn display_folder_report(folder: &FolderReport) {
    let marker = match folder.status {
        FolderStatus::Completed if folder.failures.is_empty() => style("✓").green().bold(),
        FolderStatus::Completed => style("⚠").yellow().bold(),
        FolderStatus::ScanFailed | FolderStatus::ChannelFailed => style("✗").red().bold(),
    };

    println!(
        "  {} {} → {}",
        marker,
        style(&folder.folder.source_root).cyan(),
        style(folder.folder.destination_root.display()).cyan()
    );

    if let Some(error) = &folder.error {
        println!("      {}", style(error).red());
        return;
    }

    println!(
        "      {} of {} item(s), {} in {}",
        folder.items_transferred(),
        folder.items_planned,
        format_bytes(folder.bytes_transferred()),
        format_duration(folder.duration)
    );
    for failure in &folder.failures {
        println!(
            "      {} {}: {}",
            style("•").red(),
            failure.relative_path,
            style(&failure.message).dim()
        );
    }
}

/// Print the dry-run result for one device
pub fn display_plan(device_id: &str, plans: &[FolderPlan]) {
    display_device_header(device_id, plans.len());

    for plan in plans {
        println!(
            "  {} {} → {}",
            style("→").green().bold(),
            style(&plan.folder.source_root).cyan(),
            style(plan.folder.destination_root.display()).cyan()
        );

        if let Some(error) = &plan.error {
            println!("      {}", style(error).red());
            continue;
        }

        if plan.items.is_empty() {
            println!("      {}", style("Up to date").dim());
            continue;
        }

        for item in &plan.items {
            if item.is_directory() {
                println!("      {}/", item.relative_path);
            } else {
                println!(
                    "      {} {}",
                    item.relative_path,
                    style(format!(
                        "({}, mtime {})",
                        format_bytes(item.size()),
                        unix_seconds(item.modified)
                    ))
                    .dim()
                );
            }
        }
        println!(
            "      {} item(s), {}",
            plan.items.len(),
            format_bytes(plan.total_bytes())
        );
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Display a warning message with proper formatting
pub fn display_warning(message: &str) {
    println!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Display an error message with proper formatting
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Display a success message with proper formatting
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

/// Display an info message with proper formatting
pub fn display_info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), style(message).blue());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0.00 B")]
    #[case(1023, "1023.00 B")]
    #[case(1024, "1.00 KB")]
    #[case(1536, "1.50 KB")]
    #[case(5 * 1024 * 1024, "5.00 MB")]
    #[case(3 * 1024 * 1024 * 1024, "3.00 GB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[rstest]
    #[case(Duration::from_millis(1500), "1.50s")]
    #[case(Duration::from_secs(125), "2m 5s")]
    #[case(Duration::from_secs(3725), "1h 2m 5s")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }
}
