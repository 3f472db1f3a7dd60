//! devmirror - incremental Android device backup
//!
//! Mirrors configured folders of connected devices onto local directories
//! through a running debug bridge server. Only new or changed files are
//! transferred, and remote modification times are kept on the copies.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use devmirror_adb::AdbChannelProvider;
use devmirror_config::{Config, ConfigLoader};
use devmirror_sync::{event_channel, BackupRun, TokioFilesystem};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

mod display;
mod json_output;
mod logging;
mod progress;

use display::{
    display_backup_report, display_error, display_info, display_plan, display_success,
    display_warning,
};
use json_output::{print_json, BackupResultJson, PlanResultJson};

const DEFAULT_CONFIG_FILE: &str = "devmirror.yaml";

/// devmirror - incremental Android device backup
#[derive(Parser)]
#[command(
    name = "devmirror",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental backup of Android device folders",
    long_about = "devmirror mirrors configured folders of Android devices onto local directories.\n\
                  Only files whose size or modification time changed are transferred, and the\n\
                  remote modification times are restored on the local copies."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up configured devices
    Backup {
        /// Only back up these devices
        #[arg(long = "device", value_name = "ID")]
        devices: Vec<String>,
    },
    /// Show what a backup would transfer, without writing anything
    Plan {
        /// Device to scan
        #[arg(long, value_name = "ID")]
        device: String,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
    /// Write a default configuration file
    Init {
        /// Destination of the configuration file
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Init { path } = &cli.command {
        let path = path.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        init_command(path)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_deref())?;

    let level = logging::resolve_level(cli.debug, cli.verbose, cli.quiet, &config.logging.level);
    let _guard = logging::init_logging(level, &config.logging)?;

    info!("devmirror v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Backup { devices } => backup_command(&config, devices, cli.quiet, cli.json).await,
        Commands::Plan { device } => plan_command(&config, &device, cli.json).await,
        Commands::Config { default } => {
            config_command(&config, default, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ConfigLoader::load_default().context("Failed to load configuration"),
    }
}

fn backup_run(config: &Config) -> BackupRun<AdbChannelProvider, TokioFilesystem> {
    let provider = AdbChannelProvider::new(config.adb.host.clone(), config.adb.port)
        .with_connect_timeout(config.adb.connect_timeout());
    let fs = TokioFilesystem::new(config.transfer.write_buffer_size);
    BackupRun::new(provider, fs)
}

async fn backup_command(
    config: &Config,
    devices: Vec<String>,
    quiet: bool,
    json: bool,
) -> Result<ExitCode> {
    let targets: Vec<String> = if devices.is_empty() {
        config.device_ids().map(str::to_string).collect()
    } else {
        devices
    };

    if targets.is_empty() {
        display_warning("No devices configured; run `devmirror init` to create a configuration");
        return Ok(ExitCode::SUCCESS);
    }

    let (sender, receiver) = event_channel();
    let renderer = tokio::spawn(progress::render_events(receiver, !quiet && !json));
    let run = backup_run(config).with_events(sender);

    let mut reports = Vec::with_capacity(targets.len());
    let mut skipped = Vec::new();
    for device_id in targets {
        let Some(folders) = config.folders_for(&device_id) else {
            info!("Unknown device [{}], skipping.", device_id);
            skipped.push(device_id);
            continue;
        };
        reports.push(run.run(&device_id, folders).await);
    }

    // Dropping the run closes the event channel and lets the renderer finish
    drop(run);
    renderer.await.context("Progress renderer failed")?;

    let failed = reports.iter().any(|report| report.has_failures());

    if json {
        print_json(&BackupResultJson::new(reports, skipped))?;
    } else if !quiet {
        for device_id in &skipped {
            display_warning(&format!("Unknown device {}, skipped", device_id));
        }
        for report in &reports {
            display_backup_report(report);
        }
        if failed {
            display_error("Some folders or items failed; they will be retried on the next run");
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn plan_command(config: &Config, device_id: &str, json: bool) -> Result<ExitCode> {
    let Some(folders) = config.folders_for(device_id) else {
        info!("Unknown device [{}], skipping.", device_id);
        bail!("Device {} is not configured", device_id);
    };

    let plans = backup_run(config).plan(device_id, folders).await;
    let failed = plans.iter().any(|plan| plan.error.is_some());

    if json {
        print_json(&PlanResultJson::new(device_id, &plans))?;
    } else {
        display_plan(device_id, &plans);
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn config_command(config: &Config, default: bool, json: bool) -> Result<()> {
    let default_config = Config::default();
    let (title, config) = if default {
        ("Default configuration:", &default_config)
    } else {
        ("Current configuration:", config)
    };

    if json {
        return print_json(config);
    }

    println!("{} {}", style("⚙").blue().bold(), title);
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    println!("{}", yaml);
    Ok(())
}

fn init_command(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Configuration file {} already exists", path.display());
    }

    ConfigLoader::generate_default_config(path)
        .with_context(|| format!("Failed to write configuration to {}", path.display()))?;

    display_success(&format!("Wrote default configuration to {}", path.display()));
    display_info("Add your devices and folders under `devices`, then run `devmirror backup`");
    Ok(())
}
