//! seedup CLI - resumable torrent downloads with upload to Google Drive.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use tokio_util::sync::CancellationToken;

use seedup::cli::{self, ConfigUpdate, ExitStatus};
use seedup::{AppConfig, DedupPolicy};

#[derive(Debug, Parser)]
#[command(name = "seedup", version, about, propagate_version = true)]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a torrent, resuming a saved session when present
    #[command(alias = "dl")]
    Download(DownloadArgs),
    /// Upload a file or folder to Google Drive
    #[command(alias = "up")]
    Upload(UploadArgs),
    /// Show whether a resumable session exists
    Status(DirArgs),
    /// Delete the saved session
    Clear(DirArgs),
    /// View or change stored settings
    #[command(alias = "cfg")]
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct DownloadArgs {
    /// Path to a .torrent file or a magnet link
    #[arg(short, long)]
    torrent: String,
    /// Download directory
    #[arg(short, long)]
    destination: Option<PathBuf>,
    /// Start fresh instead of resuming a saved session
    #[arg(long)]
    no_resume: bool,
    /// Upload to Google Drive after the download completes
    #[arg(long)]
    upload: bool,
    /// Google Drive folder id to upload into
    #[arg(short, long)]
    folder_id: Option<String>,
    /// Upload files even if they already exist remotely
    #[arg(long)]
    no_skip: bool,
}

#[derive(Debug, Args)]
struct UploadArgs {
    /// File or folder to upload
    #[arg(short, long)]
    path: PathBuf,
    /// Google Drive folder id to upload into
    #[arg(short, long)]
    folder_id: Option<String>,
    /// Upload files even if they already exist remotely
    #[arg(long)]
    no_skip: bool,
}

#[derive(Debug, Args)]
struct DirArgs {
    /// Download directory holding the session
    #[arg(short, long)]
    destination: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Print the effective configuration
    #[arg(long)]
    show: bool,
    /// Store a Google Drive access token (encrypted)
    #[arg(long)]
    token: Option<String>,
    /// Default Google Drive folder id (empty to unset)
    #[arg(long)]
    folder_id: Option<String>,
    /// Default download directory
    #[arg(long)]
    destination: Option<PathBuf>,
}

fn apply_dir(config: &mut AppConfig, destination: Option<PathBuf>) {
    if let Some(dir) = destination {
        config.download.download_dir = dir;
    }
}

fn apply_no_skip(config: &mut AppConfig, no_skip: bool) {
    if no_skip {
        config.upload.dedup = DedupPolicy::Disabled;
    }
}

/// Cancels `token` on the first Ctrl-C.
fn install_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received SIGINT, stopping after the current step");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    let result = match cli.command {
        Command::Download(args) => {
            apply_dir(&mut config, args.destination);
            apply_no_skip(&mut config, args.no_skip);
            if args.no_resume {
                config.download.auto_resume = false;
            }
            cli::run_download(&config, &args.torrent, args.upload, args.folder_id, &cancel).await
        }
        Command::Upload(args) => {
            apply_no_skip(&mut config, args.no_skip);
            cli::run_upload(&config.upload, &args.path, args.folder_id, &cancel).await
        }
        Command::Status(args) => {
            apply_dir(&mut config, args.destination);
            Ok(cli::run_status(&config.download))
        }
        Command::Clear(args) => {
            apply_dir(&mut config, args.destination);
            cli::run_clear(&config.download)
        }
        Command::Config(args) => {
            let update = ConfigUpdate {
                token: args.token,
                folder_id: args.folder_id,
                destination: args.destination,
            };
            cli::run_config(&config_path, update, args.show)
        }
    };

    match result {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) if e.is_setup() => {
            cli::print_setup_error(&e.to_string());
            ExitCode::from(ExitStatus::Failure.code())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(ExitStatus::Failure.code())
        }
    }
}
