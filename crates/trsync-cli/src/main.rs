use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use trsync_storage::{PgStore, StoreRole};
use trsync_sync::config::{init_settings_file, resolve_config_path};
use trsync_sync::{schedule, select_window, RunError, RunMode, SyncConfig, SyncPipeline};

mod logging;

#[derive(Debug, Parser)]
#[command(name = "trsync")]
#[command(about = "Resync the most recent transaction days into a destination table")]
struct Cli {
    /// Settings file [default: $TRSYNC_CONFIG or ./setting.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for log.txt [default: the settings file's directory]
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replace the destination window and run the aggregation routines
    Sync {
        /// Select, fetch and resolve without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the dates and boundary the next sync would use
    Window,
    /// Write an empty settings template if none exists
    InitConfig,
    /// Run syncs on the configured cron schedule until ctrl-c
    Schedule,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.clone());
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| default_log_dir(&config_path));

    let _log_guard = match logging::init(&log_dir, &cli.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command.unwrap_or(Commands::Sync { dry_run: false }), &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code_for(&err);
            match err.downcast_ref::<RunError>() {
                Some(run_err) => error!(kind = run_err.kind(), "{err:#}"),
                None => error!("{err:#}"),
            }
            ExitCode::from(code)
        }
    }
}

async fn run(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Sync { dry_run } => {
            let config = SyncConfig::load(config_path)?;
            let pipeline = SyncPipeline::connect(config).await?;
            let mode = if dry_run { RunMode::DryRun } else { RunMode::Apply };
            let summary = pipeline.run_once(mode).await?;
            println!(
                "sync {:?}: run_id={} boundary={} fetched={} deleted={} inserted={} inferred={} manual={} failed_triggers={}",
                summary.status,
                summary.run_id,
                summary
                    .minimum_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                summary.rows_fetched,
                summary.rows_deleted,
                summary.rows_inserted,
                summary.gap_fill.inferred,
                summary.gap_fill.sentinel,
                summary.failed_triggers(),
            );
        }
        Commands::Window => {
            let config = SyncConfig::load(config_path)?;
            let source =
                PgStore::connect(&config.source_url, StoreRole::Source, config.pool_settings())
                    .await
                    .map_err(RunError::Connection)?;
            let window = select_window(&source, &config.source_table, config.window_days).await?;
            for date in window.dates() {
                println!("{date}");
            }
            match window.minimum_date() {
                Some(boundary) => println!("boundary: {boundary}"),
                None => println!("boundary: none (source is empty)"),
            }
            source.close().await;
        }
        Commands::InitConfig => {
            if init_settings_file(config_path)? {
                println!(
                    "wrote {}; fill in the connection and table details",
                    config_path.display()
                );
            } else {
                println!("{} already exists", config_path.display());
            }
        }
        Commands::Schedule => {
            let config = SyncConfig::load(config_path)?;
            let pipeline = Arc::new(SyncPipeline::connect(config).await?);
            schedule::run_scheduled(pipeline).await?;
        }
    }
    Ok(())
}

fn default_log_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<RunError>()
        .map(RunError::exit_code)
        .unwrap_or(1)
}
