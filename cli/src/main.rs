//! WWCP session store CLI
//!
//! Headless charging session store suitable for deployment as a systemd
//! service, Docker container, or standalone process.
//!
//! ```sh
//! # Replay the log and run the retention sweeper until Ctrl+C
//! wwcp-sessions
//!
//! # Custom config path
//! wwcp-sessions --config /etc/wwcp/config.toml run
//!
//! # Replay only and print the counters
//! wwcp-sessions replay
//!
//! # Show what the next retention pass would evict
//! wwcp-sessions sweep --dry-run
//!
//! # Validate config without starting
//! wwcp-sessions check
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use wwcp_core::application::sessions::SessionSweeper;
use wwcp_core::config::AppConfig;
use wwcp_core::server::{init_tracing, is_log_unavailable, ServiceHandle, ServiceOptions};

/// WWCP charging session store.
#[derive(Parser, Debug)]
#[command(
    name = "wwcp-sessions",
    version,
    about = "Crash-recoverable charging session store",
    long_about = "Replays the charging session command log, keeps the session store \
                  ready and applies the retention policy.\n\n\
                  Default config: ~/.config/wwcp-core/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "WWCP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the command log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Replay the log, start the sweeper and wait for a shutdown signal.
    Run,
    /// Replay the log, print the counters and exit.
    Replay,
    /// Replay the log, then run one retention pass.
    Sweep {
        /// Only list the sessions that would be evicted.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration and print the resolved settings.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(wwcp_core::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(ref dir) = cli.log_dir {
        config.store.log_dir = dir.clone();
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let command = cli.command.unwrap_or(Command::Run);

    // ── Config validation mode ─────────────────────────────────
    if command == Command::Check {
        println!("Configuration is valid");
        println!("   Config file     : {}", config_path.display());
        println!("   Store           : {}", config.store.name);
        println!("   Roaming network : {}", config.store.roaming_network_id);
        println!("   Log directory   : {}", config.store.log_dir.display());
        println!("   System id       : {}", config.store.system_id);
        println!(
            "   Retention       : {} days delivered, {} days otherwise",
            config.retention.successful_days, config.retention.unsuccessful_days
        );
        println!("   Log level       : {}", config.logging.level);
        return ExitCode::SUCCESS;
    }

    init_tracing(&config);
    info!("Configuration loaded from {}", config_path.display());

    match run(command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let handle = match ServiceHandle::start(ServiceOptions {
        config,
        roaming_network: None,
        start_sweeper: command == Command::Run,
    })
    .await
    {
        Ok(handle) => handle,
        Err(e) if is_log_unavailable(&e) => {
            error!("Command log storage is unavailable, refusing to start with an empty store");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    match command {
        Command::Run => {
            handle.install_signal_handler();
            info!("Press Ctrl+C to shutdown gracefully.");
            handle.shutdown_signal().wait().await;
            handle.wait().await;
        }
        Command::Replay => {
            println!("{}", serde_json::to_string_pretty(&handle.replay_report)?);
            handle.shutdown().await;
        }
        Command::Check => handle.shutdown().await,
        Command::Sweep { dry_run } => {
            let sweeper = SessionSweeper::new(handle.store.clone(), handle.config.retention.policy());
            let now = Utc::now();
            if dry_run {
                let plan = sweeper.plan(now);
                for (id, tombstone) in &plan {
                    println!("{}\t{}", tombstone, id);
                }
                println!("{} of {} sessions due", plan.len(), handle.store.len());
            } else {
                let report = sweeper.sweep(&handle.system_id, now).await?;
                println!(
                    "closed {}, removed {}, pinned {}, kept {}",
                    report.closed,
                    report.removed,
                    report.pinned,
                    report.checked - report.evicted()
                );
            }
            handle.shutdown().await;
        }
    }

    Ok(())
}
