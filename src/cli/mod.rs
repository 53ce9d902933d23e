pub mod daemon_path;
pub mod process;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{daemon_executables, kill_previous_servers, restart_server};
use status::{process_status_command, StatusCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::Config,
    daemon::start_daemon,
    utils::{
        dir::{create_application_default_path, AppLayout},
        logging::{enable_logging, LoggingOptions, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "windowtrail", version, long_about = None)]
#[command(about = "Records which window, document, folder or page you are working on", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Show how much was recorded for a day and the latest record")]
    Status {
        #[command(flatten)]
        command: StatusCommand,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Print the config file location, creating the defaults if needed")]
    Config {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Application layout for `dir`, or the default application directory.
pub fn resolve_layout(dir: Option<PathBuf>) -> Result<AppLayout> {
    let root = dir.map_or_else(create_application_default_path, Ok)?;
    Ok(AppLayout::new(root))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = args.log.then_some(LevelFilter::TRACE);

    match args.commands {
        Commands::Init { dir } => restart_server(dir.as_deref()),
        Commands::Stop {} => {
            let stopped = kill_previous_servers(&daemon_executables()?)?;
            println!("Stopped {stopped} daemons");
            Ok(())
        }
        Commands::Serve { dir } => {
            let layout = resolve_layout(dir)?;
            let config = Config::load_or_create(&layout.config_file())?;
            enable_logging(LoggingOptions {
                prefix: CLI_PREFIX,
                log_dir: &layout.logs(),
                log_level: logging_level,
                show_std: args.log,
                max_log_files: Some(config.settings().general.log_retention_days),
            })?;
            start_daemon(layout, config).await
        }
        Commands::Status { command } => process_status_command(command).await,
        Commands::Config { dir } => {
            let layout = resolve_layout(dir)?;
            let config = Config::load_or_create(&layout.config_file())?;
            println!("{}", config.path().display());
            Ok(())
        }
    }
}
