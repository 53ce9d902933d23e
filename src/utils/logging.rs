use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::{format::FmtSpan, writer::MakeWriterExt};

pub const CLI_PREFIX: &str = "cli";
pub const DAEMON_PREFIX: &str = "daemon";

const DEFAULT_MAX_LOG_FILES: usize = 5;

pub struct LoggingOptions<'a> {
    pub prefix: &'a str,
    pub log_dir: &'a Path,
    pub log_level: Option<LevelFilter>,
    pub show_std: bool,
    /// Number of daily files kept. `None` keeps the default.
    pub max_log_files: Option<usize>,
}

pub fn enable_logging(options: LoggingOptions<'_>) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(options.max_log_files.unwrap_or(DEFAULT_MAX_LOG_FILES).max(1))
        .filename_prefix(options.prefix)
        .build(options.log_dir)?;

    let show_std = options.show_std;
    let stdout = std::io::stdout.with_filter(move |_| show_std);

    let level = options
        .log_level
        .map(|v| v.to_string())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".into()));

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "{}={level}",
            env!("CARGO_PKG_NAME").replace("-", "_"),
        )))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stdout.and(appender))
        .pretty()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install subscriber {e}"))?;
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .try_init();
});
