use std::path::PathBuf;

use anyhow::Result;
use tokio::io::AsyncWriteExt;

use crate::utils::{clock::SharedClock, time::format_timestamp};

pub const ERROR_LOG_NAME: &str = "tracking_error.log";

/// Append only log of persistence failures, one `<timestamp>: <message>` line each.
pub struct ErrorLog {
    path: PathBuf,
    clock: SharedClock,
}

impl ErrorLog {
    pub fn new(path: PathBuf, clock: SharedClock) -> Self {
        Self { path, clock }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub async fn append(&self, message: &str) -> Result<()> {
        let line = format!(
            "{}: {}\n",
            format_timestamp(self.clock.time()),
            message.replace(['\r', '\n'], " ")
        );
        let mut file = tokio::fs::File::options()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::utils::clock::TestClock;

    use super::{ErrorLog, ERROR_LOG_NAME};

    #[tokio::test(start_paused = true)]
    async fn appends_timestamped_lines() -> Result<()> {
        let dir = tempdir()?;
        let log = ErrorLog::new(
            dir.path().join(ERROR_LOG_NAME),
            TestClock::shared(Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap()),
        );

        log.append("disk full").await?;
        log.append("permission\ndenied").await?;

        let content = std::fs::read_to_string(log.path())?;
        assert_eq!(
            content,
            "2024-05-06 09:30:00: disk full\n2024-05-06 09:30:00: permission denied\n"
        );
        Ok(())
    }
}
