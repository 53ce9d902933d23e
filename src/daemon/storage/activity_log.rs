use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, instrument};

use crate::{
    daemon::detection::record::NormalizedRecord,
    fs::operations::read_last_line,
    utils::time::date_to_log_name,
};

use super::csv_row;

/// Interface for abstracting durable storage of records.
pub trait ActivityStorage {
    /// Appends the records to the log of `date`. Either all rows become visible or none do.
    fn append_rows(
        &self,
        date: NaiveDate,
        records: &[NormalizedRecord],
    ) -> impl Future<Output = Result<()>>;
}

impl<T: Deref> ActivityStorage for T
where
    T::Target: ActivityStorage,
{
    fn append_rows(
        &self,
        date: NaiveDate,
        records: &[NormalizedRecord],
    ) -> impl Future<Output = Result<()>> {
        self.deref().append_rows(date, records)
    }
}

/// Day stamped CSV logs, written through a staging copy.
pub struct ActivityLog {
    log_dir: PathBuf,
    temp_dir: PathBuf,
}

impl ActivityLog {
    pub fn new(log_dir: PathBuf, temp_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&log_dir)?;
        std::fs::create_dir_all(&temp_dir)?;

        Ok(Self { log_dir, temp_dir })
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.log_dir.join(date_to_log_name(date))
    }

    /// Number of data rows in the log of `date`, 0 when there is no log.
    pub async fn row_count(&self, date: NaiveDate) -> Result<usize> {
        let file = match File::open(self.path_for(date)).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => Err(e)?,
        };
        file.lock_shared()?;
        let mut lines = BufReader::new(file).lines();
        let header = csv_row::header();
        let mut count = 0;
        while let Some(line) = lines.next_line().await? {
            if !line.is_empty() && line != header {
                count += 1;
            }
        }
        lines.into_inner().into_inner().unlock_async().await?;
        Ok(count)
    }

    /// Last data row of the log of `date`.
    pub async fn last_row(&self, date: NaiveDate) -> Result<Option<String>> {
        let mut file = match File::open(self.path_for(date)).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => Err(e)?,
        };
        file.lock_shared()?;
        let line = read_last_line(&mut file).await;
        file.unlock_async().await?;

        let line = line?;
        Ok((!line.is_empty() && line != csv_row::header()).then_some(line))
    }

    async fn write_staged(staging: &Path, is_new: bool, records: &[NormalizedRecord]) -> Result<()> {
        let mut file = File::options()
            .create(true)
            .append(!is_new)
            .write(true)
            .truncate(is_new)
            .open(staging)
            .await?;

        let mut buffer = String::new();
        if is_new {
            buffer.push_str(&csv_row::header());
            buffer.push('\n');
        }
        for record in records {
            buffer.push_str(&csv_row::encode(record));
            buffer.push('\n');
        }

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = async {
            file.write_all(buffer.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        file.unlock_async().await?;
        Ok(result?)
    }
}

impl ActivityStorage for ActivityLog {
    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn append_rows(&self, date: NaiveDate, records: &[NormalizedRecord]) -> Result<()> {
        let file_name = date_to_log_name(date);
        let destination = self.log_dir.join(&file_name);
        let staging = self.temp_dir.join(format!("temp_{file_name}"));

        let existing_len = match tokio::fs::metadata(&destination).await {
            Ok(v) => v.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => Err(e).with_context(|| format!("Failed to inspect {destination:?}"))?,
        };
        let is_new = existing_len == 0;
        if !is_new {
            tokio::fs::copy(&destination, &staging)
                .await
                .with_context(|| format!("Failed to stage {destination:?}"))?;
        }

        Self::write_staged(&staging, is_new, records)
            .await
            .with_context(|| format!("Failed to write {staging:?}"))?;
        tokio::fs::rename(&staging, &destination)
            .await
            .with_context(|| format!("Failed to replace {destination:?}"))?;
        debug!("Wrote {} rows into {destination:?}", records.len());
        Ok(())
    }
}
