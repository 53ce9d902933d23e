use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use crate::daemon::{
    detection::record::{Fingerprint, NormalizedRecord},
    storage::{activity_log::ActivityStorage, error_log::ErrorLog},
};

#[derive(Default)]
struct Batch {
    records: Vec<NormalizedRecord>,
    seen: HashSet<Fingerprint>,
    last_record: Option<NormalizedRecord>,
}

impl Batch {
    fn refresh_seen(&mut self) {
        self.seen = self.records.iter().map(NormalizedRecord::fingerprint).collect();
    }
}

/// What happened to a record passed to [ActivityBuffer::add].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Nothing was passed in.
    Ignored,
    /// Same process and title is already waiting in the batch.
    Duplicate,
    Buffered,
    /// The record filled the batch past the flush threshold and the batch was written.
    Flushed(usize),
    /// The batch is full because earlier flushes failed.
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferStatus {
    pub pending: usize,
    pub capacity: usize,
    pub last_record: Option<NormalizedRecord>,
}

/// In-memory batch of records waiting to be written.
///
/// All mutations go through one lock, so an add never interleaves with a flush in progress.
/// Records only leave the batch once storage confirmed them.
pub struct ActivityBuffer<S: ActivityStorage> {
    batch: Mutex<Batch>,
    storage: S,
    error_log: ErrorLog,
    capacity: usize,
    flush_threshold: usize,
}

impl<S: ActivityStorage> ActivityBuffer<S> {
    pub fn new(storage: S, error_log: ErrorLog, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            batch: Mutex::new(Batch::default()),
            storage,
            error_log,
            capacity,
            // 80% of the capacity, rounded up.
            flush_threshold: (capacity * 4).div_ceil(5).max(1),
        }
    }

    pub async fn add(&self, record: Option<NormalizedRecord>) -> AddOutcome {
        let Some(record) = record else {
            return AddOutcome::Ignored;
        };

        let mut batch = self.batch.lock().await;
        let fingerprint = record.fingerprint();
        if batch.seen.contains(&fingerprint) {
            debug!("Dropping duplicate of {:?}", record.window_title);
            return AddOutcome::Duplicate;
        }
        if batch.records.len() >= self.capacity && self.flush_batch(&mut batch).await.is_err() {
            warn!(
                "Buffer is full with {} unwritten records, rejecting {:?}",
                batch.records.len(),
                record.window_title
            );
            return AddOutcome::Rejected;
        }

        batch.seen.insert(fingerprint);
        batch.last_record = Some(record.clone());
        batch.records.push(record);

        if batch.records.len() < self.flush_threshold {
            return AddOutcome::Buffered;
        }
        match self.flush_batch(&mut batch).await {
            Ok(written) => AddOutcome::Flushed(written),
            Err(_) => AddOutcome::Buffered,
        }
    }

    /// Writes the whole batch. Returns the number of records written.
    pub async fn flush(&self) -> Result<usize> {
        let mut batch = self.batch.lock().await;
        self.flush_batch(&mut batch).await
    }

    pub async fn status(&self) -> BufferStatus {
        let batch = self.batch.lock().await;
        BufferStatus {
            pending: batch.records.len(),
            capacity: self.capacity,
            last_record: batch.last_record.clone(),
        }
    }

    #[instrument(skip_all, fields(pending = batch.records.len()))]
    async fn flush_batch(&self, batch: &mut Batch) -> Result<usize> {
        if batch.records.is_empty() {
            return Ok(0);
        }

        let days: BTreeSet<NaiveDate> = batch
            .records
            .iter()
            .map(|v| v.timestamp.date_naive())
            .collect();

        let mut written = 0;
        for day in days {
            let rows: Vec<NormalizedRecord> = batch
                .records
                .iter()
                .filter(|v| v.timestamp.date_naive() == day)
                .cloned()
                .collect();

            if let Err(e) = self.storage.append_rows(day, &rows).await {
                error!("Failed to flush {} records of {day} {e:?}", rows.len());
                if let Err(log_error) = self
                    .error_log
                    .append(&format!("Failed to flush records of {day}: {e:#}"))
                    .await
                {
                    error!("Failed to write error log {log_error:?}");
                }
                batch.refresh_seen();
                return Err(e);
            }

            written += rows.len();
            batch.records.retain(|v| v.timestamp.date_naive() != day);
        }

        batch.seen.clear();
        debug!("Flushed {written} records");
        Ok(written)
    }
}
