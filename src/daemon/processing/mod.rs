//! Buffering between the poll loop and storage. Records are deduplicated in memory and written
//! in batches, either when the batch fills up or when the flush timer fires.

pub mod buffer;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::utils::clock::SharedClock;

use super::storage::activity_log::ActivityStorage;
use buffer::ActivityBuffer;

/// Forces a flush every write interval regardless of how full the batch is.
pub struct FlushTimer<S: ActivityStorage> {
    buffer: Arc<ActivityBuffer<S>>,
    interval: Duration,
    clock: SharedClock,
    shutdown: CancellationToken,
}

impl<S: ActivityStorage> FlushTimer<S> {
    pub fn new(
        buffer: Arc<ActivityBuffer<S>>,
        interval: Duration,
        clock: SharedClock,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            interval,
            clock,
            shutdown,
        }
    }

    /// Runs until shutdown. Failed flushes are retried on the next tick.
    pub async fn run(self) -> Result<()> {
        let mut flush_point = self.clock.instant();
        loop {
            flush_point += self.interval;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Flush timer stopped");
                    return Ok(())
                }
                _ = self.clock.sleep_until(flush_point) => ()
            }

            match self.buffer.flush().await {
                Ok(0) => {}
                Ok(written) => info!("Flushed {written} records"),
                Err(e) => warn!("Scheduled flush failed, retrying later {e:?}"),
            }
        }
    }
}
