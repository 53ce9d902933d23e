use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::{
    daemon::{
        detection::{record::NormalizedRecord, selector::DetectorSelector},
        processing::buffer::{ActivityBuffer, AddOutcome},
        storage::activity_log::ActivityStorage,
    },
    utils::clock::SharedClock,
    window_api::WindowSystem,
};

/// Samples the foreground window once per tick and feeds the resolved record into the buffer.
pub struct PollingLoop<S: ActivityStorage> {
    windows: Arc<dyn WindowSystem>,
    selector: DetectorSelector,
    buffer: Arc<ActivityBuffer<S>>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    clock: SharedClock,
}

impl<S: ActivityStorage> PollingLoop<S> {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        selector: DetectorSelector,
        buffer: Arc<ActivityBuffer<S>>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            windows,
            selector,
            buffer,
            shutdown,
            poll_interval,
            clock,
        }
    }

    /// Only a failing foreground query is an error, everything past it is handled by the
    /// selector.
    fn tick(&mut self) -> Result<Option<NormalizedRecord>> {
        let window = self
            .windows
            .foreground_window()
            .context("Failed to query the foreground window")?;
        let record = match window {
            Some(window) => self.selector.resolve(window),
            None => {
                debug!("No foreground window");
                None
            }
        };
        self.selector.maintain();
        Ok(record)
    }

    /// Executes the poll loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.poll_interval;

            let span = info_span!("Poll tick");
            let record = match span.in_scope(|| self.tick()) {
                Ok(v) => v,
                Err(e) => {
                    error!("Stopping, foreground window is not available {e:?}");
                    self.shutdown.cancel();
                    return Err(e);
                }
            };
            match self.buffer.add(record).instrument(span).await {
                AddOutcome::Rejected => warn!("Record dropped, storage is not keeping up"),
                outcome => debug!("Buffer outcome {outcome:?}"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(poll_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::{anyhow, Result};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            detection::{
                record::{MonitorType, NormalizedRecord},
                selector::{DetectorKey, DetectorSelector, SelectorSettings},
                test_support::{snapshot, start_time, WINDOW},
                MockDetector,
            },
            processing::buffer::ActivityBuffer,
            storage::{activity_log::ActivityLog, error_log::ErrorLog},
        },
        utils::clock::{SharedClock, TestClock},
        window_api::MockWindowSystem,
    };

    use super::PollingLoop;

    fn buffer(dir: &std::path::Path, clock: SharedClock) -> Result<Arc<ActivityBuffer<ActivityLog>>> {
        Ok(Arc::new(ActivityBuffer::new(
            ActivityLog::new(dir.join("logs"), dir.join("temp"))?,
            ErrorLog::new(dir.join("logs/tracking_error.log"), clock),
            500,
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_failure_stops_everything() -> Result<()> {
        let dir = tempdir()?;
        let clock = TestClock::shared(start_time());
        let mut windows = MockWindowSystem::new();
        windows
            .expect_foreground_window()
            .times(1)
            .returning(|| Err(anyhow!("display went away")));
        let shutdown = CancellationToken::new();

        let poller = PollingLoop::new(
            Arc::new(windows),
            DetectorSelector::new(SelectorSettings::default(), clock.clone()),
            buffer(dir.path(), clock.clone())?,
            shutdown.clone(),
            Duration::from_secs(1),
            clock,
        );

        assert!(poller.run().await.is_err());
        assert!(shutdown.is_cancelled());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn each_tick_resolves_and_maintains() -> Result<()> {
        let dir = tempdir()?;
        let clock = TestClock::shared(start_time());
        let mut windows = MockWindowSystem::new();
        let mut ticks = 0;
        windows.expect_foreground_window().returning(move || {
            ticks += 1;
            // Every third tick the desktop has no foreground window.
            Ok((ticks % 3 != 0).then_some(WINDOW))
        });

        let mut general = MockDetector::new();
        general.expect_is_target().returning(|_| Ok(true));
        let mut titles = 0;
        general.expect_resolve().returning(move |_| {
            titles += 1;
            Ok(Some(NormalizedRecord::from_process(
                start_time(),
                &snapshot(5, "code"),
                format!("file {}", titles % 2),
                MonitorType::General,
            )))
        });
        general
            .expect_monitor_type()
            .returning(|| MonitorType::General);
        general.expect_maintain().times(5).returning(|| ());

        let mut selector = DetectorSelector::new(SelectorSettings::default(), clock.clone());
        selector.register(DetectorKey::General, Box::new(general));
        let buffer = buffer(dir.path(), clock.clone())?;
        let shutdown = CancellationToken::new();
        let poller = PollingLoop::new(
            Arc::new(windows),
            selector,
            buffer.clone(),
            shutdown.clone(),
            Duration::from_secs(1),
            clock,
        );

        let (result, _) = tokio::join!(poller.run(), async {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            shutdown.cancel();
        });
        result?;

        // Ticks at 0s..4s, the third one had no window and two titles alternate.
        assert_eq!(buffer.status().await.pending, 2);
        Ok(())
    }
}
