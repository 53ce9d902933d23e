use std::{sync::Arc, time::Duration};

use anyhow::Result;
use collection::poller::PollingLoop;
use detection::{
    browser::BrowserDetector,
    document::{DocumentAppDetector, DocumentAppProfile, DocumentCache, DocumentSettings},
    file_browser::FileBrowserDetector,
    general::GeneralDetector,
    pdf::PdfDetector,
    selector::{DetectorKey, DetectorSelector, SelectorSettings},
    DetectionContext,
};
use processing::{buffer::ActivityBuffer, FlushTimer};
use storage::{
    activity_log::ActivityLog,
    error_log::{ErrorLog, ERROR_LOG_NAME},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    automation::{AutomationBackend, GenericAutomation},
    config::{Config, Settings},
    process_api::{ProcessInspector, SysinfoInspector},
    utils::{
        clock::{DefaultClock, SharedClock},
        dir::AppLayout,
    },
    window_api::{GenericWindowSystem, WindowSystem},
};

pub mod args;
pub mod collection;
pub mod detection;
pub mod processing;
pub mod shutdown;
pub mod storage;

/// OS facing services the daemon runs on.
#[derive(Clone)]
pub struct Platform {
    pub windows: Arc<dyn WindowSystem>,
    pub processes: Arc<dyn ProcessInspector>,
    pub automation: Arc<dyn AutomationBackend>,
    pub clock: SharedClock,
}

impl Platform {
    pub fn native() -> Result<Self> {
        Ok(Self {
            windows: Arc::new(GenericWindowSystem::new()?),
            processes: Arc::new(SysinfoInspector::new()),
            automation: Arc::new(GenericAutomation::new()),
            clock: DefaultClock::shared(),
        })
    }
}

/// Represents the starting point for the daemon
pub async fn start_daemon(layout: AppLayout, config: Config) -> Result<()> {
    info!("Starting daemon in {:?} with {:?}", layout.root, config.path());
    run_daemon(
        &layout,
        config.settings(),
        Platform::native()?,
        CancellationToken::new(),
    )
    .await
}

async fn run_daemon(
    layout: &AppLayout,
    settings: &Settings,
    platform: Platform,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let buffer = Arc::new(create_buffer(layout, settings, platform.clock.clone())?);
    let poller = PollingLoop::new(
        platform.windows.clone(),
        create_selector(settings, &platform),
        buffer.clone(),
        shutdown_token.clone(),
        settings.general.poll_interval(),
        platform.clock.clone(),
    );
    let timer = FlushTimer::new(
        buffer.clone(),
        settings.general.write_interval(),
        platform.clock.clone(),
        shutdown_token.clone(),
    );

    let (_, poll_result, timer_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        poller.run(),
        timer.run(),
    );

    if let Err(timer_result) = timer_result {
        error!("Flush timer got an error {:?}", timer_result);
    }

    match buffer.flush().await {
        Ok(written) => info!("Final flush wrote {written} records"),
        Err(e) => error!(
            "Final flush failed, {} records are lost {e:?}",
            buffer.status().await.pending
        ),
    }

    poll_result
}

fn create_buffer(
    layout: &AppLayout,
    settings: &Settings,
    clock: SharedClock,
) -> Result<ActivityBuffer<ActivityLog>> {
    let log = ActivityLog::new(layout.logs(), layout.temp())?;
    let error_log = ErrorLog::new(layout.logs().join(ERROR_LOG_NAME), clock);
    Ok(ActivityBuffer::new(
        log,
        error_log,
        settings.general.buffer_size,
    ))
}

/// Registers every detector. The registration order doesn't matter, the selector orders them.
fn create_selector(settings: &Settings, platform: &Platform) -> DetectorSelector {
    let context = DetectionContext {
        windows: platform.windows.clone(),
        processes: platform.processes.clone(),
        clock: platform.clock.clone(),
    };
    let office = &settings.office;
    let cache = Arc::new(DocumentCache::new(
        office.cache_capacity,
        Duration::from_secs(office.office_cache_timeout),
        platform.clock.clone(),
    ));
    let document_settings = DocumentSettings {
        idle_timeout: Duration::from_secs(office.office_com_timeout),
        retry_interval: Duration::from_secs(office.office_retry_interval),
    };

    let mut selector = DetectorSelector::new(
        SelectorSettings {
            error_threshold: settings.selector.error_threshold,
            error_reset_interval: Duration::from_secs(settings.selector.error_reset_interval),
        },
        platform.clock.clone(),
    );
    selector.register(
        DetectorKey::General,
        Box::new(GeneralDetector::new(
            context.clone(),
            settings.general.excluded_processes(),
        )),
    );
    selector.register(
        DetectorKey::FileBrowser,
        Box::new(FileBrowserDetector::new(
            context.clone(),
            platform.automation.clone(),
        )),
    );
    for (key, profile) in [
        (DetectorKey::Word, DocumentAppProfile::WORD),
        (DetectorKey::Excel, DocumentAppProfile::EXCEL),
        (DetectorKey::PowerPoint, DocumentAppProfile::POWERPOINT),
    ] {
        selector.register(
            key,
            Box::new(DocumentAppDetector::new(
                profile,
                context.clone(),
                platform.automation.clone(),
                cache.clone(),
                document_settings,
            )),
        );
    }
    selector.register(DetectorKey::Browser, Box::new(BrowserDetector::new(context.clone())));
    selector.register(DetectorKey::Pdf, Box::new(PdfDetector::new(context)));
    selector
}

#[cfg(test)]
mod daemon_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        automation::MockAutomationBackend,
        config::Settings,
        daemon::{
            create_selector, run_daemon,
            detection::{
                record::MonitorType,
                selector::DetectorKey,
                test_support::{snapshot, start_time, WINDOW},
            },
            storage::activity_log::ActivityLog,
            Platform,
        },
        process_api::MockProcessInspector,
        utils::{clock::TestClock, dir::AppLayout, logging::TEST_LOGGING},
        window_api::MockWindowSystem,
    };

    /// One window whose title changes on every poll. `class` and `process` decide which
    /// detector owns it.
    fn platform(class: &'static str, process: &'static str) -> Platform {
        let tick = Arc::new(Mutex::new(0usize));
        let mut windows = MockWindowSystem::new();
        let counter = tick.clone();
        windows.expect_foreground_window().returning(move || {
            *counter.lock() += 1;
            Ok(Some(WINDOW))
        });
        windows
            .expect_class_name()
            .returning(move |_| Ok(class.to_string()));
        windows.expect_process_id().returning(|_| Ok(11));
        windows
            .expect_title()
            .returning(move |_| Ok(format!("doc {}.txt - Editor", tick.lock())));

        let mut processes = MockProcessInspector::new();
        processes
            .expect_snapshot()
            .returning(move |pid| Ok(snapshot(pid, process)));
        processes.expect_open_files().returning(|_| Ok(vec![]));

        let mut automation = MockAutomationBackend::new();
        automation
            .expect_connect()
            .returning(|id| Err(anyhow!("{id} is not running")));
        automation
            .expect_shell_folder()
            .returning(|_| Err(anyhow!("shell is not available")));

        Platform {
            windows: Arc::new(windows),
            processes: Arc::new(processes),
            automation: Arc::new(automation),
            clock: TestClock::shared(start_time()),
        }
    }

    #[tokio::test]
    async fn selector_holds_every_detector_in_priority_order() {
        let selector = create_selector(&Settings::default(), &platform("Notepad", "notepad.exe"));
        assert_eq!(selector.keys(), DetectorKey::PRIORITY.to_vec());
    }

    #[tokio::test]
    async fn document_windows_degrade_without_automation() {
        let mut selector =
            create_selector(&Settings::default(), &platform("OpusApp", "WINWORD.EXE"));
        let record = selector.resolve(WINDOW).unwrap();
        assert_eq!(record.monitor_type, MonitorType::Document);
        assert_eq!(record.app_subtype.as_deref(), Some("Word"));
    }

    /// Very simple smoke test wiring the real pipeline against mocked platform services.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let layout = AppLayout::new(dir.path().to_path_buf());
        let settings = Settings::default();
        let shutdown_token = CancellationToken::new();

        let (result, _) = tokio::join!(
            run_daemon(
                &layout,
                &settings,
                platform("Notepad", "notepad.exe"),
                shutdown_token.clone(),
            ),
            async {
                tokio::time::sleep(Duration::from_millis(5500)).await;
                shutdown_token.cancel()
            },
        );
        result?;

        let log = ActivityLog::new(layout.logs(), layout.temp())?;
        let date = start_time().date_naive();
        assert_eq!(log.row_count(date).await?, 6);
        let last = log.last_row(date).await?.unwrap();
        assert!(last.contains("doc 6.txt - Editor"), "{last}");
        assert!(last.contains(",general,"));
        Ok(())
    }
}
