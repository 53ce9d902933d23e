use std::{collections::HashSet, num::NonZeroUsize};

use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::{process_api::ProcessSnapshot, window_api::WindowHandle};

use super::{
    browser::is_browser_process,
    file_browser::{is_explorer_like, FILE_BROWSER_CLASSES},
    paths::path_to_string,
    record::{MonitorType, NormalizedRecord},
    DetectionContext, Detector, LastTitle,
};

const PROCESS_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(v) => v,
    None => unreachable!(),
};

/// Catch-all detector. Only fills in process information, the working directory is the
/// working directory of the process.
pub struct GeneralDetector {
    context: DetectionContext,
    excluded_processes: HashSet<String>,
    processes: Mutex<LruCache<u32, ProcessSnapshot>>,
    last_title: LastTitle,
}

impl GeneralDetector {
    pub fn new(
        context: DetectionContext,
        excluded_processes: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            context,
            excluded_processes: excluded_processes
                .into_iter()
                .map(|v| v.as_ref().trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect(),
            processes: Mutex::new(LruCache::new(PROCESS_CACHE_SIZE)),
            last_title: LastTitle::default(),
        }
    }

    fn is_excluded(&self, process_name: &str) -> bool {
        self.excluded_processes
            .contains(&process_name.to_lowercase())
    }

    /// Snapshots are cached per pid, a process keeps its executable for its whole life.
    fn process(&self, pid: u32) -> Result<ProcessSnapshot> {
        if let Some(process) = self.processes.lock().get(&pid) {
            return Ok(process.clone());
        }
        let process = self.context.processes.snapshot(pid)?;
        self.processes.lock().put(pid, process.clone());
        Ok(process)
    }
}

impl Detector for GeneralDetector {
    fn monitor_type(&self) -> MonitorType {
        MonitorType::General
    }

    #[instrument(skip(self))]
    fn is_target(&self, window: WindowHandle) -> Result<bool> {
        let class = self.context.windows.class_name(window)?;
        if class.is_empty() || FILE_BROWSER_CLASSES.contains(&class.as_str()) {
            return Ok(false);
        }

        let pid = self.context.windows.process_id(window)?;
        let process = match self.process(pid) {
            Ok(v) => v,
            Err(e) => {
                debug!("Process check failed for {pid}: {e:?}");
                return Ok(true);
            }
        };
        let title = self.context.windows.title(window)?;
        Ok(!is_explorer_like(&process.name, &title)
            && !self.is_excluded(&process.name)
            && !is_browser_process(&process.name))
    }

    #[instrument(skip(self))]
    fn resolve(&self, window: WindowHandle) -> Result<Option<NormalizedRecord>> {
        let title = self.context.windows.title(window)?;
        if self.last_title.is_repeat(&title) {
            return Ok(None);
        }

        let pid = self.context.windows.process_id(window)?;
        let process = self.process(pid)?;
        if self.is_excluded(&process.name) {
            debug!("Skipping excluded process {}", process.name);
            return Ok(None);
        }

        let record = NormalizedRecord::from_process(
            self.context.clock.time(),
            &process,
            title.as_str(),
            MonitorType::General,
        )
        .with_working_directory(process.cwd.as_deref().map(path_to_string).unwrap_or_default());

        self.last_title.remember(&title);
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::{
        daemon::detection::{
            record::MonitorType,
            test_support::{context, inspector, snapshot, title, window_system, WINDOW},
            Detector,
        },
        process_api::{MockProcessInspector, ProcessSnapshot},
    };

    use super::GeneralDetector;

    fn excluded() -> Vec<&'static str> {
        vec!["explorer.exe", "SystemSettings.exe"]
    }

    #[test]
    fn records_process_and_cwd() {
        let process = ProcessSnapshot {
            cwd: Some(PathBuf::from("/home/user/project")),
            ..snapshot(3, "code")
        };
        let current = title("main.rs - project");
        let detector = GeneralDetector::new(
            context(window_system("Code", 3, current.clone()), inspector(process)),
            excluded(),
        );
        assert!(detector.is_target(WINDOW).unwrap());

        let record = detector.resolve(WINDOW).unwrap().unwrap();
        assert_eq!(record.monitor_type, MonitorType::General);
        assert_eq!(record.process_name, "code");
        assert_eq!(record.application_path, "/apps/code");
        assert_eq!(record.working_directory, "/home/user/project");
        assert_eq!(record.app_subtype, None);

        assert!(detector.resolve(WINDOW).unwrap().is_none());
        *current.lock() = "lib.rs - project".into();
        assert!(detector.resolve(WINDOW).unwrap().is_some());
    }

    #[test]
    fn excluded_processes_produce_nothing() {
        let detector = GeneralDetector::new(
            context(
                window_system("ApplicationFrameWindow", 3, title("Settings")),
                inspector(snapshot(3, "systemsettings.EXE")),
            ),
            excluded(),
        );
        assert!(!detector.is_target(WINDOW).unwrap());
        assert!(detector.resolve(WINDOW).unwrap().is_none());
    }

    #[test]
    fn leaves_file_browsers_and_browsers_to_their_detectors() {
        let detector = GeneralDetector::new(
            context(
                window_system("CabinetWClass", 3, title("Documents")),
                inspector(snapshot(3, "explorer.exe")),
            ),
            Vec::<String>::new(),
        );
        assert!(!detector.is_target(WINDOW).unwrap());

        let detector = GeneralDetector::new(
            context(
                window_system("Chrome_WidgetWin_1", 3, title("Docs - Google Chrome")),
                inspector(snapshot(3, "chrome.exe")),
            ),
            Vec::<String>::new(),
        );
        assert!(!detector.is_target(WINDOW).unwrap());

        let detector = GeneralDetector::new(
            context(window_system("", 3, title("")), inspector(snapshot(3, "x"))),
            Vec::<String>::new(),
        );
        assert!(!detector.is_target(WINDOW).unwrap());
    }

    #[test]
    fn snapshots_are_cached_per_pid() {
        let mut processes = MockProcessInspector::new();
        processes
            .expect_snapshot()
            .times(1)
            .returning(|pid| Ok(snapshot(pid, "notepad.exe")));
        let current = title("a.txt - Notepad");
        let detector = GeneralDetector::new(
            context(window_system("Notepad", 3, current.clone()), processes),
            excluded(),
        );

        assert!(detector.is_target(WINDOW).unwrap());
        assert!(detector.resolve(WINDOW).unwrap().is_some());
        *current.lock() = "b.txt - Notepad".into();
        assert!(detector.resolve(WINDOW).unwrap().is_some());
    }

    #[test]
    fn unknown_process_is_still_a_target() {
        let mut processes = MockProcessInspector::new();
        processes
            .expect_snapshot()
            .returning(|pid| Err(anyhow::anyhow!("{pid} is gone")));
        let detector = GeneralDetector::new(
            context(window_system("Notepad", 3, title("x")), processes),
            excluded(),
        );
        assert!(detector.is_target(WINDOW).unwrap());
        assert!(detector.resolve(WINDOW).is_err());
    }
}
