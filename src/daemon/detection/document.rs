use std::{sync::Arc, time::Duration};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::{
    automation::{AutomationBackend, AutomationSession},
    process_api::ProcessSnapshot,
    window_api::WindowHandle,
};

use super::{
    cache::BoundedCache,
    paths::{common_document_dirs, has_extension, path_to_string, probe},
    record::{MonitorType, NormalizedRecord},
    DetectionContext, Detector, LastTitle,
};

/// Cache shared by all document detectors, keyed by window.
pub type DocumentCache = BoundedCache<WindowHandle, NormalizedRecord>;

/// Everything that differs between the supported office applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentAppProfile {
    /// Value of `app_subtype`, e.g. `Word`.
    pub subtype: &'static str,
    pub process_name: &'static str,
    pub automation_id: &'static str,
    /// Application property holding the active document.
    pub active_property: &'static str,
    pub extensions: &'static [&'static str],
}

impl DocumentAppProfile {
    pub const WORD: DocumentAppProfile = DocumentAppProfile {
        subtype: "Word",
        process_name: "winword.exe",
        automation_id: "Word.Application",
        active_property: "ActiveDocument",
        extensions: &[".docx", ".doc", ".docm", ".rtf"],
    };

    pub const EXCEL: DocumentAppProfile = DocumentAppProfile {
        subtype: "Excel",
        process_name: "excel.exe",
        automation_id: "Excel.Application",
        active_property: "ActiveWorkbook",
        extensions: &[".xlsx", ".xls", ".xlsm", ".xlsb", ".csv"],
    };

    pub const POWERPOINT: DocumentAppProfile = DocumentAppProfile {
        subtype: "PowerPoint",
        process_name: "powerpnt.exe",
        automation_id: "PowerPoint.Application",
        active_property: "ActivePresentation",
        extensions: &[".pptx", ".ppt", ".pptm"],
    };

    pub fn new_document_marker(&self) -> String {
        format!("<new document> - {}", self.subtype)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentSettings {
    /// Automation sessions unused for this long are released.
    pub idle_timeout: Duration,
    /// Minimal delay between two connection attempts.
    pub retry_interval: Duration,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct AutomationHandle {
    session: Option<Box<dyn AutomationSession>>,
    last_access: Option<Instant>,
    last_attempt: Option<Instant>,
}

/// Unsaved documents report a bare name such as `Document1` instead of a path.
fn is_document_path(path: &str) -> bool {
    path.contains(['\\', '/'])
}

/// Detector for one office application. Word, Excel and PowerPoint are the same detector with a
/// different [DocumentAppProfile].
pub struct DocumentAppDetector {
    profile: DocumentAppProfile,
    context: DetectionContext,
    automation: Arc<dyn AutomationBackend>,
    cache: Arc<DocumentCache>,
    settings: DocumentSettings,
    handle: Mutex<AutomationHandle>,
    last_title: LastTitle,
}

impl DocumentAppDetector {
    pub fn new(
        profile: DocumentAppProfile,
        context: DetectionContext,
        automation: Arc<dyn AutomationBackend>,
        cache: Arc<DocumentCache>,
        settings: DocumentSettings,
    ) -> Self {
        Self {
            profile,
            context,
            automation,
            cache,
            settings,
            handle: Mutex::new(AutomationHandle::default()),
            last_title: LastTitle::default(),
        }
    }

    fn teardown(&self, handle: &mut AutomationHandle) {
        if handle.session.take().is_some() {
            info!("Released automation session for {}", self.profile.automation_id);
            self.cache.clear();
        }
    }

    /// Path reported by the application itself. Connection attempts are throttled by the retry
    /// interval, a failing session is dropped and reconnected later.
    fn query_automation(&self) -> Option<String> {
        let mut handle = self.handle.lock();
        let now = self.context.clock.instant();

        if handle.session.is_none() {
            if let Some(last_attempt) = handle.last_attempt {
                if now.saturating_duration_since(last_attempt) < self.settings.retry_interval {
                    debug!("Skipping reconnect to {}", self.profile.automation_id);
                    return None;
                }
            }
            handle.last_attempt = Some(now);
            match self.automation.connect(self.profile.automation_id) {
                Ok(session) => {
                    info!("Connected to {}", self.profile.automation_id);
                    handle.session = Some(session);
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {e:?}", self.profile.automation_id);
                    return None;
                }
            }
        }

        handle.last_access = Some(now);
        let session = handle.session.as_ref()?;
        match session.active_document_path(self.profile.active_property) {
            Ok(Some(path)) if is_document_path(&path) => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!("{} query failed: {e:?}", self.profile.automation_id);
                self.teardown(&mut handle);
                None
            }
        }
    }

    /// Guesses the document from a `<name> - <app>` title, the process' open files and its
    /// working directory.
    fn infer_path(&self, process: &ProcessSnapshot, title: &str) -> Option<String> {
        let extensions = self.profile.extensions;
        if let Some((name, _)) = title.rsplit_once(" - ") {
            let name = name.trim();
            let mut dirs = common_document_dirs();
            if let Some(cwd) = process.meaningful_cwd() {
                dirs.push(cwd.to_path_buf());
            }
            let found = if has_extension(name, extensions) {
                probe(&dirs, [name])
            } else {
                let candidates = extensions
                    .iter()
                    .map(|ext| format!("{name}{ext}"))
                    .collect::<Vec<_>>();
                probe(&dirs, candidates.iter().map(String::as_str))
            };
            if let Some(found) = found {
                return Some(path_to_string(&found));
            }
        }

        match self.context.processes.open_files(process.pid) {
            Ok(files) => files
                .into_iter()
                .map(|v| path_to_string(&v))
                .find(|v| has_extension(v, extensions)),
            Err(e) => {
                debug!("Failed to list open files of {}: {e:?}", process.pid);
                None
            }
        }
    }

    fn document_record(&self, process: &ProcessSnapshot, title: &str) -> NormalizedRecord {
        let record = NormalizedRecord::from_process(
            self.context.clock.time(),
            process,
            title,
            MonitorType::Document,
        )
        .with_subtype(self.profile.subtype);

        if let Some(path) = self.query_automation() {
            return record.with_working_directory(path);
        }
        if let Some(path) = self.infer_path(process, title) {
            debug!("Inferred {} document {path}", self.profile.subtype);
            return record.with_working_directory(path);
        }
        record
            .with_new_document(true)
            .with_working_directory(self.profile.new_document_marker())
    }
}

impl Detector for DocumentAppDetector {
    fn monitor_type(&self) -> MonitorType {
        MonitorType::Document
    }

    #[instrument(skip(self), fields(app = self.profile.subtype))]
    fn is_target(&self, window: WindowHandle) -> Result<bool> {
        let pid = self.context.windows.process_id(window)?;
        match self.context.processes.snapshot(pid) {
            Ok(process) => Ok(process.has_name(self.profile.process_name)),
            Err(e) => {
                debug!("Process check failed for {pid}: {e:?}");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self), fields(app = self.profile.subtype))]
    fn resolve(&self, window: WindowHandle) -> Result<Option<NormalizedRecord>> {
        let title = self.context.windows.title(window)?;
        if self.last_title.is_repeat(&title) {
            return Ok(None);
        }

        if let Some(cached) = self
            .cache
            .get(&window)
            .filter(|v| v.window_title == title && v.app_subtype.as_deref() == Some(self.profile.subtype))
        {
            self.last_title.remember(&title);
            return Ok(Some(cached.with_timestamp(self.context.clock.time())));
        }

        let pid = self.context.windows.process_id(window)?;
        let process = self.context.processes.snapshot(pid)?;
        let record = self.document_record(&process, &title);

        self.cache.set(window, record.clone());
        self.last_title.remember(&title);
        Ok(Some(record))
    }

    fn maintain(&self) {
        let now = self.context.clock.instant();
        {
            let mut handle = self.handle.lock();
            let idle = handle
                .last_access
                .is_some_and(|v| now.saturating_duration_since(v) > self.settings.idle_timeout);
            if handle.session.is_some() && idle {
                self.teardown(&mut handle);
            }
        }
        self.cache.cleanup();
    }
}
