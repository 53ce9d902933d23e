use std::{path::Path, sync::Arc};

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::{
    automation::AutomationBackend, process_api::ProcessSnapshot, window_api::WindowHandle,
};

use super::{
    paths::{path_to_string, special_folders},
    record::{MonitorType, NormalizedRecord},
    DetectionContext, Detector, LastTitle,
};

/// Window classes of file browser windows. The General detector excludes the same set.
pub const FILE_BROWSER_CLASSES: &[&str] = &[
    "CabinetWClass",
    "ExploreWClass",
    "WorkerW",
    "Progman",
    "ShellTabWindowClass",
    "org.gnome.Nautilus",
    "Nautilus",
    "dolphin",
    "Thunar",
    "Nemo",
];

pub const EXPLORER_PROCESS: &str = "explorer.exe";

// Longest first so that " - File Explorer" isn't cut as " - Explorer".
const EXPLORER_TITLE_SUFFIXES: &[&str] = &[" - File Explorer", " - エクスプローラー", " - Explorer"];

const SENTINEL_PREFIX: &str = "explorer://";

/// Title of an explorer.exe window that shows a folder, as opposed to the taskbar or dialogs.
pub fn is_explorer_like(process_name: &str, title: &str) -> bool {
    process_name.eq_ignore_ascii_case(EXPLORER_PROCESS)
        && (EXPLORER_TITLE_SUFFIXES.iter().any(|v| title.contains(v))
            || title.contains(":\\")
            || title.contains('/'))
}

fn strip_explorer_suffix(title: &str) -> &str {
    EXPLORER_TITLE_SUFFIXES
        .iter()
        .find_map(|suffix| title.strip_suffix(suffix))
        .unwrap_or(title)
}

fn sentinel(title: &str) -> String {
    if title.is_empty() {
        format!("{SENTINEL_PREFIX}unknown")
    } else {
        format!("{SENTINEL_PREFIX}{title}")
    }
}

/// Detects file browser windows and resolves the folder they display.
pub struct FileBrowserDetector {
    context: DetectionContext,
    automation: Arc<dyn AutomationBackend>,
    last_title: LastTitle,
}

impl FileBrowserDetector {
    pub fn new(context: DetectionContext, automation: Arc<dyn AutomationBackend>) -> Self {
        Self {
            context,
            automation,
            last_title: LastTitle::default(),
        }
    }

    fn resolve_folder(
        &self,
        window: WindowHandle,
        title: &str,
        process: Option<&ProcessSnapshot>,
    ) -> String {
        match self.automation.shell_folder(window) {
            Ok(Some(folder)) if !folder.is_empty() => return folder,
            Ok(_) => debug!("Shell reported no folder for {window}"),
            Err(e) => debug!("Shell folder lookup failed for {window}: {e:?}"),
        }
        let folder = folder_from_title(title, process);
        debug!("Using title based folder detection: {folder}");
        folder
    }

    fn record(
        &self,
        window: WindowHandle,
        title: &str,
        process: Option<&ProcessSnapshot>,
        pid: u32,
    ) -> NormalizedRecord {
        let working_directory = self.resolve_folder(window, title, process);
        base_record(&self.context, process, pid, title).with_working_directory(working_directory)
    }
}

fn base_record(
    context: &DetectionContext,
    process: Option<&ProcessSnapshot>,
    pid: u32,
    title: &str,
) -> NormalizedRecord {
    let fallback = ProcessSnapshot {
        pid,
        name: EXPLORER_PROCESS.into(),
        exe: std::env::var_os("WINDIR").map(|v| Path::new(&v).join(EXPLORER_PROCESS)),
        ..Default::default()
    };
    NormalizedRecord::from_process(
        context.clock.time(),
        process.unwrap_or(&fallback),
        title,
        MonitorType::FileBrowser,
    )
}

/// Folder guessed from the title, special folder names and the process working directory. Never
/// fails, the last resort is a sentinel carrying the raw title.
pub fn folder_from_title(window_title: &str, process: Option<&ProcessSnapshot>) -> String {
    let title = strip_explorer_suffix(window_title);
    if !title.is_empty() && Path::new(title).is_dir() {
        return title.to_string();
    }

    let folders = special_folders();
    if let Some((_, path)) = folders
        .iter()
        .find(|(label, _)| *label == title || title.contains(&format!("{label} ")))
    {
        return path_to_string(path);
    }

    let common = [dirs::home_dir(), dirs::desktop_dir(), dirs::document_dir(), dirs::download_dir()];
    for location in common.iter().flatten() {
        let full = path_to_string(location);
        let base = location
            .file_name()
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_default();
        if window_title.contains(&full) || (!base.is_empty() && window_title.contains(&base)) {
            return full;
        }
    }

    if let Some(cwd) = process.and_then(ProcessSnapshot::meaningful_cwd) {
        return path_to_string(cwd);
    }

    sentinel(window_title)
}

impl Detector for FileBrowserDetector {
    fn monitor_type(&self) -> MonitorType {
        MonitorType::FileBrowser
    }

    #[instrument(skip(self))]
    fn is_target(&self, window: WindowHandle) -> Result<bool> {
        let class = self.context.windows.class_name(window)?;
        if FILE_BROWSER_CLASSES.contains(&class.as_str()) {
            return Ok(true);
        }

        let pid = self.context.windows.process_id(window)?;
        match self.context.processes.snapshot(pid) {
            Ok(process) => {
                let title = self.context.windows.title(window)?;
                Ok(is_explorer_like(&process.name, &title))
            }
            Err(e) => {
                debug!("Process check failed for {pid}: {e:?}");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    fn resolve(&self, window: WindowHandle) -> Result<Option<NormalizedRecord>> {
        let title = self.context.windows.title(window)?;
        if self.last_title.is_repeat(&title) {
            return Ok(None);
        }

        let record = match self.context.windows.process_id(window) {
            Ok(pid) => {
                let process = self.context.processes.snapshot(pid).ok();
                self.record(window, &title, process.as_ref(), pid)
            }
            Err(e) => {
                warn!("Failed to resolve file browser window {window}: {e:?}");
                base_record(&self.context, None, 0, &title)
                    .with_working_directory(format!("{SENTINEL_PREFIX}error-recovery"))
            }
        };

        self.last_title.remember(&title);
        Ok(Some(record))
    }
}
