//! Application automation backends. Office applications and the shell expose their state
//! (active document, folder shown by a file browser window) through an automation interface
//! which is COM on Windows. Other platforms have no equivalent, so [GenericAutomation] reports
//! the backend as unavailable and detectors fall back to heuristics.

#[cfg(feature = "win")]
pub mod com;

use anyhow::Result;

use crate::window_api::WindowHandle;

/// Connection to a single running application.
#[cfg_attr(test, mockall::automock)]
pub trait AutomationSession: Send {
    /// Reads `FullName` of the object exposed through `property`, e.g. `ActiveDocument` for Word
    /// or `ActiveWorkbook` for Excel. `None` when the application has nothing open.
    fn active_document_path(&self, property: &str) -> Result<Option<String>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait AutomationBackend: Send + Sync {
    /// Attaches to a running application by its automation id, e.g. `Word.Application`.
    fn connect(&self, automation_id: &str) -> Result<Box<dyn AutomationSession>>;

    /// Folder currently displayed by the file browser window.
    fn shell_folder(&self, window: WindowHandle) -> Result<Option<String>>;
}

/// Serves as a cross-compatible AutomationBackend implementation.
pub struct GenericAutomation {
    inner: Box<dyn AutomationBackend>,
}

impl GenericAutomation {
    pub fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                Self { inner: Box::new(com::ComAutomation::new()) }
            } else {
                Self { inner: Box::new(UnavailableAutomation) }
            }
        }
    }
}

impl Default for GenericAutomation {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationBackend for GenericAutomation {
    fn connect(&self, automation_id: &str) -> Result<Box<dyn AutomationSession>> {
        self.inner.connect(automation_id)
    }

    fn shell_folder(&self, window: WindowHandle) -> Result<Option<String>> {
        self.inner.shell_folder(window)
    }
}

/// Backend for platforms without application automation.
pub struct UnavailableAutomation;

impl AutomationBackend for UnavailableAutomation {
    fn connect(&self, automation_id: &str) -> Result<Box<dyn AutomationSession>> {
        anyhow::bail!("Automation for {automation_id} is not available on this platform")
    }

    fn shell_folder(&self, _window: WindowHandle) -> Result<Option<String>> {
        anyhow::bail!("Shell automation is not available on this platform")
    }
}
