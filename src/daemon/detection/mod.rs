//! Window classification and document resolution.
//!
//! Every [Detector] recognises one category of foreground window and turns it into a
//! [NormalizedRecord]. The [selector::DetectorSelector] walks them in a fixed priority order and
//! keeps a misbehaving detector from stalling the poll loop.

pub mod browser;
pub mod cache;
pub mod document;
pub mod file_browser;
pub mod general;
pub mod paths;
pub mod pdf;
pub mod record;
pub mod selector;

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::{
    process_api::ProcessInspector,
    utils::clock::SharedClock,
    window_api::{WindowHandle, WindowSystem},
};

use record::{MonitorType, NormalizedRecord};

/// Classifies a window and, if it belongs to the detector, resolves it into a record.
///
/// Implementations degrade backend failures into best-effort records themselves. Errors that do
/// escape are counted by the selector and eventually park the detector.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    fn monitor_type(&self) -> MonitorType;

    fn is_target(&self, window: WindowHandle) -> Result<bool>;

    /// Returns `None` when the window title didn't change since the previous record of this
    /// detector.
    fn resolve(&self, window: WindowHandle) -> Result<Option<NormalizedRecord>>;

    /// Housekeeping run once per poll tick, e.g. releasing idle automation sessions.
    fn maintain(&self) {}
}

/// Platform services shared by all detectors.
#[derive(Clone)]
pub struct DetectionContext {
    pub windows: Arc<dyn WindowSystem>,
    pub processes: Arc<dyn ProcessInspector>,
    pub clock: SharedClock,
}

/// Per detector memory of the last title it produced a record for.
#[derive(Default)]
pub struct LastTitle(Mutex<Option<String>>);

impl LastTitle {
    pub fn is_repeat(&self, title: &str) -> bool {
        self.0.lock().as_deref() == Some(title)
    }

    pub fn remember(&self, title: &str) {
        *self.0.lock() = Some(title.to_string());
    }
}
