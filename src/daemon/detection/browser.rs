use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, instrument};

use crate::window_api::WindowHandle;

use super::{
    record::{MonitorType, NormalizedRecord},
    DetectionContext, Detector, LastTitle,
};

/// Browser processes and the label recorded as `app_subtype`.
const BROWSERS: &[(&str, &str)] = &[
    ("chrome.exe", "Chrome"),
    ("firefox.exe", "Firefox"),
    ("msedge.exe", "Edge"),
    ("opera.exe", "Opera"),
    ("brave.exe", "Brave"),
    ("iexplore.exe", "Internet Explorer"),
    ("safari.exe", "Safari"),
    ("chrome", "Chrome"),
    ("chromium", "Chrome"),
    ("firefox", "Firefox"),
    ("msedge", "Edge"),
    ("opera", "Opera"),
    ("brave", "Brave"),
];

const NEW_TAB_TITLES: &[(&str, &[&str])] = &[
    ("Chrome", &["New Tab", "新しいタブ"]),
    ("Firefox", &["New Tab", "新しいタブ"]),
    ("Edge", &["New tab", "新しいタブ"]),
    ("Opera", &["Speed Dial", "スピードダイヤル"]),
    ("Brave", &["New Tab", "新しいタブ"]),
    ("Internet Explorer", &["New Tab", "新しいタブ"]),
    ("Safari", &["Start Page", "スタートページ"]),
];

/// `<page> <separator> <browser>`, tried in order. The page part is greedy so dashes inside the
/// page title stay with the page.
static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^(.+) - (.+)$", r"^(.+) — (.+)$", r"^(.+) – (.+)$"]
        .into_iter()
        .filter_map(|v| Regex::new(v).ok())
        .collect()
});

pub fn browser_label(process_name: &str) -> Option<&'static str> {
    BROWSERS
        .iter()
        .find(|(process, _)| process.eq_ignore_ascii_case(process_name))
        .map(|(_, label)| *label)
}

pub fn is_browser_process(process_name: &str) -> bool {
    browser_label(process_name).is_some()
}

/// Splits a window title into page title and browser name.
pub fn parse_title<'a>(title: &'a str, browser: &'a str) -> (&'a str, &'a str) {
    TITLE_PATTERNS
        .iter()
        .find_map(|pattern| {
            let captures = pattern.captures(title)?;
            Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
        })
        .unwrap_or((title, browser))
}

pub fn is_new_tab(page_title: &str, browser: &str) -> bool {
    page_title.is_empty()
        || NEW_TAB_TITLES
            .iter()
            .find(|(label, _)| *label == browser)
            .is_some_and(|(_, titles)| titles.contains(&page_title))
}

pub struct BrowserDetector {
    context: DetectionContext,
    last_title: LastTitle,
}

impl BrowserDetector {
    pub fn new(context: DetectionContext) -> Self {
        Self {
            context,
            last_title: LastTitle::default(),
        }
    }
}

impl Detector for BrowserDetector {
    fn monitor_type(&self) -> MonitorType {
        MonitorType::Browser
    }

    #[instrument(skip(self))]
    fn is_target(&self, window: WindowHandle) -> Result<bool> {
        let pid = self.context.windows.process_id(window)?;
        match self.context.processes.snapshot(pid) {
            Ok(process) => Ok(is_browser_process(&process.name)),
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

        let pid = self.context.windows.process_id(window)?;
        let process = self.context.processes.snapshot(pid)?;
        let label = browser_label(&process.name).unwrap_or("Unknown");
        let (page_title, _) = parse_title(&title, label);

        let record = NormalizedRecord::from_process(
            self.context.clock.time(),
            &process,
            title.as_str(),
            MonitorType::Browser,
        )
        .with_working_directory(page_title)
        .with_new_document(is_new_tab(page_title, label))
        .with_subtype(label);

        self.last_title.remember(&title);
        Ok(Some(record))
    }
}
