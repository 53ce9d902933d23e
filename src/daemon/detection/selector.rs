use std::{fmt::Display, time::Duration};

use anyhow::{bail, Result};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::{utils::clock::SharedClock, window_api::WindowHandle};

use super::{record::NormalizedRecord, Detector};

/// Registration slot of a detector. The declaration order is the priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DetectorKey {
    FileBrowser,
    Word,
    Excel,
    PowerPoint,
    Browser,
    Pdf,
    General,
}

impl DetectorKey {
    pub const PRIORITY: [DetectorKey; 7] = [
        DetectorKey::FileBrowser,
        DetectorKey::Word,
        DetectorKey::Excel,
        DetectorKey::PowerPoint,
        DetectorKey::Browser,
        DetectorKey::Pdf,
        DetectorKey::General,
    ];

    /// Detector used when nothing else matches or the selected detector fails.
    pub const DEFAULT: DetectorKey = DetectorKey::General;

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKey::FileBrowser => "file_browser",
            DetectorKey::Word => "word",
            DetectorKey::Excel => "excel",
            DetectorKey::PowerPoint => "powerpoint",
            DetectorKey::Browser => "browser",
            DetectorKey::Pdf => "pdf",
            DetectorKey::General => "general",
        }
    }
}

impl Display for DetectorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectorSettings {
    pub error_threshold: u32,
    pub error_reset_interval: Duration,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            error_reset_interval: Duration::from_secs(60),
        }
    }
}

struct Entry {
    key: DetectorKey,
    detector: Box<dyn Detector>,
    errors: u32,
}

/// Picks the detector responsible for a window.
///
/// Detectors are consulted in [DetectorKey::PRIORITY] order regardless of the order they were
/// registered in. Every failure of a detector is counted; once a detector reaches the error
/// threshold it is skipped until the counters are reset, either by a successful resolution of
/// that detector or by the periodic reset.
pub struct DetectorSelector {
    entries: Vec<Entry>,
    settings: SelectorSettings,
    clock: SharedClock,
    last_reset: Instant,
}

impl DetectorSelector {
    pub fn new(settings: SelectorSettings, clock: SharedClock) -> Self {
        let last_reset = clock.instant();
        Self {
            entries: vec![],
            settings,
            clock,
            last_reset,
        }
    }

    /// Adds the detector at its priority position. A detector already registered under the same
    /// key is replaced.
    pub fn register(&mut self, key: DetectorKey, detector: Box<dyn Detector>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            debug!("Replacing detector {key}");
            entry.detector = detector;
            entry.errors = 0;
            return;
        }
        let position = self.entries.partition_point(|e| e.key < key);
        self.entries.insert(
            position,
            Entry {
                key,
                detector,
                errors: 0,
            },
        );
    }

    pub fn keys(&self) -> Vec<DetectorKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    pub fn error_count(&self, key: DetectorKey) -> Option<u32> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.errors)
    }

    fn reset_errors_if_due(&mut self) {
        let now = self.clock.instant();
        if now.saturating_duration_since(self.last_reset) > self.settings.error_reset_interval {
            for entry in self.entries.iter_mut() {
                entry.errors = 0;
            }
            self.last_reset = now;
        }
    }

    fn is_parked(&self, index: usize) -> bool {
        self.entries[index].errors >= self.settings.error_threshold
    }

    fn record_failure(&mut self, index: usize, error: anyhow::Error) {
        let threshold = self.settings.error_threshold;
        let entry = &mut self.entries[index];
        entry.errors += 1;
        warn!(
            "Detector {} failed ({}/{threshold}) {error:?}",
            entry.key, entry.errors
        );
        if entry.errors == threshold {
            warn!("Detector {} is parked until the next error reset", entry.key);
        }
    }

    /// Resolves through one detector. A record of another category than the detector's own
    /// counts as a failure.
    fn checked_resolve(
        &self,
        index: usize,
        window: WindowHandle,
    ) -> Result<Option<NormalizedRecord>> {
        let detector = &self.entries[index].detector;
        let record = detector.resolve(window)?;
        if let Some(record) = &record {
            let expected = detector.monitor_type();
            if record.monitor_type != expected {
                bail!(
                    "Detector {} produced a {:?} record instead of {expected:?}",
                    self.entries[index].key,
                    record.monitor_type
                );
            }
        }
        Ok(record)
    }

    fn resolve_with(&mut self, index: usize, window: WindowHandle) -> Option<NormalizedRecord> {
        match self.checked_resolve(index, window) {
            Ok(record) => {
                self.entries[index].errors = 0;
                record
            }
            Err(e) => {
                self.record_failure(index, e);
                None
            }
        }
    }

    fn resolve_default(&mut self, window: WindowHandle) -> Option<NormalizedRecord> {
        let index = self
            .entries
            .iter()
            .position(|e| e.key == DetectorKey::DEFAULT)?;
        if self.is_parked(index) {
            debug!("Default detector is parked");
            return None;
        }
        self.resolve_with(index, window)
    }

    /// Record for the window from the first matching detector. Detector errors never escape.
    #[instrument(skip(self))]
    pub fn resolve(&mut self, window: WindowHandle) -> Option<NormalizedRecord> {
        self.reset_errors_if_due();

        let mut selected = None;
        for index in 0..self.entries.len() {
            if self.is_parked(index) {
                continue;
            }
            match self.entries[index].detector.is_target(window) {
                Ok(true) => {
                    selected = Some(index);
                    break;
                }
                Ok(false) => {}
                Err(e) => self.record_failure(index, e),
            }
        }

        let Some(index) = selected else {
            return self.resolve_default(window);
        };
        debug!("Selected detector {}", self.entries[index].key);
        match self.checked_resolve(index, window) {
            Ok(record) => {
                self.entries[index].errors = 0;
                record
            }
            Err(e) => {
                self.record_failure(index, e);
                if self.entries[index].key == DetectorKey::DEFAULT {
                    None
                } else {
                    self.resolve_default(window)
                }
            }
        }
    }

    /// Runs housekeeping of every registered detector.
    pub fn maintain(&self) {
        for entry in self.entries.iter() {
            entry.detector.maintain();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;

    use crate::{
        daemon::detection::{
            record::{MonitorType, NormalizedRecord},
            test_support::{snapshot, start_time, WINDOW},
            MockDetector,
        },
        utils::clock::TestClock,
    };

    use super::{DetectorKey, DetectorSelector, SelectorSettings};

    fn record(monitor_type: MonitorType, title: &str) -> NormalizedRecord {
        NormalizedRecord::from_process(start_time(), &snapshot(1, "app.exe"), title, monitor_type)
    }

    fn monitor_type(key: DetectorKey) -> MonitorType {
        match key {
            DetectorKey::FileBrowser => MonitorType::FileBrowser,
            DetectorKey::Word | DetectorKey::Excel | DetectorKey::PowerPoint => {
                MonitorType::Document
            }
            DetectorKey::Browser => MonitorType::Browser,
            DetectorKey::Pdf => MonitorType::Pdf,
            DetectorKey::General => MonitorType::General,
        }
    }

    /// Detector that claims the window when `target` and resolves it into a record titled with
    /// its key.
    fn detector(key: DetectorKey, target: bool) -> Box<MockDetector> {
        let mut detector = MockDetector::new();
        detector
            .expect_monitor_type()
            .returning(move || monitor_type(key));
        detector.expect_is_target().returning(move |_| Ok(target));
        detector
            .expect_resolve()
            .returning(move |_| Ok(Some(record(monitor_type(key), key.as_str()))));
        detector.expect_maintain().returning(|| ());
        Box::new(detector)
    }

    fn selector() -> DetectorSelector {
        DetectorSelector::new(SelectorSettings::default(), TestClock::shared(start_time()))
    }

    #[tokio::test]
    async fn priority_does_not_depend_on_registration_order() {
        let mut reversed = DetectorKey::PRIORITY.to_vec();
        reversed.reverse();
        let shuffled = vec![
            DetectorKey::Pdf,
            DetectorKey::General,
            DetectorKey::Word,
            DetectorKey::FileBrowser,
            DetectorKey::Browser,
            DetectorKey::PowerPoint,
            DetectorKey::Excel,
        ];

        for order in [DetectorKey::PRIORITY.to_vec(), reversed, shuffled] {
            let mut selector = selector();
            for key in order.iter() {
                let target = matches!(key, DetectorKey::Excel | DetectorKey::Pdf);
                selector.register(*key, detector(*key, target));
            }
            assert_eq!(selector.keys(), DetectorKey::PRIORITY.to_vec());

            let record = selector.resolve(WINDOW).unwrap();
            assert_eq!(record.window_title, "excel", "order {order:?}");
            assert_eq!(record.monitor_type, MonitorType::Document);
        }
    }

    #[tokio::test]
    async fn falls_back_to_default_when_nothing_matches() {
        let mut selector = selector();
        selector.register(DetectorKey::General, detector(DetectorKey::General, false));
        selector.register(DetectorKey::Browser, detector(DetectorKey::Browser, false));

        let record = selector.resolve(WINDOW).unwrap();
        assert_eq!(record.monitor_type, MonitorType::General);
    }

    #[tokio::test]
    async fn without_default_nothing_is_recorded() {
        let mut selector = selector();
        selector.register(DetectorKey::Browser, detector(DetectorKey::Browser, false));
        assert!(selector.resolve(WINDOW).is_none());
    }

    #[tokio::test]
    async fn failing_detector_is_parked_after_threshold() {
        let mut file_browser = MockDetector::new();
        file_browser
            .expect_is_target()
            .times(5)
            .returning(|_| Err(anyhow!("automation is wedged")));

        let mut selector = selector();
        selector.register(DetectorKey::General, detector(DetectorKey::General, false));
        selector.register(DetectorKey::FileBrowser, Box::new(file_browser));

        for _ in 0..6 {
            let record = selector.resolve(WINDOW).unwrap();
            assert_eq!(record.monitor_type, MonitorType::General);
        }
        assert_eq!(selector.error_count(DetectorKey::FileBrowser), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn parked_detector_returns_after_reset_interval() {
        let mut file_browser = MockDetector::new();
        let mut calls = 0;
        file_browser.expect_is_target().times(6).returning(move |_| {
            calls += 1;
            if calls <= 5 {
                Err(anyhow!("automation is wedged"))
            } else {
                Ok(true)
            }
        });
        file_browser
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(Some(record(MonitorType::FileBrowser, "Documents"))));
        file_browser
            .expect_monitor_type()
            .returning(|| MonitorType::FileBrowser);

        let mut selector = selector();
        selector.register(DetectorKey::General, detector(DetectorKey::General, false));
        selector.register(DetectorKey::FileBrowser, Box::new(file_browser));

        for _ in 0..6 {
            selector.resolve(WINDOW);
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            selector.resolve(WINDOW).unwrap().monitor_type,
            MonitorType::General
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        let record = selector.resolve(WINDOW).unwrap();
        assert_eq!(record.monitor_type, MonitorType::FileBrowser);
        assert_eq!(selector.error_count(DetectorKey::FileBrowser), Some(0));
    }

    #[tokio::test]
    async fn resolve_failure_uses_default_for_this_cycle() {
        let mut word = MockDetector::new();
        word.expect_is_target().returning(|_| Ok(true));
        word.expect_resolve()
            .returning(|_| Err(anyhow!("document went away")));

        let mut selector = selector();
        selector.register(DetectorKey::Word, Box::new(word));
        selector.register(DetectorKey::General, detector(DetectorKey::General, false));

        let record = selector.resolve(WINDOW).unwrap();
        assert_eq!(record.monitor_type, MonitorType::General);
        assert_eq!(selector.error_count(DetectorKey::Word), Some(1));
    }

    #[tokio::test]
    async fn record_of_another_category_is_a_failure() {
        let mut pdf = MockDetector::new();
        pdf.expect_is_target().returning(|_| Ok(true));
        pdf.expect_monitor_type().returning(|| MonitorType::Pdf);
        pdf.expect_resolve()
            .returning(|_| Ok(Some(record(MonitorType::Browser, "paper.pdf - Chrome"))));

        let mut selector = selector();
        selector.register(DetectorKey::Pdf, Box::new(pdf));
        selector.register(DetectorKey::General, detector(DetectorKey::General, false));

        let record = selector.resolve(WINDOW).unwrap();
        assert_eq!(record.monitor_type, MonitorType::General);
        assert_eq!(record.window_title, "general");
        assert_eq!(selector.error_count(DetectorKey::Pdf), Some(1));
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let mut word = MockDetector::new();
        let mut calls = 0;
        word.expect_is_target().returning(move |_| {
            calls += 1;
            if calls % 2 == 1 {
                Err(anyhow!("busy"))
            } else {
                Ok(true)
            }
        });
        word.expect_resolve()
            .returning(|_| Ok(Some(record(MonitorType::Document, "word"))));
        word.expect_monitor_type().returning(|| MonitorType::Document);

        let mut selector = selector();
        selector.register(DetectorKey::Word, Box::new(word));

        for _ in 0..10 {
            selector.resolve(WINDOW);
        }
        assert_eq!(selector.error_count(DetectorKey::Word), Some(0));
    }

    #[tokio::test]
    async fn register_replaces_existing_key() {
        let mut selector = selector();
        selector.register(DetectorKey::Browser, detector(DetectorKey::Browser, false));
        selector.register(DetectorKey::Browser, detector(DetectorKey::Browser, true));

        assert_eq!(selector.keys(), vec![DetectorKey::Browser]);
        assert_eq!(
            selector.resolve(WINDOW).unwrap().monitor_type,
            MonitorType::Browser
        );
    }

    #[tokio::test]
    async fn maintain_reaches_every_detector() {
        let mut selector = selector();
        for key in DetectorKey::PRIORITY {
            let mut detector = MockDetector::new();
            detector.expect_maintain().times(1).returning(|| ());
            selector.register(key, Box::new(detector));
        }
        selector.maintain();
    }
}
