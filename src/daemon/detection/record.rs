use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{process_api::ProcessSnapshot, utils::time::format_timestamp};

/// Detector category that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorType {
    General,
    FileBrowser,
    Document,
    Browser,
    Pdf,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::General => "general",
            MonitorType::FileBrowser => "file_browser",
            MonitorType::Document => "document",
            MonitorType::Browser => "browser",
            MonitorType::Pdf => "pdf",
        }
    }
}

impl Display for MonitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup key of a record inside one unflushed batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    process_id: u32,
    process_name: String,
    window_title: String,
}

/// The single output type of every detector. Values are never mutated after a detector hands
/// them out, they are cloned on their way into caches and the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub process_name: String,
    pub window_title: String,
    pub process_id: u32,
    pub application_name: String,
    pub application_path: String,
    /// Resolved document path, folder, page title or a sentinel. Never absent, possibly empty.
    pub working_directory: String,
    pub monitor_type: MonitorType,
    pub is_new_document: bool,
    pub app_subtype: Option<String>,
}

impl NormalizedRecord {
    /// Record with process fields filled from `process` and an empty working directory.
    pub fn from_process(
        timestamp: DateTime<Utc>,
        process: &ProcessSnapshot,
        window_title: impl Into<String>,
        monitor_type: MonitorType,
    ) -> Self {
        Self {
            timestamp,
            process_name: process.name.clone(),
            window_title: window_title.into(),
            process_id: process.pid,
            application_name: process.application_name(),
            application_path: process.application_path(),
            working_directory: String::new(),
            monitor_type,
            is_new_document: false,
            app_subtype: None,
        }
    }

    pub fn with_working_directory(self, working_directory: impl Into<String>) -> Self {
        Self {
            working_directory: working_directory.into(),
            ..self
        }
    }

    pub fn with_new_document(self, is_new_document: bool) -> Self {
        Self {
            is_new_document,
            ..self
        }
    }

    pub fn with_subtype(self, app_subtype: impl Into<String>) -> Self {
        Self {
            app_subtype: Some(app_subtype.into()),
            ..self
        }
    }

    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, ..self }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            process_id: self.process_id,
            process_name: self.process_name.clone(),
            window_title: self.window_title.clone(),
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    use crate::utils::time::{format_timestamp, TIMESTAMP_FORMAT};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
            .map(|v| v.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
