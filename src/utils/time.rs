use chrono::{DateTime, NaiveDate, Utc};

/// Format used for record timestamps and error log lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// This is the standard way of converting a date to an activity log file name in windowtrail.
pub fn date_to_log_name(date: NaiveDate) -> String {
    format!("{}_activity_log.csv", date.format("%Y%m%d"))
}

pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}
