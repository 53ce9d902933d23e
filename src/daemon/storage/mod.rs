//! Durable storage of activity records.
//!
//! - Every UTC day has its own CSV file `YYYYMMDD_activity_log.csv` in the log directory.
//! - A day file is never written in place. The current file is copied into the staging
//!   directory, extended there and renamed back over the original.
//! - Flush failures are appended to a separate plain text error log.

pub mod activity_log;
pub mod csv_row;
pub mod error_log;
