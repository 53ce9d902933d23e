//! Daemon and cli recording which window, document, folder or web page is in the foreground.
//! Every poll the foreground window is classified by a set of detectors, resolved into a
//! normalized record and written into a day stamped CSV log.

pub mod automation;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod process_api;
pub mod utils;
pub mod window_api;
