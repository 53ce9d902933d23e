//! Sampling of the foreground window.

pub mod poller;
