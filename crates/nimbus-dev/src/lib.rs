//! Live session driver for Nimbus
//!
//! This crate handles:
//! - Filesystem watching with debounce and last-write-wins pushes
//! - The code-only hot-reload path for function units
//! - Polling log tails with last-record deduplication

pub mod logs;
pub mod session;

pub use logs::{LogTail, DEFAULT_TAIL_INTERVAL, DEFAULT_TAIL_WINDOW};
pub use session::{DevConfig, LiveSession, LogSink, DEFAULT_DEBOUNCE};
