//! # nimbus-core
//!
//! Core library for the Nimbus CLI providing:
//! - Manifest loading and template resolution (single, multi, directory)
//! - Variable interpolation with dependency-edge recording
//! - DFS-based dependency scheduling with cycle detection
//! - Shared unit, status, and batch-result types

pub mod error;
pub mod scheduler;
pub mod template;
pub mod types;
pub mod variables;

pub use error::{human_bytes, Error, Result};
pub use scheduler::Scheduler;
pub use template::resolve_template;
pub use types::{
    Action, BatchReport, InstanceStatus, LogRecord, StatusSnapshot, Template, TimeWindow, Unit,
    UnitIdentity, UnitOutcome, UnitReport,
};
pub use variables::{resolve_inputs, OutputStore, Resolution, ResolveMode};
