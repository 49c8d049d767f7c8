//! Reconciliation engine for Nimbus
//!
//! This crate handles:
//! - The control-plane trait and its HTTP implementation
//! - Per-unit reconciliation (run the lifecycle, poll to terminal state)
//! - Hook middleware around batch actions
//! - Sequential batch driving with per-unit result folding

pub mod batch;
pub mod client;
pub mod hooks;
pub mod reconciler;

pub use batch::Engine;
pub use client::{
    ControlPlane, HttpControlPlane, InstanceFilter, LifecycleMethod, LifecycleOptions,
};
pub use hooks::{run_with_hooks, HookFn, HookInvocation, HookRegistry};
pub use reconciler::{Reconciler, ReconcilerConfig, RunOptions};
