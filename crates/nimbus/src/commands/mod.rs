//! Command implementations

pub mod deploy;
pub mod dev;
pub mod info;
pub mod list;
pub mod logs;
pub mod remove;

use crate::cli::Cli;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use nimbus_core::types::Template;
use nimbus_engine::{
    ControlPlane, Engine, HookRegistry, HttpControlPlane, ReconcilerConfig,
};
use nimbus_package::{HttpObjectStore, ObjectStore, PackagerConfig};
use std::sync::Arc;
use std::time::Duration;

/// Shared wiring for template-driven commands
pub struct CommandContext {
    pub template: Arc<Template>,
    pub engine: Engine,
    pub registry: HookRegistry,
}

/// Resolve the template at --target (or the current directory)
pub fn resolve_target(cli: &Cli) -> Result<Template> {
    let root = match &cli.target {
        Some(target) => target.clone(),
        None => current_dir_utf8()?,
    };
    Ok(nimbus_core::resolve_template(&root)?)
}

/// Build the engine alone; listing with explicit filters needs no
/// template.
pub fn build_engine(
    cli: &Cli,
    poll_interval: Duration,
    poll_timeout: Duration,
    max_package_size: Option<u64>,
) -> Engine {
    let client: Arc<dyn ControlPlane> =
        Arc::new(HttpControlPlane::new(&cli.endpoint, &cli.token));
    let store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::default());

    let mut packager = PackagerConfig::default();
    if let Some(max) = max_package_size {
        packager.max_package_size = max;
    }

    Engine::new(
        client,
        store,
        ReconcilerConfig {
            poll_interval,
            poll_timeout,
            packager,
        },
    )
}

/// Build the engine plus the resolved template for one command
pub fn build_context(
    cli: &Cli,
    poll_interval: Duration,
    poll_timeout: Duration,
    max_package_size: Option<u64>,
) -> Result<CommandContext> {
    let template = Arc::new(resolve_target(cli)?);

    Ok(CommandContext {
        template,
        engine: build_engine(cli, poll_interval, poll_timeout, max_package_size),
        // Hook handlers are registered by embedding callers; the bare CLI
        // starts with an empty registry, so a manifest that declares hooks
        // fails fast with the offending key.
        registry: HookRegistry::new(),
    })
}

fn current_dir_utf8() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| anyhow::anyhow!("Current directory is not valid UTF-8: {path:?}"))
}
