//! Per-unit reconciliation: run the remote lifecycle, poll to a terminal
//! state, and package source material on the way.

use crate::client::{ControlPlane, LifecycleMethod, LifecycleOptions};
use anyhow::{anyhow, Result};
use nimbus_core::types::{InstanceStatus, SourceReference, StatusSnapshot, Unit, UnitIdentity};
use nimbus_core::variables::{resolve_inputs, OutputStore, ResolveMode};
use nimbus_package::{package_unit, ObjectStore, PackagerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default pause between status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default budget for one unit to leave its transient state
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub packager: PackagerConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            packager: PackagerConfig::default(),
        }
    }
}

/// Caller-facing knobs for one deploy pass
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Redeploy even when change detection finds nothing
    pub force: bool,

    /// Function-kind fast path: push code only, skip full reconciliation
    pub code_only: bool,
}

/// Drives one unit through run-then-poll
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn ControlPlane>,
    store: Arc<dyn ObjectStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        store: Arc<dyn ObjectStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    pub fn client(&self) -> &Arc<dyn ControlPlane> {
        &self.client
    }

    /// Deploy one unit and wait for its terminal state.
    ///
    /// Variables are re-resolved in `All` mode first so outputs of units
    /// reconciled earlier in the batch are substituted. Units with local
    /// source material are packaged before the lifecycle call; the
    /// code-only fast path short-circuits to `update_code` for
    /// function-kind units.
    pub async fn deploy(
        &self,
        unit: &Unit,
        outputs: &OutputStore,
        options: &RunOptions,
    ) -> Result<StatusSnapshot> {
        let mut unit = self.resolved(unit, outputs);
        let mut lifecycle_options = LifecycleOptions {
            force: options.force,
            cache_outdated: false,
        };

        if unit.has_local_source() {
            let target = self.client.cache_manifest(&unit.identity).await?;
            let outcome =
                package_unit(&unit, &target, self.store.as_ref(), &self.config.packager).await?;
            debug!(
                "Packaged {}: changes={} force={}",
                unit.identity, outcome.has_changes, outcome.force
            );

            lifecycle_options.force |= outcome.force;
            lifecycle_options.cache_outdated = outcome.cache_outdated;

            if options.code_only && unit.is_function_kind() {
                info!("Code-only fast path for {}", unit.identity);
                self.client
                    .update_code(&unit.identity, outcome.archive, region_of(&unit))
                    .await?;
                return self.fetch_once(&unit.identity).await;
            }

            apply_download_url(&mut unit, &outcome.download_url);
        }

        self.client
            .run_lifecycle(
                &unit.identity,
                &unit.inputs,
                LifecycleMethod::Deploy,
                lifecycle_options,
            )
            .await?;
        self.poll(&unit.identity).await
    }

    /// Remove one unit and wait for its terminal state.
    pub async fn remove(&self, unit: &Unit, outputs: &OutputStore) -> Result<StatusSnapshot> {
        let unit = self.resolved(unit, outputs);
        self.client
            .run_lifecycle(
                &unit.identity,
                &unit.inputs,
                LifecycleMethod::Remove,
                LifecycleOptions::default(),
            )
            .await?;
        self.poll(&unit.identity).await
    }

    /// Single status fetch, no waiting
    pub async fn fetch_once(&self, identity: &UnitIdentity) -> Result<StatusSnapshot> {
        let snapshot = self.client.status(identity).await?;
        terminal_or_passthrough(snapshot)
    }

    /// Poll remote status until it leaves the transient states or the
    /// timeout elapses. A zero interval or timeout degenerates to a single
    /// fetch, which `info` relies on.
    pub async fn poll(&self, identity: &UnitIdentity) -> Result<StatusSnapshot> {
        let interval = self.config.poll_interval;
        let timeout = self.config.poll_timeout;
        if interval.is_zero() || timeout.is_zero() {
            return self.fetch_once(identity).await;
        }

        let start = tokio::time::Instant::now();
        loop {
            let snapshot = self.client.status(identity).await?;
            if !snapshot.status.is_transient() {
                return terminal_or_passthrough(snapshot);
            }
            if start.elapsed() >= timeout {
                return Err(anyhow!(
                    "Polling '{}' timed out after {:.1}s in status '{}'",
                    identity,
                    timeout.as_secs_f64(),
                    snapshot.status
                ));
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Re-run variable resolution against the current output store
    fn resolved(&self, unit: &Unit, outputs: &OutputStore) -> Unit {
        let resolution = resolve_inputs(&unit.inputs, &unit.identity, ResolveMode::All, outputs);
        Unit {
            identity: unit.identity.clone(),
            inputs: resolution.inputs,
            deps: resolution.deps,
            root: unit.root.clone(),
        }
    }
}

/// A terminal error status carries the remote failure into the per-unit
/// error record instead of a snapshot.
fn terminal_or_passthrough(snapshot: StatusSnapshot) -> Result<StatusSnapshot> {
    if snapshot.status == InstanceStatus::Error {
        let detail = snapshot
            .error
            .unwrap_or_else(|| "no detail reported".to_string());
        return Err(anyhow!("Instance '{}' reported error: {}", snapshot.name, detail));
    }
    Ok(snapshot)
}

fn region_of(unit: &Unit) -> Option<&str> {
    unit.inputs.get("region").and_then(Value::as_str)
}

/// Swap every local source reference for the uploaded package handle.
fn apply_download_url(unit: &mut Unit, download_url: &str) {
    let replacement = json!({ "url": download_url });

    if unit.is_multi_function() {
        if let Some(functions) = unit
            .inputs
            .get_mut("functions")
            .and_then(Value::as_object_mut)
        {
            for declaration in functions.values_mut() {
                let is_local = declaration
                    .get("src")
                    .and_then(SourceReference::from_value)
                    .map(|src| matches!(src, SourceReference::Local(_)))
                    .unwrap_or(false);
                if is_local {
                    declaration["src"] = replacement.clone();
                }
            }
        }
        return;
    }

    if let Some(map) = unit.inputs.as_object_mut() {
        if map.contains_key("src") {
            map.insert("src".to_string(), replacement);
        }
    }
}
