//! Sequential batch driving
//!
//! Units run one at a time in scheduler order so outputs published by an
//! earlier unit are resolvable before any dependent runs. A unit's remote
//! failure is folded into its report and siblings continue; only the
//! batch-fatal package-budget error skips the rest of the batch.

use crate::client::{ControlPlane, InstanceFilter};
use crate::reconciler::{Reconciler, ReconcilerConfig, RunOptions};
use anyhow::Result;
use nimbus_core::scheduler::Scheduler;
use nimbus_core::types::{Action, BatchReport, StatusSnapshot, Template, Unit, UnitReport};
use nimbus_core::variables::OutputStore;
use nimbus_package::ObjectStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Batch engine over the reconciler
pub struct Engine {
    reconciler: Reconciler,
}

impl Engine {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        store: Arc<dyn ObjectStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(client, store, config),
        }
    }

    /// The per-unit reconciler, shared with the live session driver
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Deploy every unit in dependency order.
    pub async fn deploy(&self, template: &Template, options: &RunOptions) -> Result<BatchReport> {
        let order = Scheduler::new(&template.units).deploy_order()?;
        let units = by_name(&template.units);

        let mut outputs = OutputStore::new();
        let mut report = BatchReport::new(Action::Deploy);

        for name in &order {
            let unit = units[name.as_str()];
            info!("Deploying {}", unit.identity);

            match self.reconciler.deploy(unit, &outputs, options).await {
                Ok(snapshot) => {
                    outputs.record(name.clone(), snapshot.outputs.clone());
                    report.push(UnitReport::ready(name.clone(), snapshot));
                }
                Err(err) if is_batch_fatal(&err) => return Err(err),
                Err(err) => {
                    warn!("Deploy of '{name}' failed: {err:#}");
                    report.push(UnitReport::failed(name.clone(), format!("{err:#}")));
                }
            }
        }
        Ok(report)
    }

    /// Tear every unit down, dependents first.
    pub async fn remove(&self, template: &Template) -> Result<BatchReport> {
        let order = Scheduler::new(&template.units).remove_order()?;
        let units = by_name(&template.units);

        let outputs = OutputStore::new();
        let mut report = BatchReport::new(Action::Remove);

        for name in &order {
            let unit = units[name.as_str()];
            info!("Removing {}", unit.identity);

            match self.reconciler.remove(unit, &outputs).await {
                Ok(snapshot) => report.push(UnitReport::ready(name.clone(), snapshot)),
                Err(err) => {
                    warn!("Remove of '{name}' failed: {err:#}");
                    report.push(UnitReport::failed(name.clone(), format!("{err:#}")));
                }
            }
        }
        Ok(report)
    }

    /// Single status fetch per unit, no waiting.
    pub async fn info(&self, template: &Template) -> Result<BatchReport> {
        let order = Scheduler::new(&template.units).deploy_order()?;
        let units = by_name(&template.units);

        let mut report = BatchReport::new(Action::Info);
        for name in &order {
            let unit = units[name.as_str()];
            match self.reconciler.fetch_once(&unit.identity).await {
                Ok(snapshot) => report.push(UnitReport::ready(name.clone(), snapshot)),
                Err(err) => report.push(UnitReport::failed(name.clone(), format!("{err:#}"))),
            }
        }
        Ok(report)
    }

    /// Remote listing, independent of any local template.
    pub async fn list(&self, filter: &InstanceFilter) -> Result<Vec<StatusSnapshot>> {
        self.reconciler.client().list_instances(filter).await
    }
}

fn by_name(units: &[Unit]) -> BTreeMap<&str, &Unit> {
    units
        .iter()
        .map(|unit| (unit.identity.name.as_str(), unit))
        .collect()
}

/// The package-budget error skips the remainder of the batch; everything
/// else stays per-unit.
fn is_batch_fatal(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<nimbus_core::Error>(),
        Some(nimbus_core::Error::PackageTooLarge { .. })
    )
}
