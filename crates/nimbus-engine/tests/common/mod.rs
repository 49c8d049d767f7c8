//! Shared fixtures and mocks for engine integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use nimbus_core::types::{
    InstanceStatus, LogRecord, StatusSnapshot, Template, TimeWindow, Unit, UnitIdentity,
};
use nimbus_engine::{ControlPlane, InstanceFilter, LifecycleMethod, LifecycleOptions};
use nimbus_package::PackageTarget;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

pub fn identity(name: &str) -> UnitIdentity {
    identity_with_component(name, "scf")
}

pub fn identity_with_component(name: &str, component: &str) -> UnitIdentity {
    UnitIdentity {
        org: None,
        app: "demo".to_string(),
        stage: "dev".to_string(),
        name: name.to_string(),
        component: component.to_string(),
    }
}

pub fn unit(name: &str, deps: &[&str]) -> Unit {
    Unit {
        identity: identity(name),
        inputs: Value::Null,
        deps: deps.iter().map(|d| d.to_string()).collect(),
        root: Utf8PathBuf::from("."),
    }
}

pub fn unit_with_inputs(name: &str, inputs: Value, deps: &[&str]) -> Unit {
    Unit {
        inputs,
        ..unit(name, deps)
    }
}

pub fn template(units: Vec<Unit>) -> Template {
    Template {
        units,
        hooks: BTreeMap::new(),
    }
}

pub fn snapshot(name: &str, status: InstanceStatus) -> StatusSnapshot {
    StatusSnapshot {
        name: name.to_string(),
        status,
        outputs: Value::Null,
        error: None,
        updated_at: None,
    }
}

/// One recorded lifecycle call
#[derive(Debug, Clone)]
pub struct LifecycleCall {
    pub name: String,
    pub method: &'static str,
    pub inputs: Value,
    pub force: bool,
    pub cache_outdated: bool,
}

/// Programmable in-memory control plane
#[derive(Default)]
pub struct MockControlPlane {
    /// Per-unit status sequences; the last entry repeats
    statuses: Mutex<BTreeMap<String, VecDeque<InstanceStatus>>>,

    /// Outputs attached to non-error snapshots
    outputs: Mutex<BTreeMap<String, Value>>,

    /// Units whose lifecycle call fails
    fail_lifecycle: Mutex<BTreeSet<String>>,

    pub lifecycle_calls: Mutex<Vec<LifecycleCall>>,
    pub code_updates: Mutex<Vec<String>>,
    pub status_calls: Mutex<Vec<String>>,
    pub log_records: Mutex<Vec<LogRecord>>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a status the next fetch will observe; the final entry keeps
    /// repeating once reached
    pub fn queue_status(&self, name: &str, status: InstanceStatus) {
        self.statuses
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn set_outputs(&self, name: &str, outputs: Value) {
        self.outputs
            .lock()
            .unwrap()
            .insert(name.to_string(), outputs);
    }

    pub fn fail_lifecycle_for(&self, name: &str) {
        self.fail_lifecycle
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn lifecycle_count(&self) -> usize {
        self.lifecycle_calls.lock().unwrap().len()
    }

    fn next_status(&self, name: &str) -> InstanceStatus {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().copied().unwrap_or(InstanceStatus::Active),
            None => InstanceStatus::Active,
        }
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn cache_manifest(&self, identity: &UnitIdentity) -> Result<PackageTarget> {
        Ok(PackageTarget {
            upload_url: format!("mem://{}/upload", identity.name),
            previous_manifest_url: format!("mem://{}/manifest", identity.name),
            download_url: format!("mem://{}/download", identity.name),
        })
    }

    async fn run_lifecycle(
        &self,
        identity: &UnitIdentity,
        inputs: &Value,
        method: LifecycleMethod,
        options: LifecycleOptions,
    ) -> Result<()> {
        if self.fail_lifecycle.lock().unwrap().contains(&identity.name) {
            return Err(anyhow!("remote rejected '{}'", identity.name));
        }
        self.lifecycle_calls.lock().unwrap().push(LifecycleCall {
            name: identity.name.clone(),
            method: method.as_str(),
            inputs: inputs.clone(),
            force: options.force,
            cache_outdated: options.cache_outdated,
        });
        Ok(())
    }

    async fn status(&self, identity: &UnitIdentity) -> Result<StatusSnapshot> {
        self.status_calls
            .lock()
            .unwrap()
            .push(identity.name.clone());

        let status = self.next_status(&identity.name);
        let outputs = self
            .outputs
            .lock()
            .unwrap()
            .get(&identity.name)
            .cloned()
            .unwrap_or(Value::Null);

        Ok(StatusSnapshot {
            name: identity.name.clone(),
            status,
            outputs,
            error: match status {
                InstanceStatus::Error => Some("component crashed".to_string()),
                _ => None,
            },
            updated_at: None,
        })
    }

    async fn list_instances(&self, _filter: &InstanceFilter) -> Result<Vec<StatusSnapshot>> {
        let outputs = self.outputs.lock().unwrap();
        Ok(outputs
            .iter()
            .map(|(name, value)| StatusSnapshot {
                name: name.clone(),
                status: InstanceStatus::Active,
                outputs: value.clone(),
                error: None,
                updated_at: None,
            })
            .collect())
    }

    async fn update_code(
        &self,
        identity: &UnitIdentity,
        _package: Vec<u8>,
        _region: Option<&str>,
    ) -> Result<()> {
        self.code_updates
            .lock()
            .unwrap()
            .push(identity.name.clone());
        Ok(())
    }

    async fn search_logs(
        &self,
        _topic: &str,
        window: TimeWindow,
        _query: Option<&str>,
        _region: Option<&str>,
    ) -> Result<Vec<LogRecord>> {
        Ok(self
            .log_records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.timestamp >= window.start && record.timestamp < window.end)
            .cloned()
            .collect())
    }
}
