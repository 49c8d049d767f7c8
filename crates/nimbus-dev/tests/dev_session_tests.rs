//! Dev session pre-flight and log tail behavior against a mock control
//! plane

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};
use nimbus_core::types::{
    InstanceStatus, LogRecord, StatusSnapshot, Template, TimeWindow, Unit, UnitIdentity,
};
use nimbus_core::Error;
use nimbus_dev::{DevConfig, LiveSession, LogTail};
use nimbus_engine::{
    ControlPlane, InstanceFilter, LifecycleMethod, LifecycleOptions, Reconciler, ReconcilerConfig,
};
use nimbus_package::{MemoryObjectStore, PackageTarget};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimal control plane: fixed statuses, canned log records
#[derive(Default)]
struct FixedControlPlane {
    statuses: BTreeMap<String, InstanceStatus>,
    records: Mutex<Vec<LogRecord>>,
}

#[async_trait]
impl ControlPlane for FixedControlPlane {
    async fn cache_manifest(&self, identity: &UnitIdentity) -> Result<PackageTarget> {
        Ok(PackageTarget {
            upload_url: format!("mem://{}/upload", identity.name),
            previous_manifest_url: format!("mem://{}/manifest", identity.name),
            download_url: format!("mem://{}/download", identity.name),
        })
    }

    async fn run_lifecycle(
        &self,
        _identity: &UnitIdentity,
        _inputs: &Value,
        _method: LifecycleMethod,
        _options: LifecycleOptions,
    ) -> Result<()> {
        Ok(())
    }

    async fn status(&self, identity: &UnitIdentity) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot {
            name: identity.name.clone(),
            status: self
                .statuses
                .get(&identity.name)
                .copied()
                .unwrap_or(InstanceStatus::Active),
            outputs: Value::Null,
            error: None,
            updated_at: None,
        })
    }

    async fn list_instances(&self, _filter: &InstanceFilter) -> Result<Vec<StatusSnapshot>> {
        Ok(Vec::new())
    }

    async fn update_code(
        &self,
        _identity: &UnitIdentity,
        _package: Vec<u8>,
        _region: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    async fn search_logs(
        &self,
        _topic: &str,
        _window: TimeWindow,
        _query: Option<&str>,
        _region: Option<&str>,
    ) -> Result<Vec<LogRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}

fn function_unit(name: &str) -> Unit {
    Unit {
        identity: UnitIdentity {
            org: None,
            app: "demo".to_string(),
            stage: "dev".to_string(),
            name: name.to_string(),
            component: "scf".to_string(),
        },
        inputs: json!({ "src": "./code" }),
        deps: Default::default(),
        root: Utf8PathBuf::from("."),
    }
}

fn session(client: Arc<FixedControlPlane>) -> LiveSession {
    let reconciler = Reconciler::new(
        client,
        Arc::new(MemoryObjectStore::new()),
        ReconcilerConfig::default(),
    );
    LiveSession::new(reconciler, DevConfig::default())
}

fn record(seconds: i64, message: &str) -> LogRecord {
    LogRecord {
        timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
        message: message.to_string(),
        source: None,
    }
}

#[tokio::test]
async fn test_dev_requires_function_units() {
    let session = session(Arc::new(FixedControlPlane::default()));
    let mut unit = function_unit("web");
    unit.identity.component = "website".to_string();
    let template = Template {
        units: vec![unit],
        hooks: BTreeMap::new(),
    };

    let err = session
        .run(&template, Arc::new(|_record| {}))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NoFunctionUnits { .. })
    ));
}

#[tokio::test]
async fn test_dev_on_inactive_instance_is_fatal() {
    let mut client = FixedControlPlane::default();
    client
        .statuses
        .insert("api".to_string(), InstanceStatus::Inactive);
    let session = session(Arc::new(client));

    let template = Template {
        units: vec![function_unit("api")],
        hooks: BTreeMap::new(),
    };

    let err = session
        .run(&template, Arc::new(|_record| {}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("deploy it before"));
}

#[tokio::test]
async fn test_tail_emits_only_new_records_across_ticks() {
    let client = Arc::new(FixedControlPlane::default());
    client
        .records
        .lock()
        .unwrap()
        .extend([record(1, "boot"), record(2, "ready")]);

    let tail = LogTail::new(
        client.clone(),
        Duration::from_millis(10),
        Duration::from_secs(3600),
    );

    let (first, marker) = tail.fetch_new("topic", None, &None).await.unwrap();
    assert_eq!(first.len(), 2);

    // nothing new: the marker suppresses the whole window
    let (second, marker) = tail.fetch_new("topic", None, &marker).await.unwrap();
    assert!(second.is_empty());

    // one new record arrives; only it is emitted
    client.records.lock().unwrap().push(record(3, "request"));
    let (third, _marker) = tail.fetch_new("topic", None, &marker).await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].message, "request");
}
