//! Live dev session
//!
//! Watches each function unit's source roots, collapses bursts of
//! filesystem events through a debounce window, and pushes the latest
//! on-disk state through the reconciler's code-only fast path. Because a
//! push only starts after the window settles and new events queue behind
//! it, a change landing mid-push triggers exactly one follow-up push with
//! the newest state: last write wins, stale intermediates are never
//! replayed.

use crate::logs::{LogTail, DEFAULT_TAIL_INTERVAL, DEFAULT_TAIL_WINDOW};
use anyhow::{anyhow, Result};
use camino::Utf8PathBuf;
use nimbus_core::types::{
    InstanceStatus, LogRecord, SourceReference, StatusSnapshot, Template, Unit,
};
use nimbus_core::variables::OutputStore;
use nimbus_core::Error;
use nimbus_engine::{Reconciler, RunOptions};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Default settle window for filesystem event bursts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct DevConfig {
    pub debounce: Duration,
    pub tail_interval: Duration,
    pub tail_window: Duration,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            tail_interval: DEFAULT_TAIL_INTERVAL,
            tail_window: DEFAULT_TAIL_WINDOW,
        }
    }
}

/// Sink receiving tailed log records
pub type LogSink = Arc<dyn Fn(LogRecord) + Send + Sync>;

/// Drives dev and logs sessions over a resolved template
pub struct LiveSession {
    reconciler: Reconciler,
    config: DevConfig,
}

impl LiveSession {
    pub fn new(reconciler: Reconciler, config: DevConfig) -> Self {
        Self { reconciler, config }
    }

    /// Watch, push, and tail every function unit until cancelled.
    ///
    /// Units run concurrently; one unit's failure is logged and the
    /// others keep running. The call only fails outright when no unit
    /// could be driven at all.
    pub async fn run(&self, template: &Template, sink: LogSink) -> Result<()> {
        let units = template.function_units();
        if units.is_empty() {
            return Err(Error::no_function_units("dev").into());
        }

        let tasks = units
            .into_iter()
            .map(|unit| self.drive_unit(unit, sink.clone(), true));
        finish_unit_tasks(futures::future::join_all(tasks).await)
    }

    /// Tail logs for every function unit, without code pushes.
    pub async fn logs(&self, template: &Template, sink: LogSink) -> Result<()> {
        let units = template.function_units();
        if units.is_empty() {
            return Err(Error::no_function_units("logs").into());
        }

        let tasks = units
            .into_iter()
            .map(|unit| self.drive_unit(unit, sink.clone(), false));
        finish_unit_tasks(futures::future::join_all(tasks).await)
    }

    /// Watch + push + tail for one unit (or tail only, for logs mode)
    async fn drive_unit(&self, unit: &Unit, sink: LogSink, watch: bool) -> Result<()> {
        let snapshot = self.reconciler.fetch_once(&unit.identity).await?;
        if watch && snapshot.status != InstanceStatus::Active {
            return Err(anyhow!(
                "Instance '{}' is {}; deploy it before starting a dev session",
                unit.identity,
                snapshot.status
            ));
        }
        let topic = log_topic(unit, &snapshot);
        let region = region_of(unit).map(str::to_string);

        let tail = LogTail::new(
            self.reconciler.client().clone(),
            self.config.tail_interval,
            self.config.tail_window,
        );
        let tail_task = tail.tail(&topic, region.as_deref(), move |record| sink(record));

        if !watch {
            return tail_task.await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // watcher lives for the whole session; drops (and stops) with it
        let _watcher = start_watcher(unit, tx)?;
        info!("Watching {} for changes", unit.identity);

        let watch_task = debounce_loop(rx, self.config.debounce, || self.push_unit(unit));

        tokio::select! {
            result = watch_task => result,
            result = tail_task => result,
        }
    }

    /// One settled window: re-check the remote state, then push code.
    async fn push_unit(&self, unit: &Unit) -> Result<()> {
        let snapshot = self.reconciler.fetch_once(&unit.identity).await?;
        if snapshot.status != InstanceStatus::Active {
            return Err(anyhow!(
                "Instance '{}' is {}; deploy it before starting a dev session",
                unit.identity,
                snapshot.status
            ));
        }

        info!("Pushing updated code for {}", unit.identity);
        let options = RunOptions {
            force: false,
            code_only: true,
        };
        self.reconciler
            .deploy(unit, &OutputStore::new(), &options)
            .await?;
        Ok(())
    }
}

/// Collapse filesystem events through the debounce window, then push.
///
/// Each incoming event resets the window; the pending work is a single
/// slot, so any number of queued events produce one push of the latest
/// state. Returns when the event source closes.
async fn debounce_loop<F, Fut>(
    mut events: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    mut push: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        if events.recv().await.is_none() {
            return Ok(());
        }
        // settle: every further event restarts the window
        while let Ok(Some(())) = tokio::time::timeout(debounce, events.recv()).await {}
        push().await?;
    }
}

fn start_watcher(unit: &Unit, tx: mpsc::UnboundedSender<()>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(
        move |result: std::result::Result<notify::Event, notify::Error>| {
            if result.is_ok() {
                let _ = tx.send(());
            }
        },
    )?;

    let roots = source_roots(unit);
    if roots.is_empty() {
        return Err(anyhow!(
            "Instance '{}' has no local source to watch",
            unit.identity
        ));
    }
    for root in &roots {
        watcher.watch(root.as_std_path(), RecursiveMode::Recursive)?;
    }
    Ok(watcher)
}

/// Local source roots of a unit, resolved against its declaration dir
fn source_roots(unit: &Unit) -> Vec<Utf8PathBuf> {
    unit.source_references()
        .into_iter()
        .filter_map(|(_, source)| match source {
            SourceReference::Local(local) => {
                let root = Utf8PathBuf::from(local.root.as_str());
                Some(if root.is_absolute() {
                    root
                } else {
                    unit.root.join(root)
                })
            }
            SourceReference::Remote { .. } => None,
        })
        .collect()
}

fn log_topic(unit: &Unit, snapshot: &StatusSnapshot) -> String {
    snapshot
        .outputs
        .get("logTopic")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| unit.identity.qualified_name())
}

fn region_of(unit: &Unit) -> Option<&str> {
    unit.inputs.get("region").and_then(Value::as_str)
}

/// Per-unit failures are logged; the session only fails when every unit
/// failed.
fn finish_unit_tasks(results: Vec<Result<()>>) -> Result<()> {
    let total = results.len();
    let mut errors: Vec<anyhow::Error> = results.into_iter().filter_map(Result::err).collect();
    for err in &errors {
        warn!("Dev session task failed: {err:#}");
    }
    if !errors.is_empty() && errors.len() == total {
        return Err(errors.swap_remove(0));
    }
    Ok(())
}
