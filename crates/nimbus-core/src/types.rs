//! Shared types: units, templates, remote status, and batch results

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Component kinds eligible for the code-only fast path and dev mode
pub const FUNCTION_COMPONENTS: &[&str] = &["scf", "multi-scf"];

/// Component kind whose source roots are declared per function
pub const MULTI_FUNCTION_COMPONENT: &str = "multi-scf";

/// Identity of one deployable instance. Immutable after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitIdentity {
    /// Owning organization; filled in by the control plane when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// Application the instance belongs to
    pub app: String,

    /// Deployment stage (dev, staging, prod, ...)
    pub stage: String,

    /// Instance name, unique within app/stage
    pub name: String,

    /// Component kind implementing the instance
    pub component: String,
}

impl UnitIdentity {
    /// Fully qualified instance path used in messages and cache keys
    pub fn qualified_name(&self) -> String {
        format!("{}/{}/{}", self.app, self.stage, self.name)
    }
}

impl std::fmt::Display for UnitIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// A local source tree with include/exclude globs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSource {
    /// Source root, relative to the unit's declaration directory
    pub root: String,

    /// Include globs; empty means everything under the root
    pub include: Vec<String>,

    /// Exclude globs applied after includes
    pub exclude: Vec<String>,
}

/// Reference to source material inside a unit's inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceReference {
    /// Local path plus glob sets; packaged and uploaded before deploy
    Local(LocalSource),

    /// Already-uploaded object, addressed by URL
    Remote { url: String },
}

impl SourceReference {
    /// Parse a source reference out of an inputs value, if present
    pub fn from_value(value: &Value) -> Option<SourceReference> {
        match value {
            Value::String(s) => {
                if s.starts_with("http://") || s.starts_with("https://") {
                    Some(SourceReference::Remote { url: s.clone() })
                } else {
                    Some(SourceReference::Local(LocalSource {
                        root: s.clone(),
                        include: Vec::new(),
                        exclude: Vec::new(),
                    }))
                }
            }
            Value::Object(map) => {
                if let Some(url) = map.get("url").and_then(Value::as_str) {
                    return Some(SourceReference::Remote {
                        url: url.to_string(),
                    });
                }
                let root = map.get("src").and_then(Value::as_str)?;
                Some(SourceReference::Local(LocalSource {
                    root: root.to_string(),
                    include: string_list(map.get("include")),
                    exclude: string_list(map.get("exclude")),
                }))
            }
            _ => None,
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// One deployable instance: identity, configuration inputs, and the
/// dependency edges recorded during variable resolution.
#[derive(Debug, Clone)]
pub struct Unit {
    pub identity: UnitIdentity,

    /// Arbitrary nested configuration; one nested value may be a source
    /// reference under the `src` key
    pub inputs: Value,

    /// Names of units this unit's inputs reference via `${output:...}`.
    /// Built during resolution, never supplied by the user.
    pub deps: BTreeSet<String>,

    /// Directory the unit's declaration was loaded from; relative source
    /// paths resolve against it
    pub root: Utf8PathBuf,
}

impl Unit {
    /// Whether this unit supports the code-only fast path and dev mode
    pub fn is_function_kind(&self) -> bool {
        FUNCTION_COMPONENTS.contains(&self.identity.component.as_str())
    }

    /// Whether source roots are declared per function
    pub fn is_multi_function(&self) -> bool {
        self.identity.component == MULTI_FUNCTION_COMPONENT
    }

    /// The unit's source references. Standard components carry at most one
    /// under `inputs.src`; the multi-function component carries one per
    /// entry of `inputs.functions`.
    pub fn source_references(&self) -> Vec<(Option<String>, SourceReference)> {
        if self.is_multi_function() {
            let mut refs = Vec::new();
            if let Some(functions) = self.inputs.get("functions").and_then(Value::as_object) {
                // BTreeMap iteration keeps function order deterministic
                let ordered: BTreeMap<&String, &Value> = functions.iter().collect();
                for (name, decl) in ordered {
                    if let Some(src) = decl.get("src").and_then(SourceReference::from_value) {
                        refs.push((Some(name.clone()), src));
                    }
                }
            }
            return refs;
        }

        self.inputs
            .get("src")
            .and_then(SourceReference::from_value)
            .map(|src| vec![(None, src)])
            .unwrap_or_default()
    }

    /// Whether any local source material is referenced
    pub fn has_local_source(&self) -> bool {
        self.source_references()
            .iter()
            .any(|(_, src)| matches!(src, SourceReference::Local(_)))
    }
}

/// Top-level batch actions a template can be driven through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy,
    Remove,
    Info,
    List,
    Dev,
    Logs,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Remove => "remove",
            Action::Info => "info",
            Action::List => "list",
            Action::Dev => "dev",
            Action::Logs => "logs",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote instance status as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Active,
    Inactive,
    Deploying,
    Removing,
    Error,
}

impl InstanceStatus {
    /// Transient states keep the poll loop waiting
    pub fn is_transient(&self) -> bool {
        matches!(self, InstanceStatus::Deploying | InstanceStatus::Removing)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Inactive => "inactive",
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Removing => "removing",
            InstanceStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Normalized remote state for one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Instance name
    pub name: String,

    /// Current lifecycle status
    pub status: InstanceStatus,

    /// Outputs published by the component (URLs, ARNs, ...)
    #[serde(default)]
    pub outputs: Value,

    /// Remote-side error detail, when status is error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Last remote update time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One record from the remote log search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Half-open time window for log queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Outcome of processing one unit within a batch
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    /// The unit reached a terminal state; its snapshot is attached
    Ready(StatusSnapshot),

    /// The unit failed; siblings keep processing
    Failed { error: String },
}

/// Per-unit entry of a batch result list
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit: String,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    pub fn ready(unit: impl Into<String>, snapshot: StatusSnapshot) -> Self {
        Self {
            unit: unit.into(),
            outcome: UnitOutcome::Ready(snapshot),
        }
    }

    pub fn failed(unit: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            outcome: UnitOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Failed { .. })
    }

    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        match &self.outcome {
            UnitOutcome::Ready(snapshot) => Some(snapshot),
            UnitOutcome::Failed { .. } => None,
        }
    }
}

/// Result of one batch action: a report per scheduled unit, in processing
/// order, even under partial failure.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub action: Action,
    pub reports: Vec<UnitReport>,
}

impl BatchReport {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            reports: Vec::new(),
        }
    }

    pub fn push(&mut self, report: UnitReport) {
        self.reports.push(report);
    }

    /// Number of units that reached a terminal snapshot
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| !r.is_error()).count()
    }

    /// Number of units that failed
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_error()).count()
    }
}

/// A resolved template: the ordered unit list plus hook declarations
/// extracted from the manifest root.
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub units: Vec<Unit>,

    /// `"before:<action>|all"` / `"after:<action>|all"` -> handler key
    pub hooks: BTreeMap<String, String>,
}

impl Template {
    /// Units of function kind, the only ones dev/logs operate on
    pub fn function_units(&self) -> Vec<&Unit> {
        self.units.iter().filter(|u| u.is_function_kind()).collect()
    }
}
