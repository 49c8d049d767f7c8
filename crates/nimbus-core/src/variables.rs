//! Variable interpolation over a unit's configuration tree
//!
//! Walks every string leaf and substitutes `${...}` placeholders:
//! identity builtins and environment lookups are resolved eagerly,
//! `${output:unit.field}` references are recorded as dependency edges and
//! only substituted in `All` mode once the referenced unit has outputs.
//!
//! Resolution takes an owned tree and returns a new one; caller-held
//! values are never mutated. Unresolvable placeholders are left intact,
//! which makes resolution idempotent and safe to re-run.

use crate::types::UnitIdentity;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Which placeholder classes to substitute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Identity builtins and environment only; output references are
    /// recorded but left in place
    EnvOnly,

    /// Everything, including output references against the output store
    All,
}

/// Outputs of already-reconciled units, keyed by unit name
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    outputs: BTreeMap<String, Value>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outputs a unit published after reconciliation
    pub fn record(&mut self, unit: impl Into<String>, outputs: Value) {
        self.outputs.insert(unit.into(), outputs);
    }

    /// Walk `path` segments into the named unit's outputs
    pub fn lookup(&self, unit: &str, path: &[&str]) -> Option<&Value> {
        let mut current = self.outputs.get(unit)?;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

/// Result of one resolution pass
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The resolved tree
    pub inputs: Value,

    /// Unit names referenced via `${output:...}`
    pub deps: BTreeSet<String>,
}

/// Resolve placeholders in `inputs`, returning a new tree plus the set of
/// referenced unit names.
pub fn resolve_inputs(
    inputs: &Value,
    identity: &UnitIdentity,
    mode: ResolveMode,
    outputs: &OutputStore,
) -> Resolution {
    let mut ctx = Context {
        identity,
        mode,
        outputs,
        deps: BTreeSet::new(),
    };
    let resolved = resolve_node(inputs, &mut ctx);
    Resolution {
        inputs: resolved,
        deps: ctx.deps,
    }
}

struct Context<'a> {
    identity: &'a UnitIdentity,
    mode: ResolveMode,
    outputs: &'a OutputStore,
    deps: BTreeSet<String>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\s*([^{}]+?)\s*\}").expect("placeholder pattern"))
}

fn whole_placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$\{\s*([^{}]+?)\s*\}$").expect("placeholder pattern"))
}

fn resolve_node(value: &Value, ctx: &mut Context<'_>) -> Value {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_node(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_node(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, ctx: &mut Context<'_>) -> Value {
    // A string that is exactly one placeholder may be replaced wholesale,
    // letting objects and numbers survive substitution untyped.
    if let Some(caps) = whole_placeholder_regex().captures(s) {
        return match lookup_expr(&caps[1], ctx) {
            Some(replacement) => replacement,
            None => Value::String(s.to_string()),
        };
    }

    let replaced = placeholder_regex().replace_all(s, |caps: &Captures<'_>| {
        match lookup_expr(&caps[1], ctx).and_then(|v| inline_text(&v)) {
            Some(text) => text,
            // Unresolvable: keep the placeholder byte-for-byte
            None => caps[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

fn lookup_expr(expr: &str, ctx: &mut Context<'_>) -> Option<Value> {
    if let Some(reference) = expr.strip_prefix("output:") {
        let mut segments = reference.split('.');
        let unit = segments.next().filter(|u| !u.is_empty())?;
        ctx.deps.insert(unit.to_string());

        if ctx.mode == ResolveMode::All {
            let path: Vec<&str> = segments.collect();
            return ctx.outputs.lookup(unit, &path).cloned();
        }
        return None;
    }

    if let Some(name) = expr.strip_prefix("env:") {
        return std::env::var(name).ok().map(Value::String);
    }

    builtin(expr, ctx.identity)
        .map(Value::String)
        .or_else(|| std::env::var(expr).ok().map(Value::String))
}

fn builtin(name: &str, identity: &UnitIdentity) -> Option<String> {
    match name {
        "org" => identity.org.clone(),
        "app" => Some(identity.app.clone()),
        "stage" => Some(identity.stage.clone()),
        "name" => Some(identity.name.clone()),
        "component" => Some(identity.component.clone()),
        _ => None,
    }
}

/// Scalar rendering for mid-string substitution; composite values cannot
/// be inlined and leave the placeholder untouched.
fn inline_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
