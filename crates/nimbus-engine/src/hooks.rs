//! Hook middleware
//!
//! Manifests declare `"before:<action>|all"` / `"after:<action>|all"`
//! mappings to handler names; handlers themselves are closures registered
//! by the embedding binary at startup. There is no dynamic code loading:
//! a declared hook whose handler is not registered is fatal before the
//! action body runs.
//!
//! After-hooks always run, including when the body fails; they receive
//! the body's error text and the body's error is returned once they
//! finish. An after-hook failure on an otherwise successful body becomes
//! the action error.

use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use nimbus_core::types::{Action, BatchReport, Template};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A registered hook handler
pub type HookFn = Arc<dyn Fn(HookInvocation) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Arguments every hook receives
#[derive(Clone)]
pub struct HookInvocation {
    pub action: Action,

    /// The action's options, serialized for hook consumption
    pub options: Value,

    pub template: Arc<Template>,

    /// Error text of the failed body; only set for after-hooks
    pub error: Option<String>,
}

/// Handler-name → closure registry supplied by the caller at startup
#[derive(Clone, Default)]
pub struct HookRegistry {
    handlers: BTreeMap<String, HookFn>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a boxed handler under a name
    pub fn register(&mut self, name: impl Into<String>, hook: HookFn) {
        self.handlers.insert(name.into(), hook);
    }

    /// Register an async closure under a name
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(HookInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let hook = Arc::new(hook);
        self.register(
            name,
            Arc::new(move |invocation| {
                let hook = hook.clone();
                Box::pin(async move { hook(invocation).await })
            }),
        );
    }

    fn get(&self, name: &str) -> Option<HookFn> {
        self.handlers.get(name).cloned()
    }
}

/// Wrap a batch action body with its declared before/after hooks.
pub async fn run_with_hooks<F>(
    action: Action,
    options: Value,
    template: Arc<Template>,
    registry: &HookRegistry,
    body: F,
) -> Result<BatchReport>
where
    F: Future<Output = Result<BatchReport>>,
{
    // Resolve both phases up front: a broken after-hook must fail the
    // invocation before the body mutates anything remotely.
    let before = resolve_phase(registry, &template.hooks, "before", action)?;
    let after = resolve_phase(registry, &template.hooks, "after", action)?;

    for (key, hook) in &before {
        debug!("Running hook {key}");
        hook(HookInvocation {
            action,
            options: options.clone(),
            template: template.clone(),
            error: None,
        })
        .await
        .with_context(|| format!("Hook '{key}' failed"))?;
    }

    let result = body.await;
    let error_text = result.as_ref().err().map(|err| format!("{err:#}"));

    let mut after_error: Option<String> = None;
    for (key, hook) in &after {
        debug!("Running hook {key}");
        if let Err(err) = hook(HookInvocation {
            action,
            options: options.clone(),
            template: template.clone(),
            error: error_text.clone(),
        })
        .await
        {
            after_error.get_or_insert(format!("Hook '{key}' failed: {err:#}"));
        }
    }

    match (result, after_error) {
        (Err(err), _) => Err(err),
        (Ok(report), None) => Ok(report),
        (Ok(_), Some(message)) => Err(anyhow!(message)),
    }
}

/// Collect the registered handlers matching one phase of an action, in
/// hook-map order. A declared-but-unregistered handler is fatal and the
/// error names both the hook key and the handler string.
fn resolve_phase(
    registry: &HookRegistry,
    hooks: &BTreeMap<String, String>,
    phase: &str,
    action: Action,
) -> Result<Vec<(String, HookFn)>> {
    let exact = format!("{phase}:{}", action.as_str());
    let catch_all = format!("{phase}:all");

    let mut resolved = Vec::new();
    for (key, handler) in hooks {
        if key != &exact && key != &catch_all {
            continue;
        }
        let hook = registry
            .get(handler)
            .ok_or_else(|| nimbus_core::Error::unknown_hook(key, handler))?;
        resolved.push((key.clone(), hook));
    }
    Ok(resolved)
}
