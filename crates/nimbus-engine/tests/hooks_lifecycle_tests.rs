//! Hook middleware: ordering, failure policy, and resolution errors

mod common;

use common::{template, unit};
use nimbus_core::types::{Action, BatchReport, Template};
use nimbus_core::Error;
use nimbus_engine::{run_with_hooks, HookRegistry};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn template_with_hooks(hooks: &[(&str, &str)]) -> Arc<Template> {
    let mut t = template(vec![unit("api", &[])]);
    for (key, handler) in hooks {
        t.hooks.insert(key.to_string(), handler.to_string());
    }
    Arc::new(t)
}

fn recording_registry(log: Arc<Mutex<Vec<String>>>, names: &[&str]) -> HookRegistry {
    let mut registry = HookRegistry::new();
    for name in names {
        let log = log.clone();
        let name = name.to_string();
        registry.register_fn(name.clone(), move |invocation| {
            let log = log.clone();
            let name = name.clone();
            async move {
                let suffix = invocation
                    .error
                    .map(|e| format!(" error={e}"))
                    .unwrap_or_default();
                log.lock().unwrap().push(format!("{name}{suffix}"));
                Ok(())
            }
        });
    }
    registry
}

#[tokio::test]
async fn test_before_and_after_run_around_body() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(log.clone(), &["setup", "teardown"]);
    let template = template_with_hooks(&[("before:deploy", "setup"), ("after:deploy", "teardown")]);

    let body_log = log.clone();
    let report = run_with_hooks(Action::Deploy, json!({}), template, &registry, async move {
        body_log.lock().unwrap().push("body".to_string());
        Ok(BatchReport::new(Action::Deploy))
    })
    .await
    .unwrap();

    assert_eq!(report.reports.len(), 0);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["setup", "body", "teardown"]
    );
}

#[tokio::test]
async fn test_all_hooks_match_every_action() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(log.clone(), &["generic", "specific"]);
    let template = template_with_hooks(&[
        ("before:all", "generic"),
        ("before:remove", "specific"),
        ("before:deploy", "specific"),
    ]);

    run_with_hooks(
        Action::Remove,
        json!({}),
        template,
        &registry,
        async { Ok(BatchReport::new(Action::Remove)) },
    )
    .await
    .unwrap();

    // "before:all" sorts ahead of "before:remove"; "before:deploy" is
    // filtered out for a remove action
    assert_eq!(log.lock().unwrap().as_slice(), ["generic", "specific"]);
}

#[tokio::test]
async fn test_after_hooks_run_when_body_fails() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(log.clone(), &["teardown"]);
    let template = template_with_hooks(&[("after:deploy", "teardown")]);

    let err = run_with_hooks(
        Action::Deploy,
        json!({}),
        template,
        &registry,
        async { Err(anyhow::anyhow!("batch exploded")) },
    )
    .await
    .unwrap_err();

    // the body's error survives, and the after-hook saw its text
    assert!(err.to_string().contains("batch exploded"));
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("teardown error="));
    assert!(log[0].contains("batch exploded"));
}

#[tokio::test]
async fn test_unknown_handler_is_fatal_before_body() {
    let registry = HookRegistry::new();
    let template = template_with_hooks(&[("before:deploy", "does_not_exist")]);

    let body_ran = Arc::new(Mutex::new(false));
    let flag = body_ran.clone();
    let err = run_with_hooks(Action::Deploy, json!({}), template, &registry, async move {
        *flag.lock().unwrap() = true;
        Ok(BatchReport::new(Action::Deploy))
    })
    .await
    .unwrap_err();

    match err.downcast_ref::<Error>() {
        Some(Error::UnknownHook { key, handler }) => {
            assert_eq!(key, "before:deploy");
            assert_eq!(handler, "does_not_exist");
        }
        other => panic!("expected unknown hook error, got {other:?}"),
    }
    assert!(!*body_ran.lock().unwrap());
}

#[tokio::test]
async fn test_unknown_after_handler_also_blocks_body() {
    let registry = HookRegistry::new();
    let template = template_with_hooks(&[("after:deploy", "missing")]);

    let body_ran = Arc::new(Mutex::new(false));
    let flag = body_ran.clone();
    let result = run_with_hooks(Action::Deploy, json!({}), template, &registry, async move {
        *flag.lock().unwrap() = true;
        Ok(BatchReport::new(Action::Deploy))
    })
    .await;

    assert!(result.is_err());
    assert!(!*body_ran.lock().unwrap());
}

#[tokio::test]
async fn test_failing_before_hook_aborts_action() {
    let mut registry = HookRegistry::new();
    registry.register_fn("boom", |_invocation| async {
        Err(anyhow::anyhow!("hook refused"))
    });
    let template = template_with_hooks(&[("before:deploy", "boom")]);

    let body_ran = Arc::new(Mutex::new(false));
    let flag = body_ran.clone();
    let err = run_with_hooks(Action::Deploy, json!({}), template, &registry, async move {
        *flag.lock().unwrap() = true;
        Ok(BatchReport::new(Action::Deploy))
    })
    .await
    .unwrap_err();

    assert!(err.to_string().contains("before:deploy"));
    assert!(!*body_ran.lock().unwrap());
}

#[tokio::test]
async fn test_failing_after_hook_fails_successful_body() {
    let mut registry = HookRegistry::new();
    registry.register_fn("boom", |_invocation| async {
        Err(anyhow::anyhow!("cleanup failed"))
    });
    let template = template_with_hooks(&[("after:deploy", "boom")]);

    let err = run_with_hooks(
        Action::Deploy,
        json!({}),
        template,
        &registry,
        async { Ok(BatchReport::new(Action::Deploy)) },
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("after:deploy"));
    assert!(err.to_string().contains("cleanup failed"));
}

#[tokio::test]
async fn test_hooks_receive_action_and_template() {
    let seen = Arc::new(Mutex::new(None));
    let mut registry = HookRegistry::new();
    let sink = seen.clone();
    registry.register_fn("inspect", move |invocation| {
        let sink = sink.clone();
        async move {
            *sink.lock().unwrap() = Some((
                invocation.action,
                invocation.template.units.len(),
                invocation.options["force"].clone(),
            ));
            Ok(())
        }
    });
    let template = template_with_hooks(&[("before:deploy", "inspect")]);

    run_with_hooks(
        Action::Deploy,
        json!({ "force": true }),
        template,
        &registry,
        async { Ok(BatchReport::new(Action::Deploy)) },
    )
    .await
    .unwrap();

    let seen = seen.lock().unwrap();
    let (action, unit_count, force) = seen.as_ref().unwrap();
    assert_eq!(*action, Action::Deploy);
    assert_eq!(*unit_count, 1);
    assert_eq!(*force, json!(true));
}
