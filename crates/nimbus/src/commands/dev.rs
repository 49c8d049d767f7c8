//! Live dev session: watch sources, push code, tail logs

use crate::cli::{Cli, DevArgs};
use crate::commands::build_context;
use crate::output;
use anyhow::Result;
use nimbus_core::types::{Action, BatchReport};
use nimbus_dev::{DevConfig, LiveSession, DEFAULT_TAIL_WINDOW};
use nimbus_engine::run_with_hooks;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: &DevArgs, cli: &Cli) -> Result<()> {
    let context = build_context(
        cli,
        Duration::from_millis(1_000),
        Duration::from_millis(300_000),
        None,
    )?;

    let session = LiveSession::new(
        context.engine.reconciler().clone(),
        DevConfig {
            debounce: Duration::from_millis(args.debounce_ms),
            tail_interval: Duration::from_millis(args.tail_interval_ms),
            tail_window: DEFAULT_TAIL_WINDOW,
        },
    );

    let template = context.template.clone();
    run_with_hooks(
        Action::Dev,
        json!({ "debounceMs": args.debounce_ms }),
        context.template.clone(),
        &context.registry,
        async move {
            tokio::select! {
                result = session.run(&template, Arc::new(|record| output::print_log_record(&record))) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Stopping dev session"),
            }
            Ok(BatchReport::new(Action::Dev))
        },
    )
    .await?;
    Ok(())
}
