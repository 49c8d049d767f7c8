//! Tail instance logs without code pushes

use crate::cli::{Cli, LogsArgs};
use crate::commands::build_context;
use crate::output;
use anyhow::Result;
use nimbus_core::types::{Action, BatchReport};
use nimbus_dev::{DevConfig, LiveSession, DEFAULT_DEBOUNCE, DEFAULT_TAIL_WINDOW};
use nimbus_engine::run_with_hooks;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: &LogsArgs, cli: &Cli) -> Result<()> {
    let context = build_context(cli, Duration::ZERO, Duration::ZERO, None)?;

    let session = LiveSession::new(
        context.engine.reconciler().clone(),
        DevConfig {
            debounce: DEFAULT_DEBOUNCE,
            tail_interval: Duration::from_millis(args.tail_interval_ms),
            tail_window: DEFAULT_TAIL_WINDOW,
        },
    );

    let template = context.template.clone();
    run_with_hooks(
        Action::Logs,
        json!({ "tailIntervalMs": args.tail_interval_ms }),
        context.template.clone(),
        &context.registry,
        async move {
            tokio::select! {
                result = session.logs(&template, Arc::new(|record| output::print_log_record(&record))) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Stopping log tail"),
            }
            Ok(BatchReport::new(Action::Logs))
        },
    )
    .await?;
    Ok(())
}
