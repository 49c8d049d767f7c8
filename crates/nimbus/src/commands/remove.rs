//! Tear the resolved template down

use crate::cli::{Cli, RemoveArgs};
use crate::commands::build_context;
use crate::output;
use anyhow::{bail, Result};
use nimbus_core::types::Action;
use nimbus_engine::run_with_hooks;
use serde_json::json;
use std::time::Duration;

pub async fn run(args: &RemoveArgs, cli: &Cli) -> Result<()> {
    let context = build_context(
        cli,
        Duration::from_millis(args.poll_interval_ms),
        Duration::from_millis(args.poll_timeout_ms),
        None,
    )?;

    let engine = &context.engine;
    let template = context.template.clone();
    let report = run_with_hooks(
        Action::Remove,
        json!({}),
        context.template.clone(),
        &context.registry,
        async move { engine.remove(&template).await },
    )
    .await?;

    output::print_report(&report);
    if report.failed() > 0 {
        bail!(
            "{} of {} instances failed to remove",
            report.failed(),
            report.reports.len()
        );
    }
    Ok(())
}
