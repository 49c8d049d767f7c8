//! Deploy the resolved template

use crate::cli::{Cli, DeployArgs};
use crate::commands::build_context;
use crate::output;
use anyhow::{bail, Result};
use nimbus_core::types::Action;
use nimbus_engine::{run_with_hooks, RunOptions};
use serde_json::json;
use std::time::Duration;

pub async fn run(args: &DeployArgs, cli: &Cli) -> Result<()> {
    let context = build_context(
        cli,
        Duration::from_millis(args.poll_interval_ms),
        Duration::from_millis(args.poll_timeout_ms),
        Some(args.max_package_size),
    )?;

    let options = RunOptions {
        force: args.force,
        code_only: args.code_only,
    };
    let hook_options = json!({
        "force": args.force,
        "codeOnly": args.code_only,
    });

    let engine = &context.engine;
    let template = context.template.clone();
    let report = run_with_hooks(
        Action::Deploy,
        hook_options,
        context.template.clone(),
        &context.registry,
        async move { engine.deploy(&template, &options).await },
    )
    .await?;

    output::print_report(&report);
    if report.failed() > 0 {
        bail!(
            "{} of {} instances failed to deploy",
            report.failed(),
            report.reports.len()
        );
    }
    Ok(())
}
