//! Show current instance status, one fetch per unit

use crate::cli::{Cli, InfoArgs};
use crate::commands::build_context;
use crate::output;
use anyhow::Result;
use nimbus_core::types::Action;
use nimbus_engine::run_with_hooks;
use serde_json::json;
use std::time::Duration;

pub async fn run(args: &InfoArgs, cli: &Cli) -> Result<()> {
    // info never waits: single fetch per instance
    let context = build_context(cli, Duration::ZERO, Duration::ZERO, None)?;

    let engine = &context.engine;
    let template = context.template.clone();
    let report = run_with_hooks(
        Action::Info,
        json!({ "json": args.json }),
        context.template.clone(),
        &context.registry,
        async move { engine.info(&template).await },
    )
    .await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output::report_to_json(&report))?
        );
    } else {
        output::print_report(&report);
    }
    Ok(())
}
