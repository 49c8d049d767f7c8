//! List instances known to the control plane

use crate::cli::{Cli, ListArgs};
use crate::commands::{build_context, build_engine};
use crate::output;
use anyhow::Result;
use nimbus_core::types::{Action, BatchReport, StatusSnapshot};
use nimbus_engine::{run_with_hooks, InstanceFilter};
use serde_json::json;
use std::time::Duration;

pub async fn run(args: &ListArgs, cli: &Cli) -> Result<()> {
    let snapshots = match build_context(cli, Duration::ZERO, Duration::ZERO, None) {
        Ok(context) => {
            // flags win; the resolved template fills in app/stage defaults
            let base = context
                .template
                .units
                .first()
                .map(|unit| unit.identity.clone());
            let filter = InstanceFilter {
                org: base.as_ref().and_then(|identity| identity.org.clone()),
                app: args
                    .app
                    .clone()
                    .or_else(|| base.as_ref().map(|identity| identity.app.clone())),
                stage: args
                    .stage
                    .clone()
                    .or_else(|| base.as_ref().map(|identity| identity.stage.clone())),
                name: args.name.clone(),
            };
            listed_with_hooks(&context, args, filter).await?
        }
        // explicit filters work without a local template
        Err(_) if args.app.is_some() => {
            let engine = build_engine(cli, Duration::ZERO, Duration::ZERO, None);
            engine
                .list(&InstanceFilter {
                    org: None,
                    app: args.app.clone(),
                    stage: args.stage.clone(),
                    name: args.name.clone(),
                })
                .await?
        }
        Err(err) => return Err(err),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        output::print_snapshots(&snapshots);
    }
    Ok(())
}

async fn listed_with_hooks(
    context: &crate::commands::CommandContext,
    args: &ListArgs,
    filter: InstanceFilter,
) -> Result<Vec<StatusSnapshot>> {
    let engine = &context.engine;
    let listed = std::cell::RefCell::new(Vec::new());
    let sink = &listed;

    run_with_hooks(
        Action::List,
        json!({ "json": args.json }),
        context.template.clone(),
        &context.registry,
        async move {
            sink.replace(engine.list(&filter).await?);
            Ok(BatchReport::new(Action::List))
        },
    )
    .await?;

    Ok(listed.into_inner())
}
