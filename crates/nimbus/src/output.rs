//! Terminal output for batch reports, listings, and log records

use console::style;
use nimbus_core::types::{BatchReport, LogRecord, StatusSnapshot, UnitOutcome};
use serde_json::{json, Value};

/// Print the per-unit outcome list and the derived summary counts
pub fn print_report(report: &BatchReport) {
    for entry in &report.reports {
        match &entry.outcome {
            UnitOutcome::Ready(snapshot) => {
                println!(
                    "  {} {} {}",
                    style("ok").green().bold(),
                    entry.unit,
                    style(snapshot.status).dim()
                );
                if let Some(outputs) = non_empty_outputs(snapshot) {
                    println!("     {}", style(outputs).dim());
                }
            }
            UnitOutcome::Failed { error } => {
                println!(
                    "  {} {} {}",
                    style("err").red().bold(),
                    entry.unit,
                    style(error).red()
                );
            }
        }
    }

    let summary = format!(
        "{}: {} succeeded, {} failed",
        report.action,
        report.succeeded(),
        report.failed()
    );
    if report.failed() > 0 {
        println!("{}", style(summary).red());
    } else {
        println!("{}", style(summary).green());
    }
}

/// Batch report as a JSON value (for --json consumers)
pub fn report_to_json(report: &BatchReport) -> Value {
    let entries: Vec<Value> = report
        .reports
        .iter()
        .map(|entry| match &entry.outcome {
            UnitOutcome::Ready(snapshot) => json!({
                "unit": entry.unit,
                "status": snapshot.status,
                "outputs": snapshot.outputs,
            }),
            UnitOutcome::Failed { error } => json!({
                "unit": entry.unit,
                "error": error,
            }),
        })
        .collect();

    json!({
        "action": report.action.as_str(),
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "instances": entries,
    })
}

/// Print one listing row per instance
pub fn print_snapshots(snapshots: &[StatusSnapshot]) {
    if snapshots.is_empty() {
        println!("{}", style("No instances found").dim());
        return;
    }
    for snapshot in snapshots {
        println!(
            "  {:<24} {}",
            snapshot.name,
            style(snapshot.status).dim()
        );
    }
}

/// Print one tailed log record
pub fn print_log_record(record: &LogRecord) {
    let prefix = record
        .source
        .as_deref()
        .map(|source| format!("[{source}] "))
        .unwrap_or_default();
    println!(
        "{} {}{}",
        style(record.timestamp.to_rfc3339()).dim(),
        prefix,
        record.message
    );
}

fn non_empty_outputs(snapshot: &StatusSnapshot) -> Option<String> {
    match &snapshot.outputs {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        outputs => serde_json::to_string(outputs).ok(),
    }
}
