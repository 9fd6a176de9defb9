//! List command implementation

use anyhow::{Context, Result};

use dl_discovery::{list_all, WorkloadStatus};

use crate::context::CliContext;
use crate::output::{format_summary, format_workloads, print_json, print_warning};

/// Execute the list command
pub async fn list_command(ctx: &CliContext, base_path: Option<&str>) -> Result<()> {
    let connection = ctx.connection()?;
    let runner = connection.runner();
    let base_path = ctx.base_path(base_path);

    let report = list_all(&connection, runner.as_ref(), &base_path)
        .await
        .with_context(|| format!("Failed to list projects on '{}'", ctx.target_name()))?;

    if ctx.json {
        return print_json(&report);
    }

    println!("{}", format_workloads(&report.workloads));
    println!("{}", format_summary(&report.summary));

    for workload in &report.workloads {
        if workload.status != WorkloadStatus::Running && !workload.issues.is_empty() {
            print_warning(&format!("{}: {}", workload.name, workload.issues.join("; ")));
        }
    }

    Ok(())
}
