//! Inspect command implementation

use anyhow::{bail, Context, Result};

use dl_discovery::get_one;

use crate::context::CliContext;
use crate::output::{format_workload, print_json, print_workload_status};

/// Execute the inspect command
pub async fn inspect_command(ctx: &CliContext, project: &str, base_path: Option<&str>) -> Result<()> {
    let connection = ctx.connection()?;
    let runner = connection.runner();
    let base_path = ctx.base_path(base_path);

    let workload = get_one(&connection, runner.as_ref(), project, &base_path)
        .await
        .with_context(|| format!("Failed to inspect '{}' on '{}'", project, ctx.target_name()))?;

    let Some(workload) = workload else {
        bail!(
            "Project '{}' not found on '{}' (no containers and no manifest under {})",
            project,
            ctx.target_name(),
            base_path
        );
    };

    if ctx.json {
        return print_json(&workload);
    }

    print_workload_status(&workload);
    print!("{}", format_workload(&workload));
    Ok(())
}
