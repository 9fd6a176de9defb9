//! Ping command implementation

use anyhow::{Context, Result};

use crate::context::CliContext;
use crate::output::{format_connection, print_json, print_success};

/// Execute the ping command
///
/// Establishes the connection (creating the tunnel for remote profiles) and
/// probes the engine once.
pub async fn ping_command(ctx: &CliContext) -> Result<()> {
    let connection = ctx.connection()?;

    let engine = connection
        .engine()
        .await
        .with_context(|| format!("Failed to connect to '{}'", ctx.target_name()))?;
    engine
        .ping()
        .await
        .with_context(|| format!("Engine at {} did not answer", engine.endpoint().display()))?;

    let info = connection.info();
    if ctx.json {
        return print_json(&info);
    }

    print_success(&format!("Engine reachable via '{}'", ctx.target_name()));
    print!("{}", format_connection(&info));
    Ok(())
}
