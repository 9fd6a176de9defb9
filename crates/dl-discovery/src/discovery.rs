//! Listing and inspecting workloads over a connection
//!
//! Every engine query goes through [`ConnectionManager::execute`], so remote
//! queries inherit the retry policy and re-establish a dropped tunnel.

use serde::Serialize;

use dl_connection::ConnectionManager;
use dl_core::traits::{CommandOptions, CommandOutput, RemoteCommandRunner};

use crate::aggregate::{aggregate, reconcile_with_manifest, resolve_path, DiscoveredWorkload, DiscoverySummary};
use crate::error::DiscoveryError;
use crate::manifest::{declared_services, MANIFEST_CANDIDATES};
use crate::query::{bulk_inspect_command, read_manifest_command};
use crate::record::{parse_records, ContainerRecord};

/// Result of listing every workload
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub workloads: Vec<DiscoveredWorkload>,
    pub summary: DiscoverySummary,
}

async fn run(
    connection: &ConnectionManager,
    runner: &dyn RemoteCommandRunner,
    command: &str,
    options: &CommandOptions,
) -> Result<CommandOutput, DiscoveryError> {
    let output = connection
        .execute(move || runner.execute(command, options))
        .await?;
    Ok(output)
}

async fn inspect(
    connection: &ConnectionManager,
    runner: &dyn RemoteCommandRunner,
    project: Option<&str>,
) -> Result<Vec<ContainerRecord>, DiscoveryError> {
    let command = bulk_inspect_command(project);
    let output = run(connection, runner, &command, &CommandOptions::default()).await?;

    if !output.success() {
        return Err(DiscoveryError::CommandFailed {
            command,
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(parse_records(&output.stdout))
}

/// List every composition project visible to the engine
///
/// Issues exactly one inspect command regardless of how many projects and
/// containers exist.
pub async fn list_all(
    connection: &ConnectionManager,
    runner: &dyn RemoteCommandRunner,
    base_path: &str,
) -> Result<DiscoveryReport, DiscoveryError> {
    let records = inspect(connection, runner, None).await?;
    let workloads = aggregate(&records, base_path);
    let summary = DiscoverySummary::from_workloads(&workloads);

    tracing::info!(
        "Discovered {} projects on {} ({} running, {} partial, {} stopped)",
        summary.total,
        runner.describe(),
        summary.running,
        summary.partial,
        summary.stopped
    );
    Ok(DiscoveryReport { workloads, summary })
}

/// Inspect one project, preferring its manifest's declared services
///
/// Returns `None` when the project has no containers and no readable
/// manifest under the resolved path.
pub async fn get_one(
    connection: &ConnectionManager,
    runner: &dyn RemoteCommandRunner,
    project: &str,
    base_path: &str,
) -> Result<Option<DiscoveredWorkload>, DiscoveryError> {
    let records = inspect(connection, runner, Some(project)).await?;
    let records: Vec<&ContainerRecord> = records.iter().filter(|r| r.project == project).collect();
    let path = resolve_path(&records, project, base_path);

    let options = CommandOptions::in_dir(path.clone());
    for candidate in MANIFEST_CANDIDATES {
        let output = run(connection, runner, &read_manifest_command(candidate), &options).await?;
        if !output.success() {
            tracing::debug!("No {} in {}", candidate, path);
            continue;
        }

        match declared_services(&output.stdout) {
            Ok(declared) => {
                let manifest_path = format!("{}/{}", path, candidate);
                tracing::debug!("Read {} services from {}", declared.len(), manifest_path);
                return Ok(Some(reconcile_with_manifest(
                    project,
                    &path,
                    &records,
                    declared,
                    manifest_path,
                )));
            }
            Err(e) => tracing::warn!("Ignoring {}/{}: {}", path, candidate, e),
        }
    }

    if records.is_empty() {
        return Ok(None);
    }

    let owned: Vec<ContainerRecord> = records.into_iter().cloned().collect();
    Ok(aggregate(&owned, base_path).into_iter().next())
}
