//! Grouping containers into workloads and classifying them

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::manifest::DEFAULT_MANIFEST;
use crate::record::{ContainerRecord, ContainerState};

/// Overall state of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Running,
    Partial,
    Stopped,
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadStatus::Running => write!(f, "running"),
            WorkloadStatus::Partial => write!(f, "partial"),
            WorkloadStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// What a workload summary was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// Container labels only
    Labels,
    /// Container labels reconciled with the declared services
    Manifest,
}

/// A composition project as observed on the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredWorkload {
    pub name: String,
    pub path: String,
    pub estimated_manifest_path: String,
    pub services: Vec<String>,
    pub status: WorkloadStatus,
    pub running_count: usize,
    pub total_count: usize,
    pub issues: Vec<String>,
    pub source: DiscoverySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,
}

/// Counts over a set of workloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySummary {
    pub total: usize,
    pub running: usize,
    pub partial: usize,
    pub stopped: usize,
}

impl DiscoverySummary {
    pub fn from_workloads(workloads: &[DiscoveredWorkload]) -> Self {
        let mut summary = Self {
            total: workloads.len(),
            ..Default::default()
        };
        for workload in workloads {
            match workload.status {
                WorkloadStatus::Running => summary.running += 1,
                WorkloadStatus::Partial => summary.partial += 1,
                WorkloadStatus::Stopped => summary.stopped += 1,
            }
        }
        summary
    }
}

/// Classify `running` out of `total` units
pub fn workload_status(running: usize, total: usize) -> WorkloadStatus {
    if total > 0 && running == total {
        WorkloadStatus::Running
    } else if running > 0 {
        WorkloadStatus::Partial
    } else {
        WorkloadStatus::Stopped
    }
}

/// Problem worth reporting for a single container, if any
pub fn container_issue(record: &ContainerRecord) -> Option<String> {
    match record.state {
        ContainerState::Restarting => Some(format!("{}: restarting", record.name)),
        ContainerState::Exited => Some(match record.exit_code() {
            Some(code) => format!("{}: exited (code {})", record.name, code),
            None => format!("{}: exited", record.name),
        }),
        _ => None,
    }
}

/// Default project directory under `base_path`
pub fn project_path(base_path: &str, project: &str) -> String {
    format!("{}/{}", base_path.trim_end_matches('/'), project)
}

/// Directory a project lives in: its working dir label, else under `base_path`
pub fn resolve_path(records: &[&ContainerRecord], project: &str, base_path: &str) -> String {
    records
        .first()
        .and_then(|r| r.working_dir.clone())
        .unwrap_or_else(|| project_path(base_path, project))
}

fn distinct_services<'a>(records: impl Iterator<Item = &'a ContainerRecord>) -> Vec<String> {
    let mut services: Vec<String> = Vec::new();
    for record in records {
        if !record.service.is_empty() && !services.contains(&record.service) {
            services.push(record.service.clone());
        }
    }
    services
}

/// Summarise one project's containers from labels alone
///
/// Counts are per container, so scaled services contribute one unit per
/// replica.
fn summarize(project: &str, records: &[&ContainerRecord], base_path: &str) -> DiscoveredWorkload {
    let path = resolve_path(records, project, base_path);
    let running = records.iter().filter(|r| r.is_running()).count();
    let total = records.len();

    DiscoveredWorkload {
        name: project.to_string(),
        estimated_manifest_path: format!("{}/{}", path, DEFAULT_MANIFEST),
        path,
        services: distinct_services(records.iter().copied()),
        status: workload_status(running, total),
        running_count: running,
        total_count: total,
        issues: records.iter().filter_map(|r| container_issue(r)).collect(),
        source: DiscoverySource::Labels,
        manifest_path: None,
    }
}

/// Group records by project, sorted by project name
pub fn aggregate(records: &[ContainerRecord], base_path: &str) -> Vec<DiscoveredWorkload> {
    let mut projects: BTreeMap<&str, Vec<&ContainerRecord>> = BTreeMap::new();
    for record in records {
        projects.entry(record.project.as_str()).or_default().push(record);
    }

    projects
        .into_iter()
        .map(|(project, records)| summarize(project, &records, base_path))
        .collect()
}

/// Summarise a project against the services its manifest declares
///
/// Totals count declared services; a service is running when at least one
/// of its containers is. Declared services without any container are
/// reported as not created.
pub fn reconcile_with_manifest(
    project: &str,
    path: &str,
    records: &[&ContainerRecord],
    declared: Vec<String>,
    manifest_path: String,
) -> DiscoveredWorkload {
    let running = declared
        .iter()
        .filter(|service| {
            records
                .iter()
                .any(|r| &r.service == *service && r.is_running())
        })
        .count();

    let mut issues: Vec<String> = records.iter().filter_map(|r| container_issue(r)).collect();
    issues.extend(
        declared
            .iter()
            .filter(|service| !records.iter().any(|r| &r.service == *service))
            .map(|service| format!("{}: not created", service)),
    );

    DiscoveredWorkload {
        name: project.to_string(),
        path: path.to_string(),
        estimated_manifest_path: format!("{}/{}", path, DEFAULT_MANIFEST),
        status: workload_status(running, declared.len()),
        running_count: running,
        total_count: declared.len(),
        services: declared,
        issues,
        source: DiscoverySource::Manifest,
        manifest_path: Some(manifest_path),
    }
}
