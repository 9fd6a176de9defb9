//! Output formatting utilities for the CLI
//!
//! Tables for workloads and profiles, a detail view for a single project,
//! JSON output and coloured status messages.

use anyhow::Result;
use serde::Serialize;
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use dl_connection::ConnectionInfo;
use dl_discovery::{DiscoveredWorkload, DiscoverySummary, WorkloadStatus};

/// One row of the profiles table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub name: String,
    pub mode: String,
    pub target: Option<String>,
    pub auth: Option<String>,
    pub projects_path: Option<String>,
    pub is_default: bool,
    pub error: Option<String>,
}

/// Print any serialisable value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format discovered workloads as an ASCII table
pub fn format_workloads(workloads: &[DiscoveredWorkload]) -> String {
    if workloads.is_empty() {
        return "No projects found".to_string();
    }

    #[derive(Tabled)]
    struct WorkloadRow {
        #[tabled(rename = "PROJECT")]
        name: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "RUNNING")]
        running: String,
        #[tabled(rename = "SERVICES")]
        services: String,
        #[tabled(rename = "PATH")]
        path: String,
    }

    let rows: Vec<WorkloadRow> = workloads
        .iter()
        .map(|w| WorkloadRow {
            name: w.name.clone(),
            status: w.status.to_string(),
            running: format!("{}/{}", w.running_count, w.total_count),
            services: truncate(&w.services.join(", "), 40),
            path: w.path.clone(),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// One-line summary of a listing
pub fn format_summary(summary: &DiscoverySummary) -> String {
    format!(
        "{} projects: {} running, {} partial, {} stopped",
        summary.total, summary.running, summary.partial, summary.stopped
    )
}

/// Multi-line description of one workload
pub fn format_workload(workload: &DiscoveredWorkload) -> String {
    let mut output = String::new();

    output.push_str(&format!("Project: {}\n", workload.name));
    output.push_str(&format!("Status: {}\n", workload.status));
    output.push_str(&format!(
        "Running: {}/{}\n",
        workload.running_count, workload.total_count
    ));
    output.push_str(&format!("Path: {}\n", workload.path));
    match &workload.manifest_path {
        Some(manifest) => output.push_str(&format!("Manifest: {}\n", manifest)),
        None => output.push_str(&format!(
            "Manifest: {} (not read)\n",
            workload.estimated_manifest_path
        )),
    }
    output.push_str(&format!("Services: {}\n", workload.services.join(", ")));

    if !workload.issues.is_empty() {
        output.push_str("Issues:\n");
        for issue in &workload.issues {
            output.push_str(&format!("  - {}\n", issue));
        }
    }

    output
}

/// Format configured profiles as an ASCII table
pub fn format_profiles(profiles: &[ProfileRow]) -> String {
    if profiles.is_empty() {
        return "No profiles configured".to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "")]
        marker: &'static str,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "MODE")]
        mode: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "AUTH")]
        auth: String,
        #[tabled(rename = "PROJECTS")]
        projects: String,
    }

    let dash = || "-".to_string();
    let rows: Vec<Row> = profiles
        .iter()
        .map(|p| Row {
            marker: if p.is_default { "*" } else { "" },
            name: p.name.clone(),
            mode: p.mode.clone(),
            target: p
                .error
                .as_ref()
                .map(|e| format!("invalid: {}", e))
                .or_else(|| p.target.clone())
                .unwrap_or_else(dash),
            auth: p.auth.clone().unwrap_or_else(dash),
            projects: p.projects_path.clone().unwrap_or_else(dash),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a connection snapshot as a human-readable string
pub fn format_connection(info: &ConnectionInfo) -> String {
    let mut output = String::new();
    output.push_str(&format!("Profile: {}\n", info.profile));
    output.push_str(&format!(
        "Mode: {}\n",
        if info.remote { "remote" } else { "local" }
    ));
    if let Some(target) = &info.target {
        output.push_str(&format!("Target: {}\n", target));
    }
    output.push_str(&format!("Status: {}\n", info.status));
    if let Some(endpoint) = &info.endpoint {
        output.push_str(&format!("Endpoint: {}\n", endpoint.display()));
    }
    if let Some(pid) = info.owner_pid {
        output.push_str(&format!("Tunnel pid: {}\n", pid));
    }
    output
}

/// Print the status-appropriate message for a workload
pub fn print_workload_status(workload: &DiscoveredWorkload) {
    let msg = format!("{} is {}", workload.name, workload.status);
    match workload.status {
        WorkloadStatus::Running => print_success(&msg),
        WorkloadStatus::Partial => print_warning(&msg),
        WorkloadStatus::Stopped => print_info(&msg),
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow on stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
