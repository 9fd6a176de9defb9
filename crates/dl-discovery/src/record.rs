//! Bulk inspect records

use serde::Serialize;
use std::fmt;

/// Container state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Exited,
    Restarting,
    Paused,
    Created,
    Dead,
    Removing,
    Other,
}

impl ContainerState {
    /// Parse an engine state word; unknown words map to `Other`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            "created" => ContainerState::Created,
            "dead" => ContainerState::Dead,
            "removing" => ContainerState::Removing,
            _ => ContainerState::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Exited => "exited",
            ContainerState::Restarting => "restarting",
            ContainerState::Paused => "paused",
            ContainerState::Created => "created",
            ContainerState::Dead => "dead",
            ContainerState::Removing => "removing",
            ContainerState::Other => "other",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One container from a bulk inspect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub name: String,
    pub state: ContainerState,
    pub project: String,
    pub service: String,
    pub working_dir: Option<String>,
    pub status_text: Option<String>,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    /// Exit code carried by the status text, e.g. `Exited (137) 2 hours ago`
    pub fn exit_code(&self) -> Option<i32> {
        self.status_text.as_deref().and_then(parse_exit_code)
    }
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

/// Parse one tab-separated record line
///
/// Fields: name, state, project, service, working dir, status text. The
/// last three may be missing. Returns `None` for lines that cannot name a
/// container of a project.
pub fn parse_record(line: &str) -> Option<ContainerRecord> {
    let fields: Vec<&str> = line.trim_end_matches(&['\r', '\n'][..]).split('\t').collect();
    if fields.len() < 3 {
        return None;
    }

    let name = fields[0].trim().trim_start_matches('/');
    let project = fields[2].trim();
    if name.is_empty() || project.is_empty() {
        return None;
    }

    Some(ContainerRecord {
        name: name.to_string(),
        state: ContainerState::parse(fields[1]),
        project: project.to_string(),
        service: fields.get(3).map(|s| s.trim().to_string()).unwrap_or_default(),
        working_dir: non_empty(fields.get(4).copied()),
        status_text: non_empty(fields.get(5).copied()),
    })
}

/// Parse bulk inspect output, skipping lines that are not records
pub fn parse_records(text: &str) -> Vec<ContainerRecord> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let record = parse_record(line);
            if record.is_none() {
                tracing::debug!("Skipping unparseable inspect line: {:?}", line);
            }
            record
        })
        .collect()
}

/// Extract `N` from `Exited (N) ...`
pub fn parse_exit_code(status_text: &str) -> Option<i32> {
    let rest = status_text.trim().strip_prefix("Exited (")?;
    let (code, _) = rest.split_once(')')?;
    code.trim().parse().ok()
}
