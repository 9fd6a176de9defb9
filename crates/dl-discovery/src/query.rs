//! Engine CLI commands used for discovery

use dl_core::shell::shell_quote;

/// Label naming a container's composition project
pub const PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label naming a container's service
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
/// Label holding the project's working directory
pub const WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// Go template producing one tab-separated record per container
pub fn record_format() -> String {
    [
        "{{.Names}}".to_string(),
        "{{.State}}".to_string(),
        format!("{{{{.Label \"{}\"}}}}", PROJECT_LABEL),
        format!("{{{{.Label \"{}\"}}}}", SERVICE_LABEL),
        format!("{{{{.Label \"{}\"}}}}", WORKING_DIR_LABEL),
        "{{.Status}}".to_string(),
    ]
    .join("\t")
}

/// One `docker ps` over every project container, or one project's
pub fn bulk_inspect_command(project: Option<&str>) -> String {
    let filter = match project {
        Some(project) => format!("label={}={}", PROJECT_LABEL, project),
        None => format!("label={}", PROJECT_LABEL),
    };
    format!(
        "docker ps -a --filter {} --format {}",
        shell_quote(&filter),
        shell_quote(&record_format())
    )
}

/// Print a manifest from the working directory
pub fn read_manifest_command(file_name: &str) -> String {
    format!("cat {}", shell_quote(file_name))
}
