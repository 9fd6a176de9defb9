//! Declared service names from a compose manifest
//!
//! Only the keys of the top-level `services` mapping are read; the rest of
//! the manifest schema is ignored.

use serde_yaml::Value;
use thiserror::Error;

/// Manifest name assumed when none has been read
pub const DEFAULT_MANIFEST: &str = "docker-compose.yml";

/// Manifest names tried in order when inspecting a project
pub const MANIFEST_CANDIDATES: [&str; 2] = [DEFAULT_MANIFEST, "compose.yml"];

/// Manifest could not be used
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no top-level 'services' mapping")]
    MissingServices,
}

/// Service names declared in `yaml`, in document order
pub fn declared_services(yaml: &str) -> Result<Vec<String>, ManifestError> {
    let doc: Value = serde_yaml::from_str(yaml)?;
    let services = doc
        .get("services")
        .and_then(Value::as_mapping)
        .ok_or(ManifestError::MissingServices)?;

    Ok(services
        .keys()
        .filter_map(|key| match key {
            Value::String(name) => Some(name.clone()),
            other => serde_yaml::to_string(other).ok().map(|s| s.trim().to_string()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_services_in_order() {
        let yaml = r#"
version: "3.8"
services:
  web:
    image: nginx
    depends_on: [db]
  db:
    image: postgres:16
volumes:
  data: {}
"#;
        assert_eq!(declared_services(yaml).unwrap(), vec!["web", "db"]);
    }

    #[test]
    fn test_missing_services() {
        assert!(matches!(
            declared_services("volumes: {}"),
            Err(ManifestError::MissingServices)
        ));
        assert!(matches!(
            declared_services("services: [web]"),
            Err(ManifestError::MissingServices)
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            declared_services("services: {web: [}"),
            Err(ManifestError::Yaml(_))
        ));
    }
}
