//! Profiles command implementation

use anyhow::Result;

use dl_core::config::{Profile, ProfileConfig};

use crate::context::CliContext;
use crate::output::{format_profiles, print_info, print_json, ProfileRow};

/// Describe every configured profile
pub fn profile_rows(config: &ProfileConfig) -> Vec<ProfileRow> {
    config
        .names()
        .into_iter()
        .map(|name| {
            let is_default = config.default_profile() == Some(name.as_str());
            match config.resolve(&name) {
                Ok(Profile::Local { projects_path, .. }) => ProfileRow {
                    name,
                    mode: "local".to_string(),
                    target: None,
                    auth: None,
                    projects_path,
                    is_default,
                    error: None,
                },
                Ok(Profile::Remote(remote)) => ProfileRow {
                    mode: "remote".to_string(),
                    target: Some(remote.target()),
                    auth: Some(remote.auth.kind().to_string()),
                    projects_path: remote.projects_path,
                    name,
                    is_default,
                    error: None,
                },
                Err(e) => ProfileRow {
                    name,
                    mode: "-".to_string(),
                    target: None,
                    auth: None,
                    projects_path: None,
                    is_default,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect()
}

/// Execute the profiles command
pub fn profiles_command(ctx: &CliContext) -> Result<()> {
    let Some(config) = ctx.pool.config() else {
        if ctx.json {
            return print_json(&Vec::<ProfileRow>::new());
        }
        print_info("No profiles configured; only the local engine is available");
        print_info(&format!(
            "To add remote targets, {}",
            dl_core::config::configuration_hint()
        ));
        return Ok(());
    };

    let rows = profile_rows(config);
    if ctx.json {
        return print_json(&rows);
    }

    print_info(&format!("Profiles from {}", config.source()));
    println!("{}", format_profiles(&rows));
    Ok(())
}
