use std::fs;
use std::path::Path;

use crate::io::project_io::{ProjectError, atomic_write};
use crate::model::config::ProjectConfig;

/// Read `project.toml` from the project directory.
pub fn read_config(dir: &Path) -> Result<ProjectConfig, ProjectError> {
    let config_path = dir.join("project.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| ProjectError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    Ok(toml::from_str(&config_text)?)
}

/// Write `project.toml` into the project directory.
pub fn write_config(dir: &Path, config: &ProjectConfig) -> Result<(), ProjectError> {
    let config_path = dir.join("project.toml");
    let text = toml::to_string_pretty(config)?;
    atomic_write(&config_path, text.as_bytes()).map_err(|e| ProjectError::WriteError {
        path: config_path,
        source: e,
    })
}
