use serde::{Deserialize, Serialize};

use super::project::ProjectId;

/// Configuration from tasknet/project.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectInfo,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: ProjectId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file, relative to the tasknet/ directory
    #[serde(default = "default_store_file")]
    pub file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            file: default_store_file(),
        }
    }
}

fn default_store_file() -> String {
    "tasks.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing filter directive; RUST_LOG overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Width of the title column in grid and board output
    #[serde(default = "default_title_width")]
    pub title_width: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            title_width: default_title_width(),
        }
    }
}

fn default_title_width() -> usize {
    40
}

impl ProjectConfig {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        ProjectConfig {
            project: ProjectInfo {
                id,
                name: name.into(),
            },
            store: StoreConfig::default(),
            log: LogConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ProjectConfig = toml::from_str(
            r#"[project]
id = 4
name = "Plant upgrade"
"#,
        )
        .unwrap();
        assert_eq!(config.project.id, ProjectId(4));
        assert_eq!(config.store.file, "tasks.json");
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.ui.title_width, 40);
    }

    #[test]
    fn test_full_config() {
        let config: ProjectConfig = toml::from_str(
            r#"[project]
id = 1
name = "x"

[store]
file = "snap.json"

[log]
level = "tasknet=debug"

[ui]
title_width = 24
"#,
        )
        .unwrap();
        assert_eq!(config.store.file, "snap.json");
        assert_eq!(config.log.level, "tasknet=debug");
        assert_eq!(config.ui.title_width, 24);
    }
}
