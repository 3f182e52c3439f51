use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::ProjectConfig;
use super::risk::Risk;
use super::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opened project directory
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory containing `tasknet/`
    pub root: PathBuf,
    /// The `tasknet/` directory itself
    pub dir: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    pub fn id(&self) -> ProjectId {
        self.config.project.id
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.config.store.file)
    }
}

/// Everything the local service persists for one project: the task set in
/// insertion order plus the risk register.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    /// Set by the last bulk import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub risks: Vec<Risk>,
}
