use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::io::config_io;
use crate::model::config::ProjectConfig;
use crate::model::project::{Project, ProjectSnapshot};
use crate::ops::store::StoreError;

/// Name of the project directory under the project root
pub const PROJECT_DIR: &str = "tasknet";

/// Error type for project I/O operations
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not a tasknet project: no tasknet/project.toml found")]
    NotAProject,
    #[error("project already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse project.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not serialize project.toml: {0}")]
    ConfigSerializeError(#[from] toml::ser::Error),
    #[error("could not parse {path}: {source}")]
    SnapshotParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid task set: {0}")]
    InvalidTaskSet(#[from] StoreError),
    #[error("could not serialize snapshot: {0}")]
    SnapshotSerializeError(#[from] serde_json::Error),
}

/// Find the project root by walking up from `start`, looking for a
/// `tasknet/project.toml`.
pub fn discover_project(start: &Path) -> Result<PathBuf, ProjectError> {
    let mut current = start.to_path_buf();
    loop {
        let dir = current.join(PROJECT_DIR);
        if dir.is_dir() && dir.join("project.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ProjectError::NotAProject);
        }
    }
}

/// Open the project rooted at `root`.
pub fn load_project(root: &Path) -> Result<Project, ProjectError> {
    let dir = root.join(PROJECT_DIR);
    if !dir.is_dir() {
        return Err(ProjectError::NotAProject);
    }
    let config = config_io::read_config(&dir)?;
    debug!(root = %root.display(), project = %config.project.id, "opened project");
    Ok(Project {
        root: root.to_path_buf(),
        dir,
        config,
    })
}

/// Create `tasknet/` with a config and an empty snapshot.
pub fn init_project(root: &Path, config: &ProjectConfig) -> Result<Project, ProjectError> {
    let dir = root.join(PROJECT_DIR);
    if dir.join("project.toml").exists() {
        return Err(ProjectError::AlreadyInitialized(dir));
    }
    fs::create_dir_all(&dir).map_err(|e| ProjectError::WriteError {
        path: dir.clone(),
        source: e,
    })?;
    config_io::write_config(&dir, config)?;
    let project = Project {
        root: root.to_path_buf(),
        dir,
        config: config.clone(),
    };
    let snapshot = ProjectSnapshot {
        project: Some(config.project.id),
        ..ProjectSnapshot::default()
    };
    write_snapshot(&project.snapshot_path(), &snapshot)?;
    Ok(project)
}

/// Read a snapshot file. A missing file is an empty project.
pub fn read_snapshot(path: &Path) -> Result<ProjectSnapshot, ProjectError> {
    if !path.exists() {
        return Ok(ProjectSnapshot::default());
    }
    let text = fs::read_to_string(path).map_err(|e| ProjectError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| ProjectError::SnapshotParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Replace a snapshot file atomically.
pub fn write_snapshot(path: &Path, snapshot: &ProjectSnapshot) -> Result<(), ProjectError> {
    let mut content = serde_json::to_vec_pretty(snapshot)?;
    content.push(b'\n');
    atomic_write(path, &content).map_err(|e| ProjectError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), tasks = snapshot.tasks.len(), "wrote snapshot");
    Ok(())
}

/// Write `content` to `path` through a temp file in the same directory and
/// a rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
