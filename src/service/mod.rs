//! The remote project/task service boundary.
//!
//! The engine only ever talks to the service through [`TaskService`]. The
//! trait is `?Send`: every call is awaited on the single event-loop thread
//! that owns the gateway.

pub mod local;

use async_trait::async_trait;
use serde::Serialize;

use crate::model::project::ProjectId;
use crate::model::risk::{Risk, RiskDraft, RiskId};
use crate::model::task::{Task, TaskDraft, TaskId, TaskPatch};
use crate::ops::import::{ImportBatch, ImportWarning};

pub use local::LocalService;

/// A refusal or failure reported by the service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// 404-class: the addressed task or risk does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Timeout, connection failure or similar; safe to retry
    #[error("transport failure: {0}")]
    Transport(String),
    /// The dependency graph has a cycle
    #[error("dependency cycle: {0}")]
    Cycle(String),
    /// The scheduling pass rejected the graph for another reason
    #[error("scheduling failed: {0}")]
    Scheduling(String),
    /// Any other refusal (validation, conflict, permission)
    #[error("rejected: {0}")]
    Rejected(String),
}

/// What a bulk import produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedTasks {
    pub title: Option<String>,
    pub tasks: Vec<Task>,
    pub warnings: Vec<ImportWarning>,
}

#[async_trait(?Send)]
pub trait TaskService {
    async fn list_tasks(&self, project: ProjectId) -> Result<Vec<Task>, ServiceError>;

    /// The service assigns the id and may fill derived fields.
    async fn create_task(&self, project: ProjectId, draft: &TaskDraft) -> Result<Task, ServiceError>;

    /// Apply the set fields and return the task as stored.
    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ServiceError>;

    /// Callers treat `NotFound` as success.
    async fn delete_task(&self, id: TaskId) -> Result<(), ServiceError>;

    /// Recompute every schedule figure and return the whole task set.
    async fn run_scheduling_pass(&self, project: ProjectId) -> Result<Vec<Task>, ServiceError>;

    /// Replace the project's tasks with a resolved batch.
    async fn import_batch(
        &self,
        project: ProjectId,
        batch: &ImportBatch,
    ) -> Result<ImportedTasks, ServiceError>;

    async fn list_risks(&self, project: ProjectId) -> Result<Vec<Risk>, ServiceError>;

    async fn create_risk(&self, project: ProjectId, draft: &RiskDraft) -> Result<Risk, ServiceError>;

    async fn delete_risk(&self, id: RiskId) -> Result<(), ServiceError>;
}
