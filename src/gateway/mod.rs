//! The Mutation Gateway: the only writer of the local store and the only
//! caller of the [`TaskService`].
//!
//! Field edits are applied optimistically, sent, then reconciled against the
//! server echo or rolled back. Per key, the latest send wins: a response
//! that lost its key to a newer send is discarded. Recompute, open and
//! import are replace-all and bump a generation counter; responses to edits
//! sent under an older generation may no longer touch schedule inputs.
//!
//! Every method takes `&self` and no `RefCell` borrow is held across an
//! `.await`, so several mutations can be in flight at once on one thread.

pub mod pending;

use std::cell::{Cell, RefCell};

use tracing::{debug, info, warn};

use crate::model::dependency::{self, Dependency};
use crate::model::project::ProjectId;
use crate::model::risk::{Risk, RiskDraft, RiskId};
use crate::model::task::{Task, TaskDraft, TaskField, TaskId, TaskPatch, TaskStatus};
use crate::ops::import::ImportBatch;
use crate::ops::store::{StoreError, TaskStore};
use crate::service::{ImportedTasks, ServiceError, TaskService};

pub use pending::{MutationKey, MutationState, PendingTable};

/// The error kinds surfaced to views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    Cycle,
    NotFound,
    TransientNetwork,
    Scheduling,
    /// Edit to a field derived by the system
    ReadOnly,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("server reported a dependency cycle: {0}")]
    RemoteCycle(String),
    #[error("network failure: {0}")]
    TransientNetwork(String),
    #[error("scheduling pass failed: {0}")]
    Scheduling(String),
    #[error("{field} of summary task {id} is derived from its children")]
    DerivedField { id: TaskId, field: TaskField },
    #[error("task {0} is still being created")]
    Unconfirmed(TaskId),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Store(
                StoreError::Conflict { .. }
                | StoreError::DuplicateId(_)
                | StoreError::DuplicateEdge { .. },
            ) => ErrorKind::Conflict,
            GatewayError::Store(StoreError::Cycle { .. }) | GatewayError::RemoteCycle(_) => {
                ErrorKind::Cycle
            }
            GatewayError::Store(StoreError::NotFound(_)) | GatewayError::NotFound(_) => {
                ErrorKind::NotFound
            }
            GatewayError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            GatewayError::Scheduling(_) => ErrorKind::Scheduling,
            GatewayError::DerivedField { .. } => ErrorKind::ReadOnly,
            GatewayError::Unconfirmed(_) | GatewayError::Rejected(_) => ErrorKind::Rejected,
        }
    }
}

impl From<ServiceError> for GatewayError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(msg) => GatewayError::NotFound(msg),
            ServiceError::Transport(msg) => GatewayError::TransientNetwork(msg),
            ServiceError::Cycle(msg) => GatewayError::RemoteCycle(msg),
            ServiceError::Scheduling(msg) => GatewayError::Scheduling(msg),
            ServiceError::Rejected(msg) => GatewayError::Rejected(msg),
        }
    }
}

/// How a successful gateway call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server accepted the change and its echo was applied
    Confirmed,
    /// A newer send took over every key; this response was dropped
    Superseded,
    /// The server no longer has the task, so it was removed locally
    RemovedRemotely,
    /// A task was created with this server id
    Created(TaskId),
    /// The store was replaced by an authoritative set of this size
    Replaced(usize),
    /// Nothing needed to be sent
    Local,
}

pub struct MutationGateway<S: TaskService> {
    project: ProjectId,
    service: S,
    store: RefCell<TaskStore>,
    pending: RefCell<PendingTable>,
    generation: Cell<u64>,
    next_tentative: Cell<i64>,
    risks: RefCell<Vec<Risk>>,
}

impl<S: TaskService> MutationGateway<S> {
    /// A gateway over an empty store. Call [`open`](Self::open) to load.
    pub fn new(project: ProjectId, service: S) -> Self {
        MutationGateway {
            project,
            service,
            store: RefCell::new(TaskStore::new()),
            pending: RefCell::new(PendingTable::new()),
            generation: Cell::new(0),
            next_tentative: Cell::new(-1),
            risks: RefCell::new(Vec::new()),
        }
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A copy of the current task set in store order
    pub fn tasks(&self) -> Vec<Task> {
        self.store.borrow().to_vec()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.store.borrow().get(id).cloned()
    }

    /// Run `f` against the store. `f` must not call back into the gateway.
    pub fn with_store<R>(&self, f: impl FnOnce(&TaskStore) -> R) -> R {
        f(&self.store.borrow())
    }

    /// Bumped by every replace-all
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Number of keys with a mutation in flight
    pub fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn mutation_state(&self, key: MutationKey) -> Option<MutationState> {
        self.pending.borrow().state(key)
    }

    /// The risk register as last loaded
    pub fn risks(&self) -> Vec<Risk> {
        self.risks.borrow().clone()
    }

    // -----------------------------------------------------------------------
    // Replace-all
    // -----------------------------------------------------------------------

    /// Load the project's tasks, replacing whatever the store held.
    pub async fn open(&self) -> Result<MutationOutcome, GatewayError> {
        let tasks = self.service.list_tasks(self.project).await?;
        self.replace_all(tasks)
    }

    /// Ask the service for a scheduling pass and replace the store with its
    /// result. On failure the store is untouched.
    pub async fn recompute(&self) -> Result<MutationOutcome, GatewayError> {
        let keys = [MutationKey::Recompute];
        let seq = self.pending.borrow_mut().propose(&keys);
        self.pending.borrow_mut().mark(&keys, seq, MutationState::Sent);
        info!(seq, "scheduling pass requested");

        let result = self.service.run_scheduling_pass(self.project).await;

        let released = match &result {
            Ok(_) => self.pending.borrow_mut().finish(&keys, seq, MutationState::Confirmed),
            Err(_) => self.pending.borrow_mut().finish(&keys, seq, MutationState::Rejected),
        };
        if released.is_empty() {
            return Ok(MutationOutcome::Superseded);
        }
        match result {
            Ok(tasks) => self.replace_all(tasks),
            Err(e) => {
                warn!(error = %e, "scheduling pass rejected; store unchanged");
                Err(e.into())
            }
        }
    }

    /// Send a bulk import and adopt the resulting task set.
    pub async fn import(&self, batch: &ImportBatch) -> Result<ImportedTasks, GatewayError> {
        let imported = self.service.import_batch(self.project, batch).await?;
        self.replace_all(imported.tasks.clone())?;
        for warning in &imported.warnings {
            warn!(%warning, "import");
        }
        Ok(imported)
    }

    fn replace_all(&self, tasks: Vec<Task>) -> Result<MutationOutcome, GatewayError> {
        let count = tasks.len();
        self.store.borrow_mut().replace_all(tasks)?;
        self.generation.set(self.generation.get() + 1);
        info!(tasks = count, generation = self.generation.get(), "store replaced");
        Ok(MutationOutcome::Replaced(count))
    }

    // -----------------------------------------------------------------------
    // Field edits
    // -----------------------------------------------------------------------

    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<MutationOutcome, GatewayError> {
        self.edit(id, TaskPatch::status(status)).await
    }

    /// Apply `patch` optimistically, send it, and reconcile.
    pub async fn edit(&self, id: TaskId, patch: TaskPatch) -> Result<MutationOutcome, GatewayError> {
        if id.is_tentative() {
            return Err(GatewayError::Unconfirmed(id));
        }
        let fields = patch.fields();
        if fields.is_empty() {
            return Ok(MutationOutcome::Local);
        }
        let keys: Vec<MutationKey> = fields.iter().map(|f| MutationKey::Field(id, *f)).collect();

        // Proposed: snapshot, apply locally, register
        let (before, seq, generation) = {
            let mut store = self.store.borrow_mut();
            let task = store.get(id).ok_or(StoreError::NotFound(id))?;
            if task.is_summary()
                && let Some(field) = fields.iter().find(|f| f.is_schedule_input())
            {
                return Err(GatewayError::DerivedField { id, field: *field });
            }
            let mut captured = fields.clone();
            if derives_end(&patch) {
                captured.push(TaskField::PlannedEnd);
            }
            let before = TaskPatch::capture(task, &captured);
            store.patch(id, &patch)?;
            let seq = self.pending.borrow_mut().propose(&keys);
            (before, seq, self.generation.get())
        };

        self.pending.borrow_mut().mark(&keys, seq, MutationState::Sent);
        debug!(task = %id, seq, fields = ?fields, "edit sent");

        let result = self.service.update_task(id, &patch).await;

        match result {
            Ok(echo) => self.reconcile_edit(id, &patch, &keys, seq, generation, echo),
            Err(ServiceError::NotFound(msg)) => {
                info!(task = %id, %msg, "task gone on server; removing locally");
                self.store.borrow_mut().remove(id);
                self.pending.borrow_mut().clear_task(id);
                Ok(MutationOutcome::RemovedRemotely)
            }
            Err(e) => self.roll_back_edit(id, before, &keys, seq, generation, e),
        }
    }

    /// Confirmed: apply the echo for the fields this send still owns.
    fn reconcile_edit(
        &self,
        id: TaskId,
        patch: &TaskPatch,
        keys: &[MutationKey],
        seq: u64,
        generation: u64,
        echo: Task,
    ) -> Result<MutationOutcome, GatewayError> {
        let (owned, end_free) = {
            let mut pending = self.pending.borrow_mut();
            let end_free = !pending.owned_by_other(MutationKey::Field(id, TaskField::PlannedEnd), seq);
            (pending.finish(keys, seq, MutationState::Confirmed), end_free)
        };
        if owned.is_empty() {
            return Ok(MutationOutcome::Superseded);
        }

        let mut store = self.store.borrow_mut();
        if !store.contains(id) {
            debug!(task = %id, seq, "task left the store while the edit was in flight");
            return Ok(MutationOutcome::Superseded);
        }

        let mut fields: Vec<TaskField> = owned
            .iter()
            .filter_map(|k| match k {
                MutationKey::Field(_, f) => Some(*f),
                _ => None,
            })
            .collect();
        if derives_end(patch) && end_free && !fields.contains(&TaskField::PlannedEnd) {
            fields.push(TaskField::PlannedEnd);
        }
        if generation != self.generation.get() {
            // A replace-all landed after this send and owns the schedule.
            if patch.fields().iter().any(|f| f.is_schedule_input()) {
                debug!(task = %id, seq, "stale echo touches schedule inputs; discarded");
                return Ok(MutationOutcome::Superseded);
            }
            store.patch(id, &TaskPatch::capture(&echo, &fields))?;
            debug!(task = %id, seq, "stale echo applied without schedule figures");
            return Ok(MutationOutcome::Confirmed);
        }

        store.set_schedule(id, echo.schedule.clone())?;
        store.patch(id, &TaskPatch::capture(&echo, &fields))?;
        debug!(task = %id, seq, "edit confirmed");
        Ok(MutationOutcome::Confirmed)
    }

    /// Rejected: restore the fields this send still owns, then report.
    fn roll_back_edit(
        &self,
        id: TaskId,
        mut before: TaskPatch,
        keys: &[MutationKey],
        seq: u64,
        generation: u64,
        error: ServiceError,
    ) -> Result<MutationOutcome, GatewayError> {
        let (owned, end_free) = {
            let mut pending = self.pending.borrow_mut();
            let end_free = !pending.owned_by_other(MutationKey::Field(id, TaskField::PlannedEnd), seq);
            (pending.finish(keys, seq, MutationState::RolledBack), end_free)
        };
        if owned.is_empty() {
            debug!(task = %id, seq, error = %error, "superseded edit failed; nothing to roll back");
            return Ok(MutationOutcome::Superseded);
        }

        if generation != self.generation.get() {
            warn!(task = %id, seq, error = %error, "edit failed after a replace-all; not rolled back");
            return Err(error.into());
        }

        before.retain(|f| {
            owned.contains(&MutationKey::Field(id, f)) || (f == TaskField::PlannedEnd && end_free)
        });
        let mut store = self.store.borrow_mut();
        if store.contains(id) {
            store.patch(id, &before)?;
        }
        warn!(task = %id, seq, error = %error, "edit rejected; rolled back");
        Err(error.into())
    }

    // -----------------------------------------------------------------------
    // Dependencies
    // -----------------------------------------------------------------------

    /// Add or replace an edge. The acyclicity check runs locally first; a
    /// cycle is reported without contacting the service.
    pub async fn add_dependency(&self, owner: TaskId, edge: Dependency) -> Result<MutationOutcome, GatewayError> {
        if edge.target_id.is_tentative() {
            return Err(GatewayError::Unconfirmed(edge.target_id));
        }
        let edges = {
            let store = self.store.borrow();
            store.check_dependency(owner, &edge)?;
            let mut edges = store
                .get(owner)
                .map(|t| t.dependencies.clone())
                .unwrap_or_default();
            dependency::upsert_edge(&mut edges, edge);
            edges
        };
        self.edit(owner, TaskPatch::dependencies(edges)).await
    }

    pub async fn remove_dependency(&self, owner: TaskId, target: TaskId) -> Result<MutationOutcome, GatewayError> {
        let edges = {
            let store = self.store.borrow();
            let task = store.get(owner).ok_or(StoreError::NotFound(owner))?;
            let mut edges = task.dependencies.clone();
            if !dependency::remove_edge(&mut edges, target) {
                return Ok(MutationOutcome::Local);
            }
            edges
        };
        self.edit(owner, TaskPatch::dependencies(edges)).await
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Insert under a tentative id, then swap in the server's task.
    pub async fn create(&self, draft: TaskDraft) -> Result<MutationOutcome, GatewayError> {
        let tentative = TaskId(self.next_tentative.get());
        self.next_tentative.set(tentative.0 - 1);
        let keys = [MutationKey::Lifecycle(tentative)];

        self.store
            .borrow_mut()
            .upsert(draft.clone().into_task(tentative))?;
        let seq = self.pending.borrow_mut().propose(&keys);
        self.pending.borrow_mut().mark(&keys, seq, MutationState::Sent);

        let result = self.service.create_task(self.project, &draft).await;

        match result {
            Ok(task) => {
                self.pending
                    .borrow_mut()
                    .finish(&keys, seq, MutationState::Confirmed);
                let id = task.id;
                let mut store = self.store.borrow_mut();
                if store.contains(tentative) {
                    store.rekey(tentative, task)?;
                } else if !store.contains(id) {
                    store.upsert(task)?;
                }
                info!(tentative = %tentative, task = %id, "create confirmed");
                Ok(MutationOutcome::Created(id))
            }
            Err(e) => {
                self.pending
                    .borrow_mut()
                    .finish(&keys, seq, MutationState::RolledBack);
                self.store.borrow_mut().remove(tentative);
                warn!(tentative = %tentative, error = %e, "create rejected; rolled back");
                Err(e.into())
            }
        }
    }

    /// Remove locally, then tell the service. Edges in other tasks that
    /// point at the task are left dangling. A service that no longer has
    /// the task, or cannot be reached, leaves it removed.
    pub async fn delete(&self, id: TaskId) -> Result<MutationOutcome, GatewayError> {
        if id.is_tentative() {
            return Err(GatewayError::Unconfirmed(id));
        }
        let keys = [MutationKey::Lifecycle(id)];
        let (index, task) = {
            let mut store = self.store.borrow_mut();
            let index = store.position(id).ok_or(StoreError::NotFound(id))?;
            let task = store.remove(id).ok_or(StoreError::NotFound(id))?;
            (index, task)
        };
        let seq = self.pending.borrow_mut().propose(&keys);
        self.pending.borrow_mut().mark(&keys, seq, MutationState::Sent);

        let result = self.service.delete_task(id).await;

        match result {
            Ok(()) => {
                self.pending.borrow_mut().clear_task(id);
                info!(task = %id, "delete confirmed");
                Ok(MutationOutcome::Confirmed)
            }
            Err(ServiceError::NotFound(_) | ServiceError::Transport(_)) => {
                self.pending.borrow_mut().clear_task(id);
                warn!(task = %id, "delete soft failure; task stays removed");
                Ok(MutationOutcome::RemovedRemotely)
            }
            Err(e) => {
                self.pending
                    .borrow_mut()
                    .finish(&keys, seq, MutationState::RolledBack);
                let mut store = self.store.borrow_mut();
                if !store.contains(id) {
                    store.restore(index, task)?;
                }
                warn!(task = %id, error = %e, "delete rejected; restored");
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Risk register
    // -----------------------------------------------------------------------

    pub async fn load_risks(&self) -> Result<Vec<Risk>, GatewayError> {
        let risks = self.service.list_risks(self.project).await?;
        *self.risks.borrow_mut() = risks.clone();
        Ok(risks)
    }

    pub async fn create_risk(&self, draft: &RiskDraft) -> Result<Risk, GatewayError> {
        let risk = self.service.create_risk(self.project, draft).await?;
        self.risks.borrow_mut().push(risk.clone());
        Ok(risk)
    }

    pub async fn delete_risk(&self, id: RiskId) -> Result<(), GatewayError> {
        self.service.delete_risk(id).await?;
        self.risks.borrow_mut().retain(|r| r.id != id);
        Ok(())
    }
}

/// The service re-derives `planned_end` when start or duration moves and
/// no end is sent.
fn derives_end(patch: &TaskPatch) -> bool {
    (patch.touches(TaskField::PlannedStart) || patch.touches(TaskField::Duration))
        && !patch.touches(TaskField::PlannedEnd)
}
