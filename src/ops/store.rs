use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::model::dependency::{self, Dependency};
use crate::model::task::{ScheduleFacts, Task, TaskId, TaskPatch};
use crate::model::wbs::HierarchyCode;

/// Error type for store operations. A failed call leaves the store exactly
/// as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("hierarchy code {code} is already used by task {existing}")]
    Conflict { code: HierarchyCode, existing: TaskId },
    #[error("dependency {owner} -> {target} would create a cycle")]
    Cycle { owner: TaskId, target: TaskId },
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task {0} appears more than once in the task set")]
    DuplicateId(TaskId),
    #[error("task {owner} lists more than one dependency on {target}")]
    DuplicateEdge { owner: TaskId, target: TaskId },
}

/// The canonical task set of the open project.
///
/// Iteration order is insertion order; an upsert of an existing id keeps
/// its position. Edges pointing at absent tasks are kept (dangling) rather
/// than dropped.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: IndexMap<TaskId, Task>,
    codes: HashMap<HierarchyCode, TaskId>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an authoritative task list. Fails on duplicate ids
    /// or hierarchy codes.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self, StoreError> {
        let mut store = TaskStore::new();
        for task in tasks {
            if store.tasks.contains_key(&task.id) {
                return Err(StoreError::DuplicateId(task.id));
            }
            store.upsert(task)?;
        }
        Ok(store)
    }

    /// Replace the whole task set. All or nothing.
    pub fn replace_all(&mut self, tasks: impl IntoIterator<Item = Task>) -> Result<(), StoreError> {
        *self = TaskStore::from_tasks(tasks)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All tasks in insertion order
    pub fn all(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn to_vec(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.get_index_of(&id)
    }

    pub fn id_for_code(&self, code: &HierarchyCode) -> Option<TaskId> {
        self.codes.get(code).copied()
    }

    /// Largest confirmed id, or 0 for an empty store
    pub fn max_id(&self) -> i64 {
        self.tasks.keys().map(|id| id.0).max().unwrap_or(0).max(0)
    }

    /// `(owner, target)` pairs whose target is not in the store
    pub fn dangling_edges(&self) -> Vec<(TaskId, TaskId)> {
        self.tasks
            .values()
            .flat_map(|t| t.dependencies.iter().map(move |d| (t.id, d.target_id)))
            .filter(|(_, target)| !self.tasks.contains_key(target))
            .collect()
    }

    /// True if `to` is reachable from `from` by following dependency edges
    /// (successor -> predecessor). Dangling edges are skipped.
    pub fn reaches(&self, from: TaskId, to: TaskId) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(task) = self.tasks.get(&current) {
                stack.extend(task.dependencies.iter().map(|d| d.target_id));
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert or fully replace a task by id.
    pub fn upsert(&mut self, mut task: Task) -> Result<(), StoreError> {
        self.check_code(&task.hierarchy_code, task.id)?;
        task.normalize_dates();
        if let Some(old) = self.tasks.get(&task.id)
            && old.hierarchy_code != task.hierarchy_code
        {
            self.codes.remove(&old.hierarchy_code);
        }
        self.codes.insert(task.hierarchy_code.clone(), task.id);
        self.tasks.insert(task.id, task);
        Ok(())
    }

    /// Merge the fields set in `patch`. An end date at or before the start is
    /// advanced to start + 1h. A replacement edge list must name each target
    /// once and must not close a cycle.
    pub fn patch(&mut self, id: TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        let current = self.tasks.get(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(code) = &patch.hierarchy_code {
            self.check_code(code, id)?;
        }
        if let Some(edges) = &patch.dependencies {
            self.check_edge_list(id, edges)?;
        }
        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        updated.normalize_dates();
        self.upsert(updated)
    }

    /// Overwrite the scheduler-owned figures of one task.
    pub fn set_schedule(&mut self, id: TaskId, facts: ScheduleFacts) -> Result<(), StoreError> {
        let task = self.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.schedule = facts;
        Ok(())
    }

    /// Delete a task. Edges in other tasks that point at it stay in place.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.shift_remove(&id)?;
        if self.codes.get(&task.hierarchy_code) == Some(&id) {
            self.codes.remove(&task.hierarchy_code);
        }
        Some(task)
    }

    /// Re-insert a removed task at its old position.
    pub fn restore(&mut self, index: usize, task: Task) -> Result<(), StoreError> {
        if self.tasks.contains_key(&task.id) {
            return Err(StoreError::DuplicateId(task.id));
        }
        self.check_code(&task.hierarchy_code, task.id)?;
        self.codes.insert(task.hierarchy_code.clone(), task.id);
        let index = index.min(self.tasks.len());
        self.tasks.shift_insert(index, task.id, task);
        Ok(())
    }

    /// Swap a tentative entry for its confirmed version, keeping the
    /// position and redirecting every edge that pointed at the old id.
    pub fn rekey(&mut self, tentative: TaskId, confirmed: Task) -> Result<(), StoreError> {
        let index = self
            .position(tentative)
            .ok_or(StoreError::NotFound(tentative))?;
        if confirmed.id != tentative && self.tasks.contains_key(&confirmed.id) {
            return Err(StoreError::DuplicateId(confirmed.id));
        }
        if let Some(existing) = self.codes.get(&confirmed.hierarchy_code)
            && *existing != tentative
            && *existing != confirmed.id
        {
            return Err(StoreError::Conflict {
                code: confirmed.hierarchy_code.clone(),
                existing: *existing,
            });
        }
        let new_id = confirmed.id;
        self.remove(tentative);
        self.restore(index, confirmed)?;
        for task in self.tasks.values_mut() {
            for edge in &mut task.dependencies {
                if edge.target_id == tentative {
                    edge.target_id = new_id;
                }
            }
        }
        Ok(())
    }

    /// Validate a new edge without applying it: the owner must exist and the
    /// edge must not close a cycle. The target may be absent (the edge will
    /// render as dangling).
    pub fn check_dependency(&self, owner: TaskId, edge: &Dependency) -> Result<(), StoreError> {
        if !self.tasks.contains_key(&owner) {
            return Err(StoreError::NotFound(owner));
        }
        if edge.target_id == owner || self.reaches(edge.target_id, owner) {
            return Err(StoreError::Cycle {
                owner,
                target: edge.target_id,
            });
        }
        Ok(())
    }

    /// Validate a full replacement of the owner's edges. The walk from each
    /// target stops at the owner, so the owner's current edges never matter.
    pub fn check_edge_list(&self, owner: TaskId, edges: &[Dependency]) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for edge in edges {
            if !seen.insert(edge.target_id) {
                return Err(StoreError::DuplicateEdge {
                    owner,
                    target: edge.target_id,
                });
            }
            self.check_dependency(owner, edge)?;
        }
        Ok(())
    }

    /// Add or replace the owner's edge to `edge.target_id`.
    pub fn add_dependency(&mut self, owner: TaskId, edge: Dependency) -> Result<(), StoreError> {
        self.check_dependency(owner, &edge)?;
        if let Some(task) = self.tasks.get_mut(&owner) {
            dependency::upsert_edge(&mut task.dependencies, edge);
        }
        Ok(())
    }

    /// Returns whether an edge was removed.
    pub fn remove_dependency(&mut self, owner: TaskId, target: TaskId) -> Result<bool, StoreError> {
        let task = self.tasks.get_mut(&owner).ok_or(StoreError::NotFound(owner))?;
        Ok(dependency::remove_edge(&mut task.dependencies, target))
    }

    fn check_code(&self, code: &HierarchyCode, id: TaskId) -> Result<(), StoreError> {
        match self.codes.get(code) {
            Some(existing) if *existing != id => Err(StoreError::Conflict {
                code: code.clone(),
                existing: *existing,
            }),
            _ => Ok(()),
        }
    }
}
