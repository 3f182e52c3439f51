use std::cell::RefCell;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::io::project_io::{self, ProjectError};
use crate::model::project::{ProjectId, ProjectSnapshot};
use crate::model::risk::{Risk, RiskDraft, RiskId};
use crate::model::task::{Task, TaskDraft, TaskField, TaskId, TaskPatch};
use crate::ops::check::{CheckError, check_tasks};
use crate::ops::import::{ImportBatch, resolve_batch};
use crate::ops::store::{StoreError, TaskStore};
use crate::service::{ImportedTasks, ServiceError, TaskService};

/// In-process stand-in for the remote project service, backed by a JSON
/// snapshot. Owns id assignment and the scheduling pass; float figures are
/// never computed here.
pub struct LocalService {
    project: ProjectId,
    path: Option<PathBuf>,
    state: RefCell<LocalState>,
}

struct LocalState {
    store: TaskStore,
    risks: Vec<Risk>,
    title: Option<String>,
}

impl LocalService {
    /// A service with no backing file
    pub fn in_memory(project: ProjectId, tasks: Vec<Task>) -> Result<Self, StoreError> {
        Ok(LocalService {
            project,
            path: None,
            state: RefCell::new(LocalState {
                store: TaskStore::from_tasks(tasks)?,
                risks: Vec::new(),
                title: None,
            }),
        })
    }

    /// Load the snapshot at `path`; every successful write goes back to it.
    pub fn open(project: ProjectId, path: &Path) -> Result<Self, ProjectError> {
        let snapshot = project_io::read_snapshot(path)?;
        debug!(path = %path.display(), tasks = snapshot.tasks.len(), "local service loaded snapshot");
        Ok(LocalService {
            project,
            path: Some(path.to_path_buf()),
            state: RefCell::new(LocalState {
                store: TaskStore::from_tasks(snapshot.tasks)?,
                risks: snapshot.risks,
                title: snapshot.title,
            }),
        })
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        let state = self.state.borrow();
        state.to_snapshot(self.project)
    }

    fn check_project(&self, project: ProjectId) -> Result<(), ServiceError> {
        if project == self.project {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("project {}", project)))
        }
    }

    fn persist(&self, state: &LocalState) -> Result<(), ServiceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        project_io::write_snapshot(path, &state.to_snapshot(self.project))
            .map_err(|e| ServiceError::Rejected(format!("snapshot not written: {}", e)))
    }
}

impl LocalState {
    fn to_snapshot(&self, project: ProjectId) -> ProjectSnapshot {
        ProjectSnapshot {
            project: Some(project),
            title: self.title.clone(),
            tasks: self.store.to_vec(),
            risks: self.risks.clone(),
        }
    }

    /// Next id, past every live id and every id an edge still points at, so
    /// a dangling edge never silently attaches to a new task.
    fn next_task_id(&self) -> TaskId {
        let max_target = self
            .store
            .all()
            .flat_map(|t| t.dependencies.iter().map(|d| d.target_id.0))
            .max()
            .unwrap_or(0);
        TaskId(self.store.max_id().max(max_target) + 1)
    }
}

fn store_error(e: StoreError) -> ServiceError {
    match e {
        StoreError::NotFound(id) => ServiceError::NotFound(format!("task {}", id)),
        StoreError::Cycle { .. } => ServiceError::Cycle(e.to_string()),
        StoreError::Conflict { .. }
        | StoreError::DuplicateId(_)
        | StoreError::DuplicateEdge { .. } => ServiceError::Rejected(e.to_string()),
    }
}

/// Fill `planned_end` from start + duration when no end was given.
fn derive_end(task: &mut Task) {
    if task.planned_end.is_none() && !task.is_summary() {
        task.planned_end = task.end_from_duration();
    }
}

/// Roll summary dates up from their descendants. Summaries are processed
/// deepest first so nested summaries feed their parents.
fn roll_up_summaries(tasks: &mut [Task]) {
    let mut summaries: Vec<usize> = (0..tasks.len()).filter(|i| tasks[*i].is_summary()).collect();
    summaries.sort_by_key(|i| std::cmp::Reverse(tasks[*i].outline_level()));

    for i in summaries {
        let code = tasks[i].hierarchy_code.clone();
        let descendants = tasks
            .iter()
            .filter(|t| code.is_ancestor_of(&t.hierarchy_code));
        let mut start = None;
        let mut end = None;
        for t in descendants {
            if let Some(s) = t.planned_start {
                start = Some(start.map_or(s, |cur: DateTime<Utc>| cur.min(s)));
            }
            if let Some(e) = t.planned_end {
                end = Some(end.map_or(e, |cur: DateTime<Utc>| cur.max(e)));
            }
        }
        let summary = &mut tasks[i];
        if start.is_some() {
            summary.planned_start = start;
        }
        if end.is_some() {
            summary.planned_end = end;
        }
        if let (Some(s), Some(e)) = (summary.planned_start, summary.planned_end) {
            summary.duration = ((e - s).num_seconds() as f64 / 3600.0).max(0.0);
        }
        summary.normalize_dates();
    }
}

#[async_trait(?Send)]
impl TaskService for LocalService {
    async fn list_tasks(&self, project: ProjectId) -> Result<Vec<Task>, ServiceError> {
        self.check_project(project)?;
        Ok(self.state.borrow().store.to_vec())
    }

    async fn create_task(&self, project: ProjectId, draft: &TaskDraft) -> Result<Task, ServiceError> {
        self.check_project(project)?;
        let mut state = self.state.borrow_mut();
        let id = state.next_task_id();
        let mut task = draft.clone().into_task(id);
        derive_end(&mut task);
        for edge in &task.dependencies {
            if edge.target_id == id {
                return Err(ServiceError::Cycle(format!("task {} depends on itself", id)));
            }
        }
        state.store.upsert(task).map_err(store_error)?;
        self.persist(&state)?;
        info!(task = %id, "created task");
        state
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("task {}", id)))
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ServiceError> {
        let mut state = self.state.borrow_mut();
        let current = state
            .store
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("task {}", id)))?;
        if current.is_summary() && patch.fields().iter().any(|f| f.is_schedule_input()) {
            return Err(ServiceError::Rejected(format!(
                "dates of summary task {} are derived from its children",
                id
            )));
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        let schedule_touched =
            patch.touches(TaskField::PlannedStart) || patch.touches(TaskField::Duration);
        if schedule_touched
            && !patch.touches(TaskField::PlannedEnd)
            && let Some(end) = updated.end_from_duration()
        {
            updated.planned_end = Some(end);
        }

        if patch.touches(TaskField::Dependencies) {
            let mut trial = state.store.clone();
            trial.upsert(updated.clone()).map_err(store_error)?;
            for edge in &updated.dependencies {
                if edge.target_id == id || trial.reaches(edge.target_id, id) {
                    return Err(ServiceError::Cycle(format!(
                        "dependency {} -> {} would create a cycle",
                        id, edge.target_id
                    )));
                }
            }
        }

        state.store.upsert(updated).map_err(store_error)?;
        self.persist(&state)?;
        debug!(task = %id, fields = ?patch.fields(), "updated task");
        state
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("task {}", id)))
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ServiceError> {
        let mut state = self.state.borrow_mut();
        let Some(index) = state.store.position(id) else {
            return Err(ServiceError::NotFound(format!("task {}", id)));
        };
        let Some(task) = state.store.remove(id) else {
            return Err(ServiceError::NotFound(format!("task {}", id)));
        };
        if let Err(e) = self.persist(&state) {
            state.store.restore(index, task).map_err(store_error)?;
            return Err(e);
        }
        info!(task = %id, "deleted task");
        Ok(())
    }

    async fn run_scheduling_pass(&self, project: ProjectId) -> Result<Vec<Task>, ServiceError> {
        self.check_project(project)?;
        let mut state = self.state.borrow_mut();
        let mut tasks = state.store.to_vec();

        let report = check_tasks(&tasks);
        if report.has_cycle() {
            let cycle = report
                .errors
                .iter()
                .find(|e| {
                    matches!(e, CheckError::Cycle { .. } | CheckError::SelfDep { .. })
                })
                .map(|e| e.to_string())
                .unwrap_or_default();
            warn!(%cycle, "scheduling pass refused");
            return Err(ServiceError::Cycle(cycle));
        }
        if let Some(first) = report.errors.first() {
            warn!(error = %first, "scheduling pass refused");
            return Err(ServiceError::Scheduling(first.to_string()));
        }

        for task in tasks.iter_mut() {
            derive_end(task);
            task.normalize_dates();
        }
        roll_up_summaries(&mut tasks);

        state.store.replace_all(tasks).map_err(store_error)?;
        self.persist(&state)?;
        info!(tasks = state.store.len(), "scheduling pass complete");
        Ok(state.store.to_vec())
    }

    async fn import_batch(
        &self,
        project: ProjectId,
        batch: &ImportBatch,
    ) -> Result<ImportedTasks, ServiceError> {
        self.check_project(project)?;
        let mut result = resolve_batch(batch, 1).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        for task in result.tasks.iter_mut() {
            derive_end(task);
        }
        roll_up_summaries(&mut result.tasks);

        let mut state = self.state.borrow_mut();
        state.store.replace_all(result.tasks).map_err(store_error)?;
        if result.title.is_some() {
            state.title = result.title.clone();
        }
        self.persist(&state)?;
        info!(tasks = state.store.len(), warnings = result.warnings.len(), "imported batch");
        Ok(ImportedTasks {
            title: result.title,
            tasks: state.store.to_vec(),
            warnings: result.warnings,
        })
    }

    async fn list_risks(&self, project: ProjectId) -> Result<Vec<Risk>, ServiceError> {
        self.check_project(project)?;
        Ok(self.state.borrow().risks.clone())
    }

    async fn create_risk(&self, project: ProjectId, draft: &RiskDraft) -> Result<Risk, ServiceError> {
        self.check_project(project)?;
        let mut state = self.state.borrow_mut();
        let id = RiskId(state.risks.iter().map(|r| r.id.0).max().unwrap_or(0) + 1);
        let risk = draft.clone().into_risk(id, project);
        state.risks.push(risk.clone());
        self.persist(&state)?;
        Ok(risk)
    }

    async fn delete_risk(&self, id: RiskId) -> Result<(), ServiceError> {
        let mut state = self.state.borrow_mut();
        let before = state.risks.len();
        state.risks.retain(|r| r.id != id);
        if state.risks.len() == before {
            return Err(ServiceError::NotFound(format!("risk {}", id)));
        }
        self.persist(&state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ErrorKind, MutationGateway};
    use crate::model::dependency::Dependency;
    use crate::model::task::TaskKind;
    use crate::model::wbs::HierarchyCode;
    use crate::ops::import::ImportRow;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const P: ProjectId = ProjectId(1);

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
    }

    fn task(id: i64, code: &str) -> Task {
        Task::new(TaskId(id), HierarchyCode::parse(code).unwrap(), format!("t{}", id))
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_rejects_delete() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tasknet");
        std::fs::create_dir(&dir).unwrap();
        let service = LocalService::open(P, &dir.join("tasks.json")).unwrap();
        let draft = TaskDraft::new(HierarchyCode::parse("1").unwrap(), "Survey");
        let created = service.create_task(P, &draft).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let gateway = MutationGateway::new(P, service);
        gateway.open().await.unwrap();
        let err = gateway.delete(created.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert!(gateway.task(created.id).is_some());
        assert_eq!(gateway.service().snapshot().tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_create_assigns_next_id_and_derives_end() {
        let service = LocalService::in_memory(P, vec![task(4, "1")]).unwrap();
        let mut draft = TaskDraft::new(HierarchyCode::parse("2").unwrap(), "Pour");
        draft.planned_start = Some(at(8));
        draft.duration = 6.0;

        let created = service.create_task(P, &draft).await.unwrap();
        assert_eq!(created.id, TaskId(5));
        assert_eq!(created.planned_end, Some(at(14)));
    }

    #[tokio::test]
    async fn test_new_ids_skip_dangling_targets() {
        let mut t = task(2, "1");
        t.dependencies.push(Dependency::on(TaskId(7)));
        let service = LocalService::in_memory(P, vec![t]).unwrap();
        let created = service
            .create_task(P, &TaskDraft::new(HierarchyCode::parse("2").unwrap(), "x"))
            .await
            .unwrap();
        assert_eq!(created.id, TaskId(8));
    }

    #[tokio::test]
    async fn test_update_rejects_cycle_and_unknown_task() {
        let mut t2 = task(2, "2");
        t2.dependencies.push(Dependency::on(TaskId(1)));
        let service = LocalService::in_memory(P, vec![task(1, "1"), t2]).unwrap();

        let err = service
            .update_task(TaskId(1), &TaskPatch::dependencies(vec![Dependency::on(TaskId(2))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Cycle(_)));

        let err = service.update_task(TaskId(9), &TaskPatch::title("x")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let service = LocalService::in_memory(P, vec![task(1, "1")]).unwrap();
        service.delete_task(TaskId(1)).await.unwrap();
        assert!(matches!(
            service.delete_task(TaskId(1)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduling_pass_rolls_up_summaries() {
        let mut summary = task(1, "1");
        summary.kind = TaskKind::Summary;
        let mut a = task(2, "1.1");
        a.planned_start = Some(at(8));
        a.duration = 4.0;
        let mut b = task(3, "1.2");
        b.planned_start = Some(at(10));
        b.planned_end = Some(at(18));
        let service = LocalService::in_memory(P, vec![summary, a, b]).unwrap();

        let tasks = service.run_scheduling_pass(P).await.unwrap();
        let summary = tasks.iter().find(|t| t.id == TaskId(1)).unwrap();
        assert_eq!(summary.planned_start, Some(at(8)));
        assert_eq!(summary.planned_end, Some(at(18)));
        assert_eq!(summary.duration, 10.0);
        assert_eq!(summary.schedule.total_float, None);
    }

    #[tokio::test]
    async fn test_scheduling_pass_refuses_bad_graphs() {
        let mut a = task(1, "1");
        a.dependencies.push(Dependency::on(TaskId(2)));
        let mut b = task(2, "2");
        b.dependencies.push(Dependency::on(TaskId(1)));
        let service = LocalService::in_memory(P, vec![a, b]).unwrap();
        assert!(matches!(
            service.run_scheduling_pass(P).await,
            Err(ServiceError::Cycle(_))
        ));

        let mut c = task(1, "1");
        c.dependencies.push(Dependency::on(TaskId(42)));
        let service = LocalService::in_memory(P, vec![c]).unwrap();
        assert!(matches!(
            service.run_scheduling_pass(P).await,
            Err(ServiceError::Scheduling(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_project_is_not_found() {
        let service = LocalService::in_memory(P, vec![]).unwrap();
        assert!(matches!(
            service.list_tasks(ProjectId(2)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_persist_to_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        let service = LocalService::open(P, &path).unwrap();
        let batch = ImportBatch {
            title: Some("Plant upgrade".into()),
            rows: vec![
                ImportRow {
                    code: Some("1".into()),
                    title: "Design".into(),
                    ..ImportRow::default()
                },
                ImportRow {
                    title: "Build".into(),
                    dependencies: vec![crate::ops::import::DependencyRef::Plain("Design".into())],
                    ..ImportRow::default()
                },
            ],
        };
        let imported = service.import_batch(P, &batch).await.unwrap();
        assert_eq!(imported.tasks.len(), 2);
        service
            .create_risk(
                P,
                &RiskDraft {
                    title: "Late steel".into(),
                    description: String::new(),
                    probability: 0.5,
                    impact: 4.0,
                    mitigation_plan: None,
                    task_id: Some(TaskId(2)),
                },
            )
            .await
            .unwrap();

        let reopened = LocalService::open(P, &path).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.title.as_deref(), Some("Plant upgrade"));
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[1].dependencies, vec![Dependency::on(TaskId(1))]);
        assert_eq!(snapshot.risks.len(), 1);

        reopened.delete_risk(RiskId(1)).await.unwrap();
        assert!(matches!(
            reopened.delete_risk(RiskId(1)).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
