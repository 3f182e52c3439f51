//! Gateway behavior against a scripted service whose replies are released
//! by the test, so several mutations can be in flight at once.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio::sync::oneshot;

use tasknet::gateway::{ErrorKind, GatewayError, MutationGateway, MutationOutcome};
use tasknet::model::dependency::Dependency;
use tasknet::model::project::ProjectId;
use tasknet::model::risk::{Risk, RiskDraft, RiskId};
use tasknet::model::task::{ScheduleFacts, Task, TaskDraft, TaskId, TaskPatch};
use tasknet::model::wbs::HierarchyCode;
use tasknet::ops::import::ImportBatch;
use tasknet::service::{ImportedTasks, ServiceError, TaskService};

const P: ProjectId = ProjectId(1);

type Reply<T> = oneshot::Receiver<Result<T, ServiceError>>;

#[derive(Default)]
struct ScriptedService {
    tasks: RefCell<Vec<Task>>,
    updates: RefCell<VecDeque<Reply<Task>>>,
    passes: RefCell<VecDeque<Reply<Vec<Task>>>>,
    creates: RefCell<VecDeque<Reply<Task>>>,
    deletes: RefCell<VecDeque<Result<(), ServiceError>>>,
    /// Mutating calls received, not counting `list_tasks`
    calls: Cell<usize>,
}

impl ScriptedService {
    fn gated_update(&self) -> oneshot::Sender<Result<Task, ServiceError>> {
        let (tx, rx) = oneshot::channel();
        self.updates.borrow_mut().push_back(rx);
        tx
    }

    fn reply_update(&self, reply: Result<Task, ServiceError>) {
        let _ = self.gated_update().send(reply);
    }

    fn gated_create(&self) -> oneshot::Sender<Result<Task, ServiceError>> {
        let (tx, rx) = oneshot::channel();
        self.creates.borrow_mut().push_back(rx);
        tx
    }

    fn reply_create(&self, reply: Result<Task, ServiceError>) {
        let _ = self.gated_create().send(reply);
    }

    fn gated_pass(&self) -> oneshot::Sender<Result<Vec<Task>, ServiceError>> {
        let (tx, rx) = oneshot::channel();
        self.passes.borrow_mut().push_back(rx);
        tx
    }

    fn reply_pass(&self, reply: Result<Vec<Task>, ServiceError>) {
        let _ = self.gated_pass().send(reply);
    }

    fn bump(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

async fn released<T>(reply: Option<Reply<T>>) -> Result<T, ServiceError> {
    match reply {
        Some(rx) => rx
            .await
            .unwrap_or_else(|_| Err(ServiceError::Transport("reply dropped".into()))),
        None => Err(ServiceError::Transport("no scripted reply".into())),
    }
}

#[async_trait(?Send)]
impl TaskService for ScriptedService {
    async fn list_tasks(&self, _project: ProjectId) -> Result<Vec<Task>, ServiceError> {
        Ok(self.tasks.borrow().clone())
    }

    async fn create_task(&self, _project: ProjectId, _draft: &TaskDraft) -> Result<Task, ServiceError> {
        self.bump();
        let reply = self.creates.borrow_mut().pop_front();
        released(reply).await
    }

    async fn update_task(&self, _id: TaskId, _patch: &TaskPatch) -> Result<Task, ServiceError> {
        self.bump();
        let reply = self.updates.borrow_mut().pop_front();
        released(reply).await
    }

    async fn delete_task(&self, _id: TaskId) -> Result<(), ServiceError> {
        self.bump();
        let reply = self.deletes.borrow_mut().pop_front();
        reply.unwrap_or(Ok(()))
    }

    async fn run_scheduling_pass(&self, _project: ProjectId) -> Result<Vec<Task>, ServiceError> {
        self.bump();
        let reply = self.passes.borrow_mut().pop_front();
        released(reply).await
    }

    async fn import_batch(
        &self,
        _project: ProjectId,
        _batch: &ImportBatch,
    ) -> Result<ImportedTasks, ServiceError> {
        Err(ServiceError::Rejected("import not scripted".into()))
    }

    async fn list_risks(&self, _project: ProjectId) -> Result<Vec<Risk>, ServiceError> {
        Ok(Vec::new())
    }

    async fn create_risk(&self, _project: ProjectId, _draft: &RiskDraft) -> Result<Risk, ServiceError> {
        Err(ServiceError::Rejected("risks not scripted".into()))
    }

    async fn delete_risk(&self, _id: RiskId) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn task(id: i64, code: &str) -> Task {
    Task::new(TaskId(id), HierarchyCode::parse(code).unwrap(), format!("t{}", id))
}

async fn gateway(tasks: Vec<Task>) -> MutationGateway<ScriptedService> {
    let service = ScriptedService {
        tasks: RefCell::new(tasks),
        ..ScriptedService::default()
    };
    let gateway = MutationGateway::new(P, service);
    gateway.open().await.unwrap();
    gateway
}

async fn until_calls(gateway: &MutationGateway<ScriptedService>, n: usize) {
    while gateway.service().calls.get() < n {
        tokio::task::yield_now().await;
    }
}

fn titled(mut t: Task, title: &str) -> Task {
    t.title = title.to_string();
    t
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cycle_is_refused_without_contacting_service() {
    let mut t5 = task(5, "1.2");
    t5.dependencies.push(Dependency::on(TaskId(3)));
    let gw = gateway(vec![task(3, "1.1"), t5]).await;
    let before = gw.tasks();

    let err = gw
        .add_dependency(TaskId(3), Dependency::on(TaskId(5)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cycle);
    assert_eq!(gw.service().calls.get(), 0);
    assert_eq!(gw.tasks(), before);
}

#[tokio::test]
async fn test_edge_to_task_still_being_created_is_refused() {
    let gw = gateway(vec![task(1, "1")]).await;
    let tx_create = gw.service().gated_create();

    let draft = TaskDraft::new(HierarchyCode::parse("2").unwrap(), "Pour slab");
    let create = gw.create(draft);
    let link = async {
        until_calls(&gw, 1).await;
        let result = gw.add_dependency(TaskId(1), Dependency::on(TaskId(-1))).await;
        let _ = tx_create.send(Ok(task(2, "2")));
        result
    };
    let (created, linked) = tokio::join!(create, link);

    assert_eq!(created.unwrap(), MutationOutcome::Created(TaskId(2)));
    let err = linked.unwrap_err();
    assert_eq!(err, GatewayError::Unconfirmed(TaskId(-1)));
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(gw.service().calls.get(), 1);
    assert!(gw.task(TaskId(1)).unwrap().dependencies.is_empty());
}

#[tokio::test]
async fn test_delete_leaves_dependents_dangling() {
    let mut t9 = task(9, "2");
    t9.dependencies.push(Dependency::on(TaskId(7)));
    let gw = gateway(vec![task(7, "1"), t9]).await;

    let outcome = gw.delete(TaskId(7)).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Confirmed);
    assert!(gw.task(TaskId(7)).is_none());
    assert_eq!(
        gw.task(TaskId(9)).unwrap().dependencies,
        vec![Dependency::on(TaskId(7))]
    );
    assert_eq!(
        gw.with_store(|s| s.dangling_edges()),
        vec![(TaskId(9), TaskId(7))]
    );
}

// ---------------------------------------------------------------------------
// Last send wins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_later_send_wins_when_its_reply_arrives_first() {
    let gw = gateway(vec![task(1, "1")]).await;
    let base = gw.task(TaskId(1)).unwrap();
    let tx_a = gw.service().gated_update();
    let tx_b = gw.service().gated_update();

    let send_a = gw.edit(TaskId(1), TaskPatch::title("A"));
    let send_b = async {
        until_calls(&gw, 1).await;
        gw.edit(TaskId(1), TaskPatch::title("B")).await
    };
    let replies = async {
        until_calls(&gw, 2).await;
        assert_eq!(gw.task(TaskId(1)).unwrap().title, "B");
        let _ = tx_b.send(Ok(titled(base.clone(), "B")));
        tokio::task::yield_now().await;
        let _ = tx_a.send(Ok(titled(base.clone(), "A")));
    };
    let (a, b, ()) = tokio::join!(send_a, send_b, replies);

    assert_eq!(a.unwrap(), MutationOutcome::Superseded);
    assert_eq!(b.unwrap(), MutationOutcome::Confirmed);
    assert_eq!(gw.task(TaskId(1)).unwrap().title, "B");
    assert_eq!(gw.in_flight(), 0);
}

#[tokio::test]
async fn test_failed_older_send_does_not_roll_back_newer_value() {
    let gw = gateway(vec![task(1, "1")]).await;
    let base = gw.task(TaskId(1)).unwrap();
    let tx_a = gw.service().gated_update();
    let tx_b = gw.service().gated_update();

    let send_a = gw.edit(TaskId(1), TaskPatch::title("A"));
    let send_b = async {
        until_calls(&gw, 1).await;
        gw.edit(TaskId(1), TaskPatch::title("B")).await
    };
    let replies = async {
        until_calls(&gw, 2).await;
        let _ = tx_a.send(Err(ServiceError::Transport("timeout".into())));
        tokio::task::yield_now().await;
        let _ = tx_b.send(Ok(titled(base.clone(), "B")));
    };
    let (a, b, ()) = tokio::join!(send_a, send_b, replies);

    assert_eq!(a.unwrap(), MutationOutcome::Superseded);
    assert_eq!(b.unwrap(), MutationOutcome::Confirmed);
    assert_eq!(gw.task(TaskId(1)).unwrap().title, "B");
}

// ---------------------------------------------------------------------------
// Rollback and soft failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_transport_failure_rolls_back_edit() {
    let gw = gateway(vec![titled(task(1, "1"), "old")]).await;
    gw.service()
        .reply_update(Err(ServiceError::Transport("connection reset".into())));

    let err = gw.edit(TaskId(1), TaskPatch::title("new")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert_eq!(gw.task(TaskId(1)).unwrap().title, "old");
    assert_eq!(gw.in_flight(), 0);
}

#[tokio::test]
async fn test_failed_start_edit_spares_concurrent_title_edit() {
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
    let mut t1 = task(1, "1");
    t1.duration = 5.0;
    t1.planned_start = Some(start);
    t1.planned_end = Some(start + Duration::hours(5));
    let gw = gateway(vec![t1.clone()]).await;
    let tx_start = gw.service().gated_update();
    let tx_title = gw.service().gated_update();

    let moved = start + Duration::days(2);
    let send_start = gw.edit(
        TaskId(1),
        TaskPatch {
            planned_start: Some(Some(moved)),
            ..TaskPatch::default()
        },
    );
    let send_title = async {
        until_calls(&gw, 1).await;
        gw.edit(TaskId(1), TaskPatch::title("Pour slab B")).await
    };
    let replies = async {
        until_calls(&gw, 2).await;
        let t = gw.task(TaskId(1)).unwrap();
        assert_eq!(t.planned_start, Some(moved));
        assert!(t.planned_end > Some(moved));
        let _ = tx_start.send(Err(ServiceError::Transport("timeout".into())));
        tokio::task::yield_now().await;
        let _ = tx_title.send(Ok(titled(t1.clone(), "Pour slab B")));
    };
    let (started, retitled, ()) = tokio::join!(send_start, send_title, replies);

    assert_eq!(started.unwrap_err().kind(), ErrorKind::TransientNetwork);
    assert_eq!(retitled.unwrap(), MutationOutcome::Confirmed);
    let t = gw.task(TaskId(1)).unwrap();
    assert_eq!(t.title, "Pour slab B");
    assert_eq!(t.planned_start, Some(start));
    assert_eq!(t.planned_end, Some(start + Duration::hours(5)));
    assert_eq!(gw.in_flight(), 0);
}

#[tokio::test]
async fn test_edit_of_task_gone_on_server_removes_it() {
    let gw = gateway(vec![task(1, "1"), task(2, "2")]).await;
    gw.service()
        .reply_update(Err(ServiceError::NotFound("task 2".into())));

    let outcome = gw.edit(TaskId(2), TaskPatch::title("x")).await.unwrap();

    assert_eq!(outcome, MutationOutcome::RemovedRemotely);
    assert!(gw.task(TaskId(2)).is_none());
}

#[tokio::test]
async fn test_delete_soft_failure_keeps_task_removed() {
    let gw = gateway(vec![task(1, "1"), task(2, "2")]).await;
    gw.service()
        .deletes
        .borrow_mut()
        .push_back(Err(ServiceError::Transport("timeout".into())));

    let outcome = gw.delete(TaskId(1)).await.unwrap();

    assert_eq!(outcome, MutationOutcome::RemovedRemotely);
    assert!(gw.task(TaskId(1)).is_none());
}

#[tokio::test]
async fn test_rejected_delete_restores_task_in_place() {
    let gw = gateway(vec![task(1, "1"), task(2, "2"), task(3, "3")]).await;
    let before = gw.tasks();
    gw.service()
        .deletes
        .borrow_mut()
        .push_back(Err(ServiceError::Rejected("task has actuals".into())));

    let err = gw.delete(TaskId(2)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(gw.tasks(), before);
}

#[tokio::test]
async fn test_rejected_create_drops_tentative_task() {
    let gw = gateway(vec![task(1, "1")]).await;
    gw.service()
        .reply_create(Err(ServiceError::Rejected("duplicate code".into())));

    let draft = TaskDraft::new(HierarchyCode::parse("2").unwrap(), "Pour slab");
    let err = gw.create(draft).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Rejected);
    let ids: Vec<TaskId> = gw.tasks().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![TaskId(1)]);
}

// ---------------------------------------------------------------------------
// Recompute
// ---------------------------------------------------------------------------

fn scheduled(id: i64, code: &str, total_float: f64) -> Task {
    let mut t = task(id, code);
    t.duration = 10.0;
    t.schedule = ScheduleFacts {
        total_float: Some(total_float),
        ..ScheduleFacts::default()
    };
    t
}

#[tokio::test]
async fn test_recompute_replaces_store_and_failure_keeps_it() {
    let gw = gateway(vec![task(1, "1"), task(2, "2")]).await;
    let generation = gw.generation();
    gw.service()
        .reply_pass(Ok(vec![scheduled(1, "1", 0.0), scheduled(2, "2", 4.0)]));

    let outcome = gw.recompute().await.unwrap();
    assert_eq!(outcome, MutationOutcome::Replaced(2));
    assert_eq!(gw.generation(), generation + 1);
    assert!(gw.task(TaskId(1)).unwrap().is_critical());
    assert!(!gw.task(TaskId(2)).unwrap().is_critical());

    let before = gw.tasks();
    gw.service()
        .reply_pass(Err(ServiceError::Cycle("1 -> 2 -> 1".into())));
    let err = gw.recompute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cycle);
    assert_eq!(gw.tasks(), before);
    assert_eq!(gw.generation(), generation + 1);
}

#[tokio::test]
async fn test_superseded_recompute_is_discarded() {
    let gw = gateway(vec![task(1, "1")]).await;
    let tx_first = gw.service().gated_pass();

    let first = gw.recompute();
    let second = async {
        until_calls(&gw, 1).await;
        gw.service().reply_pass(Ok(vec![scheduled(1, "1", 0.0)]));
        let outcome = gw.recompute().await;
        let _ = tx_first.send(Ok(vec![scheduled(1, "1", 8.0)]));
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), MutationOutcome::Superseded);
    assert_eq!(second.unwrap(), MutationOutcome::Replaced(1));
    assert_eq!(gw.task(TaskId(1)).unwrap().schedule.total_float, Some(0.0));
}

#[tokio::test]
async fn test_echo_after_replace_all_keeps_recomputed_schedule() {
    let mut t1 = task(1, "1");
    t1.duration = 8.0;
    let gw = gateway(vec![t1.clone()]).await;
    let tx_edit = gw.service().gated_update();

    let edit = gw.edit(
        TaskId(1),
        TaskPatch {
            title: Some("Pour slab B".into()),
            duration: Some(5.0),
            ..TaskPatch::default()
        },
    );
    let replace = async {
        until_calls(&gw, 1).await;
        gw.service().reply_pass(Ok(vec![scheduled(1, "1", 0.0)]));
        gw.recompute().await.unwrap();
        let mut echo = titled(t1.clone(), "Pour slab B");
        echo.duration = 5.0;
        echo.schedule.total_float = Some(3.0);
        let _ = tx_edit.send(Ok(echo));
    };
    let (edit, ()) = tokio::join!(edit, replace);

    assert_eq!(edit.unwrap(), MutationOutcome::Superseded);
    let t = gw.task(TaskId(1)).unwrap();
    assert_eq!(t.title, "t1");
    assert_eq!(t.duration, 10.0);
    assert_eq!(t.schedule.total_float, Some(0.0));
}

#[tokio::test]
async fn test_title_echo_after_replace_all_is_applied() {
    let gw = gateway(vec![task(1, "1")]).await;
    let tx_edit = gw.service().gated_update();

    let edit = gw.edit(TaskId(1), TaskPatch::title("Pour slab B"));
    let replace = async {
        until_calls(&gw, 1).await;
        gw.service().reply_pass(Ok(vec![scheduled(1, "1", 0.0)]));
        gw.recompute().await.unwrap();
        let mut echo = titled(task(1, "1"), "Pour slab B");
        echo.schedule.total_float = Some(3.0);
        let _ = tx_edit.send(Ok(echo));
    };
    let (edit, ()) = tokio::join!(edit, replace);

    assert_eq!(edit.unwrap(), MutationOutcome::Confirmed);
    let t = gw.task(TaskId(1)).unwrap();
    assert_eq!(t.title, "Pour slab B");
    assert_eq!(t.duration, 10.0);
    assert_eq!(t.schedule.total_float, Some(0.0));
}
