use std::cell::RefCell;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::gateway::{GatewayError, MutationGateway, MutationOutcome};
use crate::model::dependency::Dependency;
use crate::model::task::{TaskDraft, TaskId, TaskPatch, TaskStatus};
use crate::model::wbs::HierarchyCode;
use crate::ops::hierarchy::CollapseSet;
use crate::ops::store::StoreError;
use crate::service::TaskService;
use crate::views::{
    BoardColumn, BoardLane, BoardOrder, GridRow, Network, Timeline, project_board, project_grid,
    project_network, project_timeline,
};

/// Everything a view may ask for. Any interaction technique (drag, keys,
/// a script) produces the same intents.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SetStatus { id: TaskId, status: TaskStatus },
    EditField { id: TaskId, patch: TaskPatch },
    AddDependency { owner: TaskId, edge: Dependency },
    RemoveDependency { owner: TaskId, target: TaskId },
    ToggleCollapse { code: HierarchyCode },
    RequestRecompute,
    CreateTask { draft: TaskDraft },
    DeleteTask { id: TaskId },
    /// Drop a board card at `index` in `column`; a column change is a
    /// status change
    MoveCard {
        id: TaskId,
        column: BoardColumn,
        index: usize,
    },
}

/// One open project: the gateway plus the client-local view state every
/// projection reads.
pub struct Session<S: TaskService> {
    gateway: MutationGateway<S>,
    collapsed: RefCell<CollapseSet>,
    board_order: RefCell<BoardOrder>,
}

impl<S: TaskService> Session<S> {
    pub fn new(gateway: MutationGateway<S>, collapsed: CollapseSet) -> Self {
        Session {
            gateway,
            collapsed: RefCell::new(collapsed),
            board_order: RefCell::new(BoardOrder::new()),
        }
    }

    pub fn gateway(&self) -> &MutationGateway<S> {
        &self.gateway
    }

    pub fn collapsed(&self) -> CollapseSet {
        self.collapsed.borrow().clone()
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<MutationOutcome, GatewayError> {
        debug!(?intent, "dispatch");
        match intent {
            Intent::SetStatus { id, status } => self.gateway.set_status(id, status).await,
            Intent::EditField { id, patch } => self.gateway.edit(id, patch).await,
            Intent::AddDependency { owner, edge } => self.gateway.add_dependency(owner, edge).await,
            Intent::RemoveDependency { owner, target } => {
                self.gateway.remove_dependency(owner, target).await
            }
            Intent::ToggleCollapse { code } => {
                self.collapsed.borrow_mut().toggle(&code);
                Ok(MutationOutcome::Local)
            }
            Intent::RequestRecompute => self.gateway.recompute().await,
            Intent::CreateTask { draft } => self.gateway.create(draft).await,
            Intent::DeleteTask { id } => {
                let outcome = self.gateway.delete(id).await?;
                self.board_order.borrow_mut().forget(id);
                Ok(outcome)
            }
            Intent::MoveCard { id, column, index } => self.move_card(id, column, index).await,
        }
    }

    async fn move_card(
        &self,
        id: TaskId,
        column: BoardColumn,
        index: usize,
    ) -> Result<MutationOutcome, GatewayError> {
        let status = self
            .gateway
            .task(id)
            .map(|t| t.status)
            .ok_or(StoreError::NotFound(id))?;
        let lane: Vec<TaskId> = self
            .board()
            .into_iter()
            .find(|lane| lane.column == column)
            .map(|lane| lane.cards.iter().map(|c| c.id).collect())
            .unwrap_or_default();
        self.board_order
            .borrow_mut()
            .move_card(id, column, index, &lane);

        if BoardColumn::for_status(&status) == column {
            Ok(MutationOutcome::Local)
        } else {
            self.gateway.set_status(id, column.status()).await
        }
    }

    // -----------------------------------------------------------------------
    // Projections
    // -----------------------------------------------------------------------

    pub fn grid(&self, show_all: bool) -> Vec<GridRow> {
        project_grid(&self.gateway.tasks(), &self.collapsed.borrow(), show_all)
    }

    pub fn board(&self) -> Vec<BoardLane> {
        project_board(&self.gateway.tasks(), &self.board_order.borrow())
    }

    pub fn timeline(&self, now: DateTime<Utc>) -> Timeline {
        project_timeline(&self.gateway.tasks(), now)
    }

    pub fn network(&self) -> Network {
        project_network(&self.gateway.tasks())
    }
}
