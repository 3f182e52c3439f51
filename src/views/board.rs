use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::task::{Priority, Task, TaskId, TaskKind, TaskStatus};

/// The four fixed status columns, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardColumn {
    NotStarted,
    InProgress,
    Stalled,
    Completed,
}

impl BoardColumn {
    pub const ALL: [BoardColumn; 4] = [
        BoardColumn::NotStarted,
        BoardColumn::InProgress,
        BoardColumn::Stalled,
        BoardColumn::Completed,
    ];

    /// Column for a status. Cancelled work sits with completed work;
    /// anything unrecognised lands in the first column.
    pub fn for_status(status: &TaskStatus) -> BoardColumn {
        match status {
            TaskStatus::NotStarted => BoardColumn::NotStarted,
            TaskStatus::InProgress => BoardColumn::InProgress,
            TaskStatus::Stalled => BoardColumn::Stalled,
            TaskStatus::Completed | TaskStatus::Cancelled => BoardColumn::Completed,
            TaskStatus::Other(_) => BoardColumn::NotStarted,
        }
    }

    /// Status a card takes when dropped into this column
    pub fn status(self) -> TaskStatus {
        match self {
            BoardColumn::NotStarted => TaskStatus::NotStarted,
            BoardColumn::InProgress => TaskStatus::InProgress,
            BoardColumn::Stalled => TaskStatus::Stalled,
            BoardColumn::Completed => TaskStatus::Completed,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            BoardColumn::NotStarted => "not_started",
            BoardColumn::InProgress => "in_progress",
            BoardColumn::Stalled => "stalled",
            BoardColumn::Completed => "completed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BoardColumn::NotStarted => "Waiting / Pending",
            BoardColumn::InProgress => "Active / Execution",
            BoardColumn::Stalled => "Stalled / Paused",
            BoardColumn::Completed => "Finalized / Verified",
        }
    }
}

impl fmt::Display for BoardColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for BoardColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::parse_loose(s)
            .map(|status| BoardColumn::for_status(&status))
            .ok_or_else(|| format!("unknown column: {}", s))
    }
}

/// Session-local card order. Never persisted and never sent anywhere; a
/// card with no recorded position keeps its store order after the
/// positioned ones.
#[derive(Debug, Clone, Default)]
pub struct BoardOrder {
    columns: HashMap<BoardColumn, Vec<TaskId>>,
}

impl BoardOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` at `index` within `column`, removing it from wherever it
    /// was before. `current` is the column's order as last projected.
    pub fn move_card(&mut self, id: TaskId, column: BoardColumn, index: usize, current: &[TaskId]) {
        for ids in self.columns.values_mut() {
            ids.retain(|x| *x != id);
        }
        let mut ids: Vec<TaskId> = current.iter().copied().filter(|x| *x != id).collect();
        let index = index.min(ids.len());
        ids.insert(index, id);
        self.columns.insert(column, ids);
    }

    pub fn forget(&mut self, id: TaskId) {
        for ids in self.columns.values_mut() {
            ids.retain(|x| *x != id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.values().all(Vec::is_empty)
    }

    fn arrange<'a>(&self, column: BoardColumn, tasks: Vec<&'a Task>) -> Vec<&'a Task> {
        let Some(order) = self.columns.get(&column) else {
            return tasks;
        };
        let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, *t)).collect();
        let mut placed = HashSet::new();
        let mut arranged: Vec<&Task> = order
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .inspect(|t| {
                placed.insert(t.id);
            })
            .collect();
        arranged.extend(tasks.into_iter().filter(|t| !placed.contains(&t.id)));
        arranged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardCard {
    pub id: TaskId,
    pub code: String,
    pub title: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: Priority,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardLane {
    pub column: BoardColumn,
    pub label: &'static str,
    pub cards: Vec<BoardCard>,
}

/// All tasks grouped into exactly four lanes. Hierarchy visibility does not
/// apply.
pub fn project_board(tasks: &[Task], order: &BoardOrder) -> Vec<BoardLane> {
    BoardColumn::ALL
        .into_iter()
        .map(|column| {
            let members: Vec<&Task> = tasks
                .iter()
                .filter(|t| BoardColumn::for_status(&t.status) == column)
                .collect();
            let cards = order
                .arrange(column, members)
                .into_iter()
                .map(|t| BoardCard {
                    id: t.id,
                    code: t.hierarchy_code.to_string(),
                    title: t.title.clone(),
                    kind: t.kind,
                    status: t.status.clone(),
                    priority: t.priority,
                    critical: t.is_critical(),
                })
                .collect();
            BoardLane {
                column,
                label: column.label(),
                cards,
            }
        })
        .collect()
}
