use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::dependency::Relation;
use crate::model::task::{Task, TaskId, TaskKind, TaskStatus};

/// A task with the scheduler's figures exactly as received
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkNode {
    pub id: TaskId,
    pub code: String,
    pub title: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub duration: f64,
    pub early_start: Option<DateTime<Utc>>,
    pub early_finish: Option<DateTime<Utc>>,
    pub late_start: Option<DateTime<Utc>>,
    pub late_finish: Option<DateTime<Utc>>,
    pub total_float: Option<f64>,
    pub free_float: Option<f64>,
    pub is_critical_path: bool,
}

/// Drawn from predecessor (`from`) to successor (`to`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub relation: Relation,
    pub lag: f64,
    /// The predecessor is not in the task set
    pub dangling: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Network {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

/// Nodes in store order plus every raw edge. Layout is left to whatever
/// draws it.
pub fn project_network(tasks: &[Task]) -> Network {
    let known: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let known = &known;
    let nodes = tasks
        .iter()
        .map(|t| NetworkNode {
            id: t.id,
            code: t.hierarchy_code.to_string(),
            title: t.title.clone(),
            kind: t.kind,
            status: t.status.clone(),
            duration: t.duration,
            early_start: t.schedule.early_start,
            early_finish: t.schedule.early_finish,
            late_start: t.schedule.late_start,
            late_finish: t.schedule.late_finish,
            total_float: t.schedule.total_float,
            free_float: t.schedule.free_float,
            is_critical_path: t.is_critical(),
        })
        .collect();
    let edges = tasks
        .iter()
        .flat_map(|t| {
            t.dependencies.iter().map(move |d| NetworkEdge {
                from: d.target_id,
                to: t.id,
                relation: d.relation,
                lag: d.lag,
                dangling: !known.contains(&d.target_id),
            })
        })
        .collect();
    Network { nodes, edges }
}
