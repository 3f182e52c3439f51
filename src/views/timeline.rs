use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::dependency::Relation;
use crate::model::task::{Task, TaskId, TaskKind, TaskStatus, hours};
use crate::ops::hierarchy::sorted_by_hierarchy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarShape {
    Bar,
    Milestone,
    Summary,
}

impl BarShape {
    pub fn for_kind(kind: TaskKind) -> BarShape {
        match kind {
            TaskKind::Task => BarShape::Bar,
            TaskKind::Milestone => BarShape::Milestone,
            TaskKind::Summary => BarShape::Summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBar {
    pub id: TaskId,
    pub code: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub shape: BarShape,
    pub status: TaskStatus,
    pub critical: bool,
    /// Percent complete: 100, 50 or 0
    pub progress: u8,
    /// Predecessor ids, unique
    pub depends_on: Vec<TaskId>,
}

/// A link from predecessor to successor, keyed `"<target>-><owner>"`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineLink {
    pub key: String,
    pub from: TaskId,
    pub to: TaskId,
    pub relation: Relation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub bars: Vec<TimelineBar>,
    pub links: Vec<TimelineLink>,
}

/// The `[start, end)` a task occupies on the chart. Never empty: an end at
/// or before the start is pushed to start + 1h.
pub fn effective_interval(task: &Task, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = task.planned_start.unwrap_or(now);
    let end = task
        .planned_end
        .or_else(|| start.checked_add_signed(hours(task.duration)));
    match end {
        Some(end) if end > start => (start, end),
        _ => {
            let floor = start
                .checked_add_signed(Duration::hours(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            (start, floor)
        }
    }
}

pub fn progress(status: &TaskStatus) -> u8 {
    match status {
        TaskStatus::Completed => 100,
        TaskStatus::InProgress => 50,
        _ => 0,
    }
}

/// Bars in hierarchy order. `now` stands in for a missing planned start.
pub fn project_timeline(tasks: &[Task], now: DateTime<Utc>) -> Timeline {
    let mut bars = Vec::with_capacity(tasks.len());
    let mut links = Vec::new();
    let mut keys = HashSet::new();

    for task in sorted_by_hierarchy(tasks) {
        let (start, end) = effective_interval(task, now);
        let mut depends_on = Vec::new();
        for dep in &task.dependencies {
            if depends_on.contains(&dep.target_id) {
                continue;
            }
            depends_on.push(dep.target_id);
            let key = format!("{}->{}", dep.target_id, task.id);
            if keys.insert(key.clone()) {
                links.push(TimelineLink {
                    key,
                    from: dep.target_id,
                    to: task.id,
                    relation: dep.relation,
                });
            }
        }
        bars.push(TimelineBar {
            id: task.id,
            code: task.hierarchy_code.to_string(),
            title: task.title.clone(),
            start,
            end,
            shape: BarShape::for_kind(task.kind),
            status: task.status.clone(),
            critical: task.is_critical(),
            progress: progress(&task.status),
            depends_on,
        });
    }

    Timeline { bars, links }
}
