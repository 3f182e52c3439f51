use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::dependency::Dependency;
use crate::model::task::{Priority, Task, TaskId, TaskKind, TaskStatus};
use crate::ops::hierarchy::{CollapseSet, HierarchyIndex, sorted_by_hierarchy};

/// One row of the hierarchical grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub id: TaskId,
    pub code: String,
    pub title: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Display depth; orphaned fragments sit at 0
    pub indent: usize,
    pub has_children: bool,
    pub collapsed: bool,
    pub orphaned: bool,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub duration: f64,
    pub total_float: Option<f64>,
    pub critical: bool,
    /// Compact labels such as `3`, `4SS`, `7FF+2.0h`
    pub dependencies: Vec<String>,
}

/// Hierarchy-ordered rows of every visible task. With `show_all` collapse
/// state is ignored (rows still report whether they are collapsed).
pub fn project_grid(tasks: &[Task], collapsed: &CollapseSet, show_all: bool) -> Vec<GridRow> {
    let index = HierarchyIndex::build(tasks);
    sorted_by_hierarchy(tasks)
        .into_iter()
        .filter(|t| show_all || index.is_visible(t, collapsed))
        .map(|t| GridRow {
            id: t.id,
            code: t.hierarchy_code.to_string(),
            title: t.title.clone(),
            kind: t.kind,
            status: t.status.clone(),
            priority: t.priority,
            indent: index.indent(&t.hierarchy_code),
            has_children: index.has_children(&t.hierarchy_code),
            collapsed: collapsed.contains(&t.hierarchy_code),
            orphaned: index.is_orphan(&t.hierarchy_code),
            planned_start: t.planned_start,
            planned_end: t.planned_end,
            duration: t.duration,
            total_float: t.schedule.total_float,
            critical: t.is_critical(),
            dependencies: t.dependencies.iter().map(dependency_label).collect(),
        })
        .collect()
}

/// `<target><relation suffix><lag>`; finish-to-start has no suffix and a
/// zero lag is omitted.
pub fn dependency_label(dep: &Dependency) -> String {
    let mut label = format!("{}{}", dep.target_id, dep.relation.label_suffix());
    if dep.lag != 0.0 {
        label.push_str(&format!("{:+.1}h", dep.lag));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dependency::Relation;
    use crate::model::wbs::HierarchyCode;
    use pretty_assertions::assert_eq;

    fn task(id: i64, code: &str) -> Task {
        Task::new(TaskId(id), HierarchyCode::parse(code).unwrap(), format!("t{}", id))
    }

    #[test]
    fn test_dependency_label() {
        assert_eq!(dependency_label(&Dependency::on(TaskId(3))), "3");
        assert_eq!(
            dependency_label(&Dependency::on(TaskId(4)).with_relation(Relation::StartToStart)),
            "4SS"
        );
        assert_eq!(
            dependency_label(
                &Dependency::on(TaskId(7))
                    .with_relation(Relation::FinishToFinish)
                    .with_lag(2.0)
            ),
            "7FF+2.0h"
        );
        assert_eq!(dependency_label(&Dependency::on(TaskId(8)).with_lag(-1.5)), "8-1.5h");
    }

    #[test]
    fn test_grid_hierarchy_order_and_annotations() {
        let mut t5 = task(5, "1.2");
        t5.dependencies.push(Dependency::on(TaskId(3)));
        let tasks = vec![task(9, "2"), t5, task(1, "1"), task(3, "1.10"), task(4, "7.1")];

        let rows = project_grid(&tasks, &CollapseSet::new(), false);
        let codes: Vec<&str> = rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["1", "1.2", "1.10", "2", "7.1"]);

        assert!(rows[0].has_children);
        assert_eq!(rows[1].indent, 1);
        assert_eq!(rows[1].dependencies, vec!["3".to_string()]);
        assert!(rows[4].orphaned);
        assert_eq!(rows[4].indent, 0);
    }

    #[test]
    fn test_grid_respects_collapse() {
        let tasks = vec![task(1, "1"), task(2, "1.1"), task(3, "1.1.1"), task(4, "2")];
        let collapsed: CollapseSet = vec![HierarchyCode::parse("1").unwrap()].into_iter().collect();

        let rows = project_grid(&tasks, &collapsed, false);
        let ids: Vec<i64> = rows.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 4]);
        assert!(rows[0].collapsed);

        let rows = project_grid(&tasks, &collapsed, true);
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_grid_total_over_sparse_tasks() {
        let rows = project_grid(&[], &CollapseSet::new(), false);
        assert!(rows.is_empty());

        let rows = project_grid(&[task(1, "1")], &CollapseSet::new(), false);
        assert_eq!(rows[0].planned_start, None);
        assert!(!rows[0].critical);
    }
}
