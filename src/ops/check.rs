use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::model::task::{Task, TaskId};
use crate::ops::hierarchy::HierarchyIndex;

/// Structured result from `tn check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error. Any of these blocks a scheduling pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// A dependency targets a task id that doesn't exist
    #[serde(rename = "dangling_dep")]
    DanglingDep { task_id: TaskId, target_id: TaskId },
    /// Two tasks share a hierarchy code
    #[serde(rename = "duplicate_code")]
    DuplicateCode { code: String, task_ids: Vec<TaskId> },
    /// Two tasks share an id
    #[serde(rename = "duplicate_id")]
    DuplicateId { task_id: TaskId },
    /// A task depends on itself
    #[serde(rename = "self_dep")]
    SelfDep { task_id: TaskId },
    /// Precedence cycle; the path starts and ends on the same task
    #[serde(rename = "cycle")]
    Cycle { path: Vec<TaskId> },
}

/// A validation warning (non-critical issue).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// An ancestor code has no task; the task displays at top level
    #[serde(rename = "orphan")]
    Orphan {
        task_id: TaskId,
        code: String,
        missing: String,
    },
    /// Summary task with nothing to roll up
    #[serde(rename = "empty_summary")]
    EmptySummary { task_id: TaskId, code: String },
    /// More than one edge to the same predecessor
    #[serde(rename = "duplicate_edge")]
    DuplicateEdge { task_id: TaskId, target_id: TaskId },
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::DanglingDep { task_id, target_id } => {
                write!(f, "task {} depends on missing task {}", task_id, target_id)
            }
            CheckError::DuplicateCode { code, task_ids } => {
                let ids: Vec<String> = task_ids.iter().map(|id| id.to_string()).collect();
                write!(f, "code {} is used by tasks {}", code, ids.join(", "))
            }
            CheckError::DuplicateId { task_id } => write!(f, "task id {} is not unique", task_id),
            CheckError::SelfDep { task_id } => write!(f, "task {} depends on itself", task_id),
            CheckError::Cycle { path } => {
                let ids: Vec<String> = path.iter().map(|id| id.to_string()).collect();
                write!(f, "cycle {}", ids.join(" -> "))
            }
        }
    }
}

impl fmt::Display for CheckWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckWarning::Orphan { task_id, code, missing } => {
                write!(f, "task {} ({}) has no parent task at {}", task_id, code, missing)
            }
            CheckWarning::EmptySummary { task_id, code } => {
                write!(f, "summary task {} ({}) has no children", task_id, code)
            }
            CheckWarning::DuplicateEdge { task_id, target_id } => {
                write!(f, "task {} lists dependency on {} more than once", task_id, target_id)
            }
        }
    }
}

impl CheckResult {
    pub fn has_cycle(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, CheckError::Cycle { .. } | CheckError::SelfDep { .. }))
    }
}

// ---------------------------------------------------------------------------
// Main check entry point
// ---------------------------------------------------------------------------

/// Validate a task set and return structured results. Read-only.
///
/// Checks performed:
/// 1. Every dependency target exists
/// 2. Ids and hierarchy codes are unique
/// 3. No self-dependencies and no precedence cycles
/// 4. Warnings for orphaned fragments, empty summaries, repeated edges
pub fn check_tasks(tasks: &[Task]) -> CheckResult {
    let mut result = CheckResult::default();
    let ids: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let index = HierarchyIndex::build(tasks);

    check_duplicates(tasks, &mut result);

    for task in tasks {
        let mut seen = HashSet::new();
        for dep in &task.dependencies {
            if !seen.insert(dep.target_id) {
                result.warnings.push(CheckWarning::DuplicateEdge {
                    task_id: task.id,
                    target_id: dep.target_id,
                });
                continue;
            }
            if dep.target_id == task.id {
                result.errors.push(CheckError::SelfDep { task_id: task.id });
            } else if !ids.contains(&dep.target_id) {
                result.errors.push(CheckError::DanglingDep {
                    task_id: task.id,
                    target_id: dep.target_id,
                });
            }
        }

        if let Some(missing) = index.missing_ancestor(&task.hierarchy_code) {
            result.warnings.push(CheckWarning::Orphan {
                task_id: task.id,
                code: task.hierarchy_code.to_string(),
                missing: missing.to_string(),
            });
        }
        if task.is_summary() && !index.has_children(&task.hierarchy_code) {
            result.warnings.push(CheckWarning::EmptySummary {
                task_id: task.id,
                code: task.hierarchy_code.to_string(),
            });
        }
    }

    for path in find_cycles(tasks) {
        result.errors.push(CheckError::Cycle { path });
    }

    result.valid = result.errors.is_empty();
    result
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_duplicates(tasks: &[Task], result: &mut CheckResult) {
    let mut by_code: BTreeMap<_, Vec<TaskId>> = BTreeMap::new();
    let mut seen_ids = HashSet::new();
    for task in tasks {
        by_code
            .entry(task.hierarchy_code.clone())
            .or_default()
            .push(task.id);
        if !seen_ids.insert(task.id) {
            result.errors.push(CheckError::DuplicateId { task_id: task.id });
        }
    }
    for (code, task_ids) in by_code {
        if task_ids.len() > 1 {
            result.errors.push(CheckError::DuplicateCode {
                code: code.to_string(),
                task_ids,
            });
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Open,
    Done,
}

/// Every distinct cycle reachable by DFS over successor -> predecessor
/// edges. Self-edges are reported separately and skipped here.
fn find_cycles(tasks: &[Task]) -> Vec<Vec<TaskId>> {
    let edges: HashMap<TaskId, Vec<TaskId>> = tasks
        .iter()
        .map(|t| {
            let targets = t
                .dependencies
                .iter()
                .map(|d| d.target_id)
                .filter(|target| *target != t.id)
                .collect();
            (t.id, targets)
        })
        .collect();

    let mut marks: HashMap<TaskId, Mark> = HashMap::new();
    let mut cycles = Vec::new();
    let mut reported: HashSet<Vec<TaskId>> = HashSet::new();

    for task in tasks {
        if marks.contains_key(&task.id) {
            continue;
        }
        // Iterative DFS: (node, next edge index)
        let mut stack: Vec<(TaskId, usize)> = vec![(task.id, 0)];
        marks.insert(task.id, Mark::Open);
        while let Some((node, next)) = stack.last().copied() {
            let targets = edges.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if next >= targets.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let target = targets[next];
            if !edges.contains_key(&target) {
                continue;
            }
            match marks.get(&target) {
                None => {
                    marks.insert(target, Mark::Open);
                    stack.push((target, 0));
                }
                Some(Mark::Open) => {
                    let start = stack.iter().position(|(id, _)| *id == target).unwrap_or(0);
                    let mut path: Vec<TaskId> = stack[start..].iter().map(|(id, _)| *id).collect();
                    let mut key = path.clone();
                    key.sort();
                    if reported.insert(key) {
                        path.push(target);
                        cycles.push(path);
                    }
                }
                Some(Mark::Done) => {}
            }
        }
    }
    cycles
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
