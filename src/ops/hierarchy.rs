use std::collections::BTreeSet;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::model::task::Task;
use crate::model::wbs::HierarchyCode;

/// Hierarchy codes the user has collapsed. Client-local; never sent to the
/// service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollapseSet(BTreeSet<HierarchyCode>);

impl CollapseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `code`. Returns true if the code is now collapsed.
    pub fn toggle(&mut self, code: &HierarchyCode) -> bool {
        if self.0.remove(code) {
            false
        } else {
            self.0.insert(code.clone());
            true
        }
    }

    pub fn contains(&self, code: &HierarchyCode) -> bool {
        self.0.contains(code)
    }

    pub fn insert(&mut self, code: HierarchyCode) -> bool {
        self.0.insert(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HierarchyCode> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<HierarchyCode> for CollapseSet {
    fn from_iter<I: IntoIterator<Item = HierarchyCode>>(iter: I) -> Self {
        CollapseSet(iter.into_iter().collect())
    }
}

/// Parent/child and visibility facts derived from the codes present in a
/// task set.
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    codes: BTreeSet<HierarchyCode>,
}

impl HierarchyIndex {
    pub fn build<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        HierarchyIndex {
            codes: tasks.into_iter().map(|t| t.hierarchy_code.clone()).collect(),
        }
    }

    pub fn contains(&self, code: &HierarchyCode) -> bool {
        self.codes.contains(code)
    }

    /// True iff some other code has `code` as a strict prefix. Descendants
    /// sort immediately after their ancestor, so only the next code needs
    /// to be looked at.
    pub fn has_children(&self, code: &HierarchyCode) -> bool {
        self.codes
            .range((Bound::Excluded(code), Bound::Unbounded))
            .next()
            .is_some_and(|next| code.is_ancestor_of(next))
    }

    /// Hidden only when an ancestor is collapsed. An ancestor code with no
    /// task behind it cannot hide anything.
    pub fn is_visible(&self, task: &Task, collapsed: &CollapseSet) -> bool {
        !task
            .hierarchy_code
            .ancestors()
            .any(|a| collapsed.contains(&a) && self.codes.contains(&a))
    }

    /// First ancestor code with no task behind it, if any
    pub fn missing_ancestor(&self, code: &HierarchyCode) -> Option<HierarchyCode> {
        code.ancestors().find(|a| !self.codes.contains(a))
    }

    /// An orphaned fragment is displayed as a top-level node.
    pub fn is_orphan(&self, code: &HierarchyCode) -> bool {
        self.missing_ancestor(code).is_some()
    }

    /// Display depth: outline level minus one, or zero for orphans.
    pub fn indent(&self, code: &HierarchyCode) -> usize {
        if self.is_orphan(code) {
            0
        } else {
            code.outline_level().saturating_sub(1)
        }
    }
}

/// Tasks ordered by hierarchy code (numeric per segment), ties broken by id.
pub fn sorted_by_hierarchy<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<&'a Task> {
    let mut sorted: Vec<&Task> = tasks.into_iter().collect();
    sorted.sort_by(|a, b| {
        a.hierarchy_code
            .cmp(&b.hierarchy_code)
            .then(a.id.cmp(&b.id))
    });
    sorted
}
