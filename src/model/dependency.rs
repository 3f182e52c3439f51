use serde::{Deserialize, Serialize};

use crate::model::task::TaskId;

/// Precedence relation type of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Relation {
    #[default]
    #[serde(rename = "FS", alias = "fs", alias = "finish_to_start")]
    FinishToStart,
    #[serde(rename = "SS", alias = "ss", alias = "start_to_start")]
    StartToStart,
    #[serde(rename = "FF", alias = "ff", alias = "finish_to_finish")]
    FinishToFinish,
    #[serde(rename = "SF", alias = "sf", alias = "start_to_finish")]
    StartToFinish,
}

impl Relation {
    /// Two-letter wire code
    pub fn code(self) -> &'static str {
        match self {
            Relation::FinishToStart => "FS",
            Relation::StartToStart => "SS",
            Relation::FinishToFinish => "FF",
            Relation::StartToFinish => "SF",
        }
    }

    /// Suffix used in compact dependency labels; finish-to-start is implied.
    pub fn label_suffix(self) -> &'static str {
        match self {
            Relation::FinishToStart => "",
            other => other.code(),
        }
    }

    pub fn from_code(s: &str) -> Option<Relation> {
        let normalized = s
            .trim()
            .to_ascii_uppercase()
            .replace(|c: char| c == '-' || c == '_' || c == ' ', "");
        match normalized.as_str() {
            "FS" | "FINISHTOSTART" => Some(Relation::FinishToStart),
            "SS" | "STARTTOSTART" => Some(Relation::StartToStart),
            "FF" | "FINISHTOFINISH" => Some(Relation::FinishToFinish),
            "SF" | "STARTTOFINISH" => Some(Relation::StartToFinish),
            _ => None,
        }
    }
}

/// A precedence edge stored on its owning task.
///
/// NAMING HAZARD: the owning task is the *successor* and `target_id` is the
/// *predecessor*. "Target" reads like the forward direction but it is not;
/// the wire format uses this name and edge semantics depend on it, so it is
/// kept as-is. An edge `{ target_id: 3 }` on task 5 means "5 waits on 3".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub target_id: TaskId,
    #[serde(default)]
    pub relation: Relation,
    /// Signed offset in hours applied at the relation's boundary
    #[serde(default)]
    pub lag: f64,
}

impl Dependency {
    /// Finish-to-start edge with no lag
    pub fn on(target_id: TaskId) -> Self {
        Dependency {
            target_id,
            relation: Relation::FinishToStart,
            lag: 0.0,
        }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    pub fn with_lag(mut self, lag: f64) -> Self {
        self.lag = lag;
        self
    }
}

/// Insert `edge` into an edge list, replacing any edge to the same target.
pub fn upsert_edge(edges: &mut Vec<Dependency>, edge: Dependency) {
    if let Some(existing) = edges.iter_mut().find(|d| d.target_id == edge.target_id) {
        *existing = edge;
    } else {
        edges.push(edge);
    }
}

/// Remove every edge to `target`. Returns true if anything was removed.
pub fn remove_edge(edges: &mut Vec<Dependency>, target: TaskId) -> bool {
    let before = edges.len();
    edges.retain(|d| d.target_id != target);
    edges.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_codes() {
        assert_eq!(Relation::from_code("ss"), Some(Relation::StartToStart));
        assert_eq!(
            Relation::from_code("finish-to-finish"),
            Some(Relation::FinishToFinish)
        );
        assert_eq!(Relation::from_code("XX"), None);
        assert_eq!(Relation::FinishToStart.label_suffix(), "");
        assert_eq!(Relation::StartToFinish.label_suffix(), "SF");
    }

    #[test]
    fn test_dependency_wire_defaults() {
        let dep: Dependency = serde_json::from_str(r#"{"target_id": 3}"#).unwrap();
        assert_eq!(dep, Dependency::on(TaskId(3)));
        let dep: Dependency =
            serde_json::from_str(r#"{"target_id": 4, "relation": "SS", "lag": -2.5}"#).unwrap();
        assert_eq!(dep.relation, Relation::StartToStart);
        assert_eq!(dep.lag, -2.5);
    }

    #[test]
    fn test_upsert_edge_unique_by_target() {
        let mut edges = vec![Dependency::on(TaskId(1)), Dependency::on(TaskId(2))];
        upsert_edge(
            &mut edges,
            Dependency::on(TaskId(1)).with_relation(Relation::StartToStart),
        );
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].relation, Relation::StartToStart);

        assert!(remove_edge(&mut edges, TaskId(2)));
        assert!(!remove_edge(&mut edges, TaskId(2)));
        assert_eq!(edges.len(), 1);
    }
}
