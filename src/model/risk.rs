use serde::{Deserialize, Serialize};

use crate::model::project::ProjectId;
use crate::model::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskId(pub i64);

impl std::fmt::Display for RiskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry in the project risk register. Independent of the task network;
/// `task_id` is a loose reference and may dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: RiskId,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 0.0-1.0 or a 1-5 scale, whichever the register uses
    #[serde(default)]
    pub probability: f64,
    /// 1-5
    #[serde(default)]
    pub impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation_plan: Option<String>,
    /// identified, monitored, mitigated, occurred, closed
    #[serde(default = "default_risk_status")]
    pub status: String,
}

impl Risk {
    pub fn score(&self) -> f64 {
        self.probability * self.impact
    }
}

fn default_risk_status() -> String {
    "identified".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl RiskDraft {
    pub fn into_risk(self, id: RiskId, project_id: ProjectId) -> Risk {
        Risk {
            id,
            project_id,
            task_id: self.task_id,
            title: self.title,
            description: self.description,
            probability: self.probability,
            impact: self.impact,
            mitigation_plan: self.mitigation_plan,
            status: default_risk_status(),
        }
    }
}
