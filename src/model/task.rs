use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::dependency::Dependency;
use crate::model::wbs::HierarchyCode;

/// Task identifier. Negative ids are tentative: assigned locally while a
/// create is in flight and replaced by the server id on confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn is_tentative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TaskId)
    }
}

/// What sort of work item a task is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    #[serde(alias = "standard")]
    Task,
    Milestone,
    /// Synthetic container; dates roll up from descendants
    Summary,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::Milestone => "milestone",
            TaskKind::Summary => "summary",
        }
    }

    pub fn parse_loose(s: &str) -> TaskKind {
        match s.trim().to_ascii_lowercase().as_str() {
            "milestone" | "ms" => TaskKind::Milestone,
            "summary" => TaskKind::Summary,
            _ => TaskKind::Task,
        }
    }
}

/// Workflow status. Unknown wire values are kept verbatim in `Other` so a
/// round trip never loses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Stalled,
    Completed,
    Cancelled,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Stalled => "stalled",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Other(raw) => raw,
        }
    }

    /// Accepts the synonyms found in imported spreadsheets and typed on the
    /// command line. Returns `None` for anything unrecognised.
    pub fn parse_loose(s: &str) -> Option<TaskStatus> {
        let normalized = s
            .trim()
            .to_ascii_lowercase()
            .replace(|c: char| c == '-' || c == ' ', "_");
        match normalized.as_str() {
            "not_started" | "todo" | "pending" => Some(TaskStatus::NotStarted),
            "in_progress" | "active" | "started" => Some(TaskStatus::InProgress),
            "stalled" | "paused" | "blocked" => Some(TaskStatus::Stalled),
            "completed" | "complete" | "done" => Some(TaskStatus::Completed),
            "cancelled" | "canceled" | "void" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "not_started" => TaskStatus::NotStarted,
            "in_progress" => TaskStatus::InProgress,
            "stalled" => TaskStatus::Stalled,
            "completed" => TaskStatus::Completed,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Other(raw),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Priority {
    #[serde(alias = "low")]
    Low,
    #[default]
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "critical")]
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    /// Names, abbreviations, and Microsoft Project's 0-1000 numeric scale.
    /// A number between two bands rounds down to the lower one.
    pub fn parse_loose(s: &str) -> Option<Priority> {
        let s = s.trim().to_ascii_lowercase();
        if let Ok(n) = s.parse::<u32>() {
            return Some(match n {
                0..=299 => Priority::Low,
                300..=599 => Priority::Medium,
                600..=799 => Priority::High,
                _ => Priority::Critical,
            });
        }
        match s.as_str() {
            "low" | "lo" => Some(Priority::Low),
            "medium" | "med" => Some(Priority::Medium),
            "high" | "hi" => Some(Priority::High),
            "critical" | "crit" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// Figures owned by the external scheduler. Read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_finish: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_finish: Option<DateTime<Utc>>,
    /// Hours of total slack; zero marks the critical path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_float: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_float: Option<f64>,
}

impl ScheduleFacts {
    /// Zero total float. Tasks the scheduler has not seen are never critical.
    pub fn is_critical(&self) -> bool {
        self.total_float.is_some_and(|f| f.abs() < 1e-9)
    }
}

/// The unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(alias = "wbs_code")]
    pub hierarchy_code: HierarchyCode,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "task_type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<DateTime<Utc>>,
    /// Hours
    #[serde(default, alias = "original_duration")]
    pub duration: f64,
    #[serde(flatten)]
    pub schedule: ScheduleFacts,
    /// Ordered, unique by `target_id` when written through the store
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl Task {
    pub fn new(id: TaskId, hierarchy_code: HierarchyCode, title: impl Into<String>) -> Self {
        Task {
            id,
            hierarchy_code,
            title: title.into(),
            description: String::new(),
            kind: TaskKind::Task,
            status: TaskStatus::NotStarted,
            priority: Priority::Medium,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            duration: 0.0,
            schedule: ScheduleFacts::default(),
            dependencies: Vec::new(),
        }
    }

    pub fn outline_level(&self) -> usize {
        self.hierarchy_code.outline_level()
    }

    pub fn is_summary(&self) -> bool {
        self.kind == TaskKind::Summary
    }

    pub fn is_critical(&self) -> bool {
        self.schedule.is_critical()
    }

    pub fn dependency_on(&self, target: TaskId) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.target_id == target)
    }

    /// `planned_start + duration`, when there is a start and a positive
    /// duration.
    pub fn end_from_duration(&self) -> Option<DateTime<Utc>> {
        let start = self.planned_start?;
        if self.duration > 0.0 {
            start.checked_add_signed(hours(self.duration))
        } else {
            None
        }
    }

    /// Enforce `planned_end > planned_start` by advancing the end to one hour
    /// after the start. Returns true if the end was moved.
    pub fn normalize_dates(&mut self) -> bool {
        if let (Some(start), Some(end)) = (self.planned_start, self.planned_end)
            && end <= start
        {
            self.planned_end = start.checked_add_signed(Duration::hours(1));
            return true;
        }
        false
    }
}

/// Longest duration a task may carry, about 114 years
pub const MAX_DURATION_HOURS: f64 = 1_000_000.0;

/// Fractional hours as a chrono duration, clamped to zero for negative or
/// non-finite input and to [`MAX_DURATION_HOURS`] above.
pub fn hours(h: f64) -> Duration {
    if h.is_finite() && h > 0.0 {
        Duration::seconds((h.min(MAX_DURATION_HOURS) * 3600.0).round() as i64)
    } else {
        Duration::zero()
    }
}

/// Everything needed to create a task; the service assigns the id and owns
/// the computed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub hierarchy_code: HierarchyCode,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl TaskDraft {
    pub fn new(hierarchy_code: HierarchyCode, title: impl Into<String>) -> Self {
        TaskDraft {
            hierarchy_code,
            title: title.into(),
            description: String::new(),
            kind: TaskKind::Task,
            status: TaskStatus::NotStarted,
            priority: Priority::Medium,
            planned_start: None,
            planned_end: None,
            duration: 0.0,
            dependencies: Vec::new(),
        }
    }

    pub fn into_task(self, id: TaskId) -> Task {
        let mut task = Task::new(id, self.hierarchy_code, self.title);
        task.description = self.description;
        task.kind = self.kind;
        task.status = self.status;
        task.priority = self.priority;
        task.planned_start = self.planned_start;
        task.planned_end = self.planned_end;
        task.duration = self.duration;
        task.dependencies = self.dependencies;
        task.normalize_dates();
        task
    }
}

/// A user-editable task field. Scheduler-owned figures are deliberately
/// absent: nothing can patch them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskField {
    Title,
    Description,
    Kind,
    Status,
    Priority,
    HierarchyCode,
    PlannedStart,
    PlannedEnd,
    ActualStart,
    ActualEnd,
    Duration,
    Dependencies,
}

impl TaskField {
    pub const ALL: [TaskField; 12] = [
        TaskField::Title,
        TaskField::Description,
        TaskField::Kind,
        TaskField::Status,
        TaskField::Priority,
        TaskField::HierarchyCode,
        TaskField::PlannedStart,
        TaskField::PlannedEnd,
        TaskField::ActualStart,
        TaskField::ActualEnd,
        TaskField::Duration,
        TaskField::Dependencies,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskField::Title => "title",
            TaskField::Description => "description",
            TaskField::Kind => "kind",
            TaskField::Status => "status",
            TaskField::Priority => "priority",
            TaskField::HierarchyCode => "code",
            TaskField::PlannedStart => "start",
            TaskField::PlannedEnd => "end",
            TaskField::ActualStart => "actual_start",
            TaskField::ActualEnd => "actual_end",
            TaskField::Duration => "duration",
            TaskField::Dependencies => "dependencies",
        }
    }

    /// Planned dates and duration: derived for summaries, rewritten by every
    /// scheduling pass.
    pub fn is_schedule_input(self) -> bool {
        matches!(
            self,
            TaskField::PlannedStart | TaskField::PlannedEnd | TaskField::Duration
        )
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let field = match s.as_str() {
            "wbs" | "wbs_code" | "hierarchy_code" => TaskField::HierarchyCode,
            "planned_start" => TaskField::PlannedStart,
            "planned_end" | "finish" => TaskField::PlannedEnd,
            "deps" => TaskField::Dependencies,
            "type" => TaskField::Kind,
            other => TaskField::ALL
                .into_iter()
                .find(|f| f.name() == other)
                .ok_or_else(|| format!("unknown field: {}", other))?,
        };
        Ok(field)
    }
}

/// A partial update. `None` means "leave unchanged"; the nested `Option` on
/// date fields allows clearing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy_code: Option<HierarchyCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        TaskPatch {
            title: Some(title.into()),
            ..TaskPatch::default()
        }
    }

    pub fn dependencies(edges: Vec<Dependency>) -> Self {
        TaskPatch {
            dependencies: Some(edges),
            ..TaskPatch::default()
        }
    }

    /// Current values of `fields` on `task`, e.g. a rollback snapshot.
    pub fn capture(task: &Task, fields: &[TaskField]) -> Self {
        let mut patch = TaskPatch::default();
        for field in fields {
            patch.copy_field(*field, task);
        }
        patch
    }

    /// Fields this patch sets, in declaration order
    pub fn fields(&self) -> Vec<TaskField> {
        TaskField::ALL
            .into_iter()
            .filter(|f| self.touches(*f))
            .collect()
    }

    pub fn touches(&self, field: TaskField) -> bool {
        match field {
            TaskField::Title => self.title.is_some(),
            TaskField::Description => self.description.is_some(),
            TaskField::Kind => self.kind.is_some(),
            TaskField::Status => self.status.is_some(),
            TaskField::Priority => self.priority.is_some(),
            TaskField::HierarchyCode => self.hierarchy_code.is_some(),
            TaskField::PlannedStart => self.planned_start.is_some(),
            TaskField::PlannedEnd => self.planned_end.is_some(),
            TaskField::ActualStart => self.actual_start.is_some(),
            TaskField::ActualEnd => self.actual_end.is_some(),
            TaskField::Duration => self.duration.is_some(),
            TaskField::Dependencies => self.dependencies.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Drop every field for which `keep` returns false.
    pub fn retain(&mut self, keep: impl Fn(TaskField) -> bool) {
        for field in self.fields() {
            if !keep(field) {
                self.clear_field(field);
            }
        }
    }

    /// Write the set fields onto `task`. Does not normalize dates.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(v) = &self.title {
            task.title = v.clone();
        }
        if let Some(v) = &self.description {
            task.description = v.clone();
        }
        if let Some(v) = self.kind {
            task.kind = v;
        }
        if let Some(v) = &self.status {
            task.status = v.clone();
        }
        if let Some(v) = self.priority {
            task.priority = v;
        }
        if let Some(v) = &self.hierarchy_code {
            task.hierarchy_code = v.clone();
        }
        if let Some(v) = self.planned_start {
            task.planned_start = v;
        }
        if let Some(v) = self.planned_end {
            task.planned_end = v;
        }
        if let Some(v) = self.actual_start {
            task.actual_start = v;
        }
        if let Some(v) = self.actual_end {
            task.actual_end = v;
        }
        if let Some(v) = self.duration {
            task.duration = v;
        }
        if let Some(v) = &self.dependencies {
            task.dependencies = v.clone();
        }
    }

    fn copy_field(&mut self, field: TaskField, task: &Task) {
        match field {
            TaskField::Title => self.title = Some(task.title.clone()),
            TaskField::Description => self.description = Some(task.description.clone()),
            TaskField::Kind => self.kind = Some(task.kind),
            TaskField::Status => self.status = Some(task.status.clone()),
            TaskField::Priority => self.priority = Some(task.priority),
            TaskField::HierarchyCode => self.hierarchy_code = Some(task.hierarchy_code.clone()),
            TaskField::PlannedStart => self.planned_start = Some(task.planned_start),
            TaskField::PlannedEnd => self.planned_end = Some(task.planned_end),
            TaskField::ActualStart => self.actual_start = Some(task.actual_start),
            TaskField::ActualEnd => self.actual_end = Some(task.actual_end),
            TaskField::Duration => self.duration = Some(task.duration),
            TaskField::Dependencies => self.dependencies = Some(task.dependencies.clone()),
        }
    }

    fn clear_field(&mut self, field: TaskField) {
        match field {
            TaskField::Title => self.title = None,
            TaskField::Description => self.description = None,
            TaskField::Kind => self.kind = None,
            TaskField::Status => self.status = None,
            TaskField::Priority => self.priority = None,
            TaskField::HierarchyCode => self.hierarchy_code = None,
            TaskField::PlannedStart => self.planned_start = None,
            TaskField::PlannedEnd => self.planned_end = None,
            TaskField::ActualStart => self.actual_start = None,
            TaskField::ActualEnd => self.actual_end = None,
            TaskField::Duration => self.duration = None,
            TaskField::Dependencies => self.dependencies = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample() -> Task {
        let mut task = Task::new(TaskId(5), HierarchyCode::parse("1.2").unwrap(), "Pour slab");
        task.duration = 8.0;
        task.dependencies.push(Dependency::on(TaskId(3)));
        task
    }

    #[test]
    fn test_status_wire_round_trip_keeps_unknown() {
        let s: TaskStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, TaskStatus::InProgress);
        let s: TaskStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(s, TaskStatus::Other("on_hold".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"on_hold\"");
    }

    #[test]
    fn test_status_parse_loose() {
        assert_eq!(TaskStatus::parse_loose("Done"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse_loose("in progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse_loose("void"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::parse_loose("whatever"), None);
    }

    #[test]
    fn test_priority_parse_loose() {
        assert_eq!(Priority::parse_loose("crit"), Some(Priority::Critical));
        assert_eq!(Priority::parse_loose("500"), Some(Priority::Medium));
        assert_eq!(Priority::parse_loose("700"), Some(Priority::High));
        assert_eq!(Priority::parse_loose("1000"), Some(Priority::Critical));
        assert_eq!(Priority::parse_loose("?"), None);
        assert!(Priority::Low < Priority::Critical);
    }

    #[test]
    fn test_priority_numbers_between_bands_round_down() {
        let parsed: Vec<Option<Priority>> = ["200", "250", "300", "550", "600", "750", "800"]
            .iter()
            .map(|s| Priority::parse_loose(s))
            .collect();
        assert_eq!(
            parsed,
            vec![
                Some(Priority::Low),
                Some(Priority::Low),
                Some(Priority::Medium),
                Some(Priority::Medium),
                Some(Priority::High),
                Some(Priority::High),
                Some(Priority::Critical),
            ]
        );
    }

    #[test]
    fn test_task_deserializes_original_field_names() {
        let json = r#"{
            "id": 7,
            "wbs_code": "2.1",
            "title": "Survey",
            "task_type": "milestone",
            "original_duration": 4,
            "total_float": 0.0,
            "dependencies": [{"target_id": 2, "relation": "SS", "lag": 1}]
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, TaskId(7));
        assert_eq!(task.hierarchy_code.to_string(), "2.1");
        assert_eq!(task.kind, TaskKind::Milestone);
        assert_eq!(task.duration, 4.0);
        assert!(task.is_critical());
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.dependencies.len(), 1);
    }

    #[test]
    fn test_normalize_dates_advances_end() {
        let mut task = sample();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        task.planned_start = Some(start);
        task.planned_end = Some(start);
        assert!(task.normalize_dates());
        assert_eq!(task.planned_end, Some(start + Duration::hours(1)));
        assert!(!task.normalize_dates());
    }

    #[test]
    fn test_end_from_duration() {
        let mut task = sample();
        assert_eq!(task.end_from_duration(), None);
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        task.planned_start = Some(start);
        assert_eq!(task.end_from_duration(), Some(start + Duration::hours(8)));
        task.duration = 0.0;
        assert_eq!(task.end_from_duration(), None);
        assert_eq!(hours(-3.0), Duration::zero());
        assert_eq!(hours(0.25), Duration::minutes(15));
    }

    #[test]
    fn test_huge_duration_is_clamped() {
        let mut task = sample();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        task.planned_start = Some(start);
        task.duration = 1e12;
        assert_eq!(hours(1e12), hours(MAX_DURATION_HOURS));
        assert_eq!(
            task.end_from_duration(),
            start.checked_add_signed(hours(MAX_DURATION_HOURS))
        );

        task.planned_start = Some(DateTime::<Utc>::MAX_UTC - Duration::hours(2));
        assert_eq!(task.end_from_duration(), None);
    }

    #[test]
    fn test_patch_capture_and_apply() {
        let mut task = sample();
        let before = TaskPatch::capture(&task, &[TaskField::Title, TaskField::Duration]);
        assert_eq!(before.fields(), vec![TaskField::Title, TaskField::Duration]);

        let patch = TaskPatch {
            title: Some("Pour slab B".into()),
            duration: Some(12.0),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);
        assert_eq!(task.title, "Pour slab B");
        assert_eq!(task.duration, 12.0);

        before.apply_to(&mut task);
        assert_eq!(task, sample());
    }

    #[test]
    fn test_patch_retain() {
        let mut patch = TaskPatch::capture(&sample(), &TaskField::ALL);
        assert_eq!(patch.fields().len(), TaskField::ALL.len());
        patch.retain(|f| f == TaskField::Status);
        assert_eq!(patch.fields(), vec![TaskField::Status]);
    }

    #[test]
    fn test_field_names_parse() {
        assert_eq!("start".parse::<TaskField>(), Ok(TaskField::PlannedStart));
        assert_eq!("wbs".parse::<TaskField>(), Ok(TaskField::HierarchyCode));
        assert_eq!("title".parse::<TaskField>(), Ok(TaskField::Title));
        assert!("float".parse::<TaskField>().is_err());
    }
}
