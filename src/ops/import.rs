use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::dependency::{self, Dependency, Relation};
use crate::model::task::{MAX_DURATION_HOURS, Priority, Task, TaskId, TaskKind, TaskStatus};
use crate::model::wbs::{CodeError, HierarchyCode};

/// Error type for import operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImportError {
    #[error("no rows found in import batch")]
    NoRows,
    #[error("row {row}: {source}")]
    InvalidCode { row: usize, source: CodeError },
    #[error("hierarchy code {0} appears more than once in the batch")]
    DuplicateCode(String),
}

/// A structured batch as produced by an external file parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "tasks")]
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    #[serde(default, alias = "wbs_code", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationValue>,
    #[serde(default, alias = "planned_start", skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, alias = "planned_end", skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, alias = "task_type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
}

/// Hours as a number, or text such as `8`, `1,200` or `PT7H30M`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Hours(f64),
    Text(String),
}

/// A predecessor named by hierarchy code or by title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
    Plain(String),
    Detailed {
        #[serde(rename = "ref")]
        reference: String,
        #[serde(default)]
        relation: Option<String>,
        #[serde(default)]
        lag: Option<f64>,
    },
}

impl DependencyRef {
    pub fn reference(&self) -> &str {
        match self {
            DependencyRef::Plain(r) => r,
            DependencyRef::Detailed { reference, .. } => reference,
        }
    }
}

/// Something the import recovered from rather than rejected. Rows are
/// numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportWarning {
    UnresolvedDependency { row: usize, reference: String },
    UnparseableDate { row: usize, field: &'static str, value: String },
    UnparseableDuration { row: usize, value: String },
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportWarning::UnresolvedDependency { row, reference } => {
                write!(f, "row {}: dependency {:?} matches no code or title", row, reference)
            }
            ImportWarning::UnparseableDate { row, field, value } => {
                write!(f, "row {}: cannot parse {} date {:?}", row, field, value)
            }
            ImportWarning::UnparseableDuration { row, value } => {
                write!(f, "row {}: cannot parse duration {:?}", row, value)
            }
        }
    }
}

/// Result of resolving a batch
#[derive(Debug)]
pub struct ImportResult {
    pub title: Option<String>,
    /// Tasks in row order with ids assigned from `first_id`
    pub tasks: Vec<Task>,
    pub warnings: Vec<ImportWarning>,
}

/// Turn a batch into a complete task set. Ids are assigned in row order
/// starting at `first_id`; rows without a code take the next free top-level
/// code.
pub fn resolve_batch(batch: &ImportBatch, first_id: i64) -> Result<ImportResult, ImportError> {
    if batch.rows.is_empty() {
        return Err(ImportError::NoRows);
    }

    let codes = assign_codes(&batch.rows)?;
    let ids: Vec<TaskId> = (0..batch.rows.len() as i64)
        .map(|i| TaskId(first_id + i))
        .collect();

    let mut by_code: HashMap<String, TaskId> = HashMap::new();
    let mut by_title: HashMap<&str, TaskId> = HashMap::new();
    for ((row, code), id) in batch.rows.iter().zip(&codes).zip(&ids) {
        by_code.insert(code.to_string(), *id);
        by_title.entry(row.title.trim()).or_insert(*id);
    }

    let mut warnings = Vec::new();
    let mut tasks = Vec::with_capacity(batch.rows.len());

    for (i, (row, code)) in batch.rows.iter().zip(codes).enumerate() {
        let row_no = i + 1;
        let mut task = Task::new(ids[i], code, row.title.trim());
        task.description = row.description.clone().unwrap_or_default();
        task.kind = row.kind.as_deref().map(TaskKind::parse_loose).unwrap_or_default();
        task.status = row
            .status
            .as_deref()
            .and_then(TaskStatus::parse_loose)
            .unwrap_or_default();
        task.priority = row
            .priority
            .as_deref()
            .and_then(Priority::parse_loose)
            .unwrap_or_default();

        task.duration = match &row.duration {
            None => 0.0,
            Some(DurationValue::Hours(h)) if in_duration_range(*h) => *h,
            Some(DurationValue::Hours(h)) => {
                warnings.push(ImportWarning::UnparseableDuration {
                    row: row_no,
                    value: h.to_string(),
                });
                0.0
            }
            Some(DurationValue::Text(text)) => parse_duration(text).unwrap_or_else(|| {
                warnings.push(ImportWarning::UnparseableDuration {
                    row: row_no,
                    value: text.clone(),
                });
                0.0
            }),
        };

        task.planned_start = date_field(row.start.as_deref(), row_no, "start", &mut warnings);
        task.planned_end = date_field(row.end.as_deref(), row_no, "end", &mut warnings);
        task.normalize_dates();

        for dep in &row.dependencies {
            let reference = dep.reference().trim();
            let target = by_code
                .get(reference)
                .or_else(|| by_title.get(reference))
                .copied()
                .filter(|target| *target != task.id);
            let Some(target) = target else {
                warnings.push(ImportWarning::UnresolvedDependency {
                    row: row_no,
                    reference: reference.to_string(),
                });
                continue;
            };
            let mut edge = Dependency::on(target);
            if let DependencyRef::Detailed { relation, lag, .. } = dep {
                edge.relation = relation
                    .as_deref()
                    .and_then(Relation::from_code)
                    .unwrap_or_default();
                edge.lag = lag.unwrap_or(0.0);
            }
            dependency::upsert_edge(&mut task.dependencies, edge);
        }

        tasks.push(task);
    }

    Ok(ImportResult {
        title: batch.title.clone(),
        tasks,
        warnings,
    })
}

fn assign_codes(rows: &[ImportRow]) -> Result<Vec<HierarchyCode>, ImportError> {
    let mut explicit: Vec<Option<HierarchyCode>> = Vec::with_capacity(rows.len());
    let mut used = BTreeSet::new();
    for (i, row) in rows.iter().enumerate() {
        let code = match row.code.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => {
                let code = HierarchyCode::parse(text)
                    .map_err(|source| ImportError::InvalidCode { row: i + 1, source })?;
                if !used.insert(code.clone()) {
                    return Err(ImportError::DuplicateCode(code.to_string()));
                }
                Some(code)
            }
        };
        explicit.push(code);
    }

    let mut next_top = used
        .iter()
        .filter_map(|c| c.segments().first().copied())
        .max()
        .unwrap_or(0);
    Ok(explicit
        .into_iter()
        .map(|code| {
            code.unwrap_or_else(|| {
                next_top += 1;
                HierarchyCode::top_level(next_top)
            })
        })
        .collect())
}

fn date_field(
    value: Option<&str>,
    row: usize,
    field: &'static str,
    warnings: &mut Vec<ImportWarning>,
) -> Option<DateTime<Utc>> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    let parsed = parse_date(value);
    if parsed.is_none() {
        warnings.push(ImportWarning::UnparseableDate {
            row,
            field,
            value: value.to_string(),
        });
    }
    parsed
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%b-%Y"];

/// Parse the date spellings seen in spreadsheet and scheduler exports.
/// Values without an offset are taken as UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.strip_suffix('Z').unwrap_or(value);
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

static PT_DURATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^PT(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?$").ok()
});

/// Hours from `PT#H#M#S` or a plain number (thousands separators allowed).
/// Negative, non-finite and longer than [`MAX_DURATION_HOURS`] are refused.
pub fn parse_duration(text: &str) -> Option<f64> {
    let text = text.trim();
    let hours = if text.starts_with("PT") {
        let caps = PT_DURATION.as_ref()?.captures(text)?;
        let part = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        part(1) + part(2) / 60.0 + part(3) / 3600.0
    } else {
        text.replace(',', "").parse().ok()?
    };
    in_duration_range(hours).then_some(hours)
}

fn in_duration_range(hours: f64) -> bool {
    hours.is_finite() && (0.0..=MAX_DURATION_HOURS).contains(&hours)
}
