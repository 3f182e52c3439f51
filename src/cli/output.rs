use chrono::{DateTime, Utc};

use crate::model::risk::Risk;
use crate::ops::check::CheckResult;
use crate::ops::import::ImportWarning;
use crate::util::unicode::{fit_to_width, pad_left};
use crate::views::{BoardLane, GridRow, Network, Timeline};

// ---------------------------------------------------------------------------
// Field formatting
// ---------------------------------------------------------------------------

pub fn format_instant(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_hours(h: f64) -> String {
    if h.fract() == 0.0 {
        format!("{}h", h)
    } else {
        format!("{:.1}h", h)
    }
}

fn format_float(f: Option<f64>) -> String {
    f.map(format_hours).unwrap_or_else(|| "-".to_string())
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One line per grid row: id, outline marker and code, title, status,
/// dates, duration, dependency labels. Critical rows end in `*`.
pub fn format_grid(rows: &[GridRow], title_width: usize) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let marker = match (row.has_children, row.collapsed) {
                (true, true) => "+ ",
                (true, false) => "- ",
                _ => "  ",
            };
            let outline = format!("{}{}{}", "  ".repeat(row.indent), marker, row.code);
            let deps = if row.dependencies.is_empty() {
                String::new()
            } else {
                format!("  <- {}", row.dependencies.join(", "))
            };
            format!(
                "{}  {}  {}  {}  {}  {}  {}{}{}",
                pad_left(&row.id.to_string(), 4),
                fit_to_width(&outline, 14),
                fit_to_width(&row.title, title_width),
                fit_to_width(row.status.as_str(), 11),
                format_instant(row.planned_start),
                format_instant(row.planned_end),
                pad_left(&format_hours(row.duration), 6),
                deps,
                if row.critical { " *" } else { "" },
            )
        })
        .collect()
}

pub fn format_board(lanes: &[BoardLane], title_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, lane) in lanes.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.push(format!("== {} ({}) ==", lane.label, lane.cards.len()));
        for card in &lane.cards {
            lines.push(format!(
                "  {}  {}  {}  {}{}",
                pad_left(&card.id.to_string(), 4),
                fit_to_width(&card.code, 8),
                fit_to_width(&card.title, title_width),
                card.priority.as_str(),
                if card.critical { " *" } else { "" },
            ));
        }
    }
    lines
}

pub fn format_timeline(timeline: &Timeline, title_width: usize) -> Vec<String> {
    let mut lines: Vec<String> = timeline
        .bars
        .iter()
        .map(|bar| {
            format!(
                "{}  {}  {}  {} .. {}  {:>3}%  {:?}{}",
                pad_left(&bar.id.to_string(), 4),
                fit_to_width(&bar.code, 8),
                fit_to_width(&bar.title, title_width),
                format_instant(Some(bar.start)),
                format_instant(Some(bar.end)),
                bar.progress,
                bar.shape,
                if bar.critical { " *" } else { "" },
            )
        })
        .collect();
    if !timeline.links.is_empty() {
        lines.push(String::new());
        lines.push("links:".to_string());
        for link in &timeline.links {
            lines.push(format!("  {} ({})", link.key, link.relation.code()));
        }
    }
    lines
}

pub fn format_network(network: &Network) -> Vec<String> {
    let mut lines = vec!["nodes:".to_string()];
    for node in &network.nodes {
        lines.push(format!(
            "  {}  {}  ES {}  EF {}  LS {}  LF {}  TF {}  FF {}{}",
            pad_left(&node.id.to_string(), 4),
            fit_to_width(&node.code, 8),
            format_instant(node.early_start),
            format_instant(node.early_finish),
            format_instant(node.late_start),
            format_instant(node.late_finish),
            format_float(node.total_float),
            format_float(node.free_float),
            if node.is_critical_path { "  critical" } else { "" },
        ));
    }
    lines.push("edges:".to_string());
    for edge in &network.edges {
        let lag = if edge.lag == 0.0 {
            String::new()
        } else {
            format!(" {:+.1}h", edge.lag)
        };
        lines.push(format!(
            "  {} -> {} {}{}{}",
            edge.from,
            edge.to,
            edge.relation.code(),
            lag,
            if edge.dangling { "  (dangling)" } else { "" },
        ));
    }
    lines
}

pub fn format_check(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.errors.is_empty() {
        lines.push("Errors:".to_string());
        lines.extend(result.errors.iter().map(|e| format!("  {}", e)));
    }
    if !result.warnings.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Warnings:".to_string());
        lines.extend(result.warnings.iter().map(|w| format!("  {}", w)));
    }
    if lines.is_empty() {
        lines.push("ok".to_string());
    }
    lines
}

pub fn format_import_warnings(warnings: &[ImportWarning]) -> Vec<String> {
    warnings.iter().map(|w| format!("warning: {}", w)).collect()
}

pub fn format_risks(risks: &[Risk], title_width: usize) -> Vec<String> {
    if risks.is_empty() {
        return vec!["no risks".to_string()];
    }
    risks
        .iter()
        .map(|r| {
            let task = r.task_id.map(|t| format!("  task {}", t)).unwrap_or_default();
            format!(
                "{}  {}  score {:.1}  {}{}",
                pad_left(&r.id.to_string(), 4),
                fit_to_width(&r.title, title_width),
                r.score(),
                r.status,
                task,
            )
        })
        .collect()
}
