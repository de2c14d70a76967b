//! Text rendering of a breakdown tree. Performs no attribution; it only
//! formats what the engine produced.

use std::fmt::Write;

use crate::{
    constants::units::{GB, MB},
    volume::VolumeUsage,
    BreakdownResult, NodeStatus,
};

const INDENT: &str = "  ";

/// Decimal GB with one decimal place at or above 1 GB, whole MB below.
/// Sizes that would round to 1000 MB are shown as GB.
pub fn format_size(bytes: f64) -> String {
    if bytes >= GB || (bytes / MB).round() >= 1000.0 {
        format!("{:.1} GB", bytes / GB)
    } else {
        format!("{:.0} MB", bytes / MB)
    }
}

/// Decimal GB with one decimal place, used for summary lines.
pub fn format_gb(bytes: f64) -> String {
    format!("{:.1} GB", bytes / GB)
}

/// `LABEL: T GB | Used: U GB (P%) | Free: F GB`
pub fn render_volume(label: &str, v: &VolumeUsage) -> String {
    format!(
        "{label}: {} | Used: {} ({:.1}%) | Free: {}",
        format_gb(v.total_bytes as f64),
        format_gb(v.used_bytes as f64),
        v.used_percent,
        format_gb(v.available_bytes as f64)
    )
}

/// Indented report: per level the ranked entries, the `(other)` bucket when
/// present, and the level's `Total`.
pub fn render_text(result: &BreakdownResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", result.path.display());
    match result.status {
        NodeStatus::Estimated => render_level(result, 1, &mut out),
        NodeStatus::Unestimatable | NodeStatus::Absent { .. } => {
            let _ = writeln!(out, "{INDENT}Unable to estimate");
        }
    }
    out
}

fn render_level(node: &BreakdownResult, indent: usize, out: &mut String) {
    let pad = INDENT.repeat(indent);
    for e in &node.entries {
        let _ = writeln!(
            out,
            "{pad}{}: {}",
            e.entry.path.display(),
            format_size(e.entry.scaled_bytes)
        );
        if let Some(child) = e.children.as_deref() {
            match child.status {
                NodeStatus::Estimated => render_level(child, indent + 1, out),
                NodeStatus::Unestimatable => {
                    let _ = writeln!(out, "{pad}{INDENT}Unable to estimate");
                }
                // failed branches are omitted
                NodeStatus::Absent { .. } => {}
            }
        }
    }
    if let Some(other) = node.other {
        let _ = writeln!(out, "{pad}(other): {}", format_gb(other));
    }
    let _ = writeln!(out, "{pad}Total: {}", format_gb(node.total));
}
