//! Terminal output helpers.

use armature_core::{BuildMetrics, WidgetNode};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use std::fmt::Write as _;

/// Render a widget tree as an indented text outline.
pub fn render_tree(nodes: &[WidgetNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, 0, &mut out);
    }
    out
}

fn render_node(node: &WidgetNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let kind = format!("[{}]", node.kind).dimmed();
    let name = if node.required {
        format!("{}*", node.name).bold()
    } else {
        node.name.normal()
    };

    let _ = write!(out, "{indent}{name} {kind}");
    if let Some(count) = node.option_count {
        let _ = write!(out, " {}", format!("({count} options)").dimmed());
    }
    let _ = writeln!(out);

    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

/// Render per-phase build timings as a table.
pub fn render_metrics_table(metrics: &BuildMetrics) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Phase", "Duration (ms)"]);

    for phase in &metrics.phases {
        table.add_row(vec![
            Cell::new(&phase.phase),
            Cell::new(phase.duration_ms),
        ]);
    }
    table.add_row(vec![Cell::new("total"), Cell::new(metrics.total_ms)]);
    table
}
