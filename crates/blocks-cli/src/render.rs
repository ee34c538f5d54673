//! Terminal rendering for trees, history and integrity reports.

use std::fmt::Write as _;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use blocks_model::{HistoryEntry, IssueSeverity, ValidationReport};
use blocks_state::TreeNode;

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

/// One row per component, indented by tree level.
pub fn tree_table(roots: &[TreeNode]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Component"),
        header_cell("Type"),
        header_cell("Depth"),
        header_cell("Index"),
        header_cell("Children"),
        header_cell("Flags"),
    ]);
    apply_table_style(&mut table);
    for column in 2..=4 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for root in roots {
        root.walk(&mut |node, level| {
            let record = &node.record;
            let flags = flags(node);
            table.add_row(vec![
                Cell::new(format!("{}{}", "  ".repeat(level), record.id)),
                Cell::new(format!("{}/{}", record.component_type, record.component)),
                Cell::new(record.metadata.depth),
                Cell::new(record.metadata.index),
                Cell::new(record.children.len()),
                if flags.is_empty() {
                    dim_cell("-")
                } else {
                    Cell::new(flags).fg(Color::Yellow)
                },
            ]);
        });
    }
    table
}

/// Plain indented outline of the forest.
pub fn outline(roots: &[TreeNode]) -> String {
    let mut out = String::new();
    for root in roots {
        root.walk(&mut |node, level| {
            let record = &node.record;
            let _ = write!(
                out,
                "{}{} [{}/{}]",
                "  ".repeat(level),
                record.id,
                record.component_type,
                record.component
            );
            let flags = flags(node);
            if !flags.is_empty() {
                let _ = write!(out, " ({flags})");
            }
            out.push('\n');
        });
    }
    out
}

fn flags(node: &TreeNode) -> String {
    let record = &node.record;
    let mut flags = Vec::new();
    if !record.is_visible {
        flags.push("hidden".to_string());
    }
    if record.is_selected {
        flags.push("selected".to_string());
    }
    if record.has_error {
        flags.push(match &record.error_message {
            Some(message) => format!("error: {message}"),
            None => "error".to_string(),
        });
    }
    flags.join(", ")
}

/// History entries with the applied ones marked. Entries after the cursor
/// form the redo tail.
pub fn history_table<'a>(
    entries: impl IntoIterator<Item = &'a HistoryEntry>,
    history_index: i64,
) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("State"),
        header_cell("Kind"),
        header_cell("Label"),
        header_cell("Recorded"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    for (position, entry) in (0_i64..).zip(entries) {
        let state = if position == history_index {
            Cell::new("current")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold)
        } else if position < history_index {
            Cell::new("applied")
        } else {
            dim_cell("undone")
        };
        table.add_row(vec![
            Cell::new(position),
            state,
            Cell::new(entry.kind()),
            Cell::new(entry.label()),
            dim_cell(entry.timestamp().format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}

/// Issue listing followed by a count line.
pub fn integrity_summary(report: &ValidationReport) -> String {
    if report.issues.is_empty() {
        return "ok: no integrity issues\n".to_string();
    }
    let mut out = String::new();
    for issue in &report.issues {
        let severity = match issue.severity {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
        };
        let _ = writeln!(
            out,
            "{severity:<7} [{}] {}: {}",
            issue.code.as_str(),
            issue.component_id.as_deref().unwrap_or("-"),
            issue.message
        );
    }
    let _ = writeln!(
        out,
        "{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
    out
}
