//! CSV encoding: `#`-prefixed metadata lines, a header row taken from the
//! first record's keys, then one line per record.

use super::{cell_text, metadata, table};
use crate::report_builder::Report;

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Metadata lines must stay single lines behind their `#` prefix.
fn comment_text(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

pub(super) fn render(report: &Report) -> String {
    let mut out = String::new();
    for (label, value) in metadata(report) {
        out.push_str(&format!("# {label}: {}\n", comment_text(&value)));
    }

    let table = table(&report.data);
    if table.headers.is_empty() {
        return out;
    }
    let header: Vec<String> = table.headers.iter().map(|h| escape(h)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|v| escape(&cell_text(v))).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
