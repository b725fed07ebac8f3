//! Spreadsheet encoding as a single-sheet SpreadsheetML 2003 workbook:
//! metadata rows, a blank row, the header row, then data rows.

use super::{cell_text, metadata, table};
use crate::report_builder::Report;
use serde_json::Value;

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn string_cell(text: &str) -> String {
    format!(
        "<Cell><Data ss:Type=\"String\">{}</Data></Cell>",
        escape_xml(text)
    )
}

fn value_cell(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("<Cell><Data ss:Type=\"Number\">{n}</Data></Cell>"),
        Value::Bool(b) => format!(
            "<Cell><Data ss:Type=\"Boolean\">{}</Data></Cell>",
            u8::from(*b)
        ),
        other => string_cell(&cell_text(other)),
    }
}

fn row(cells: impl IntoIterator<Item = String>) -> String {
    let mut out = String::from("   <Row>");
    for cell in cells {
        out.push_str(&cell);
    }
    out.push_str("</Row>\n");
    out
}

pub(super) fn render(report: &Report) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <?mso-application progid=\"Excel.Sheet\"?>\n\
         <Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" \
         xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n \
         <Worksheet ss:Name=\"Report\">\n  <Table>\n",
    );

    for (label, value) in metadata(report) {
        out.push_str(&row([string_cell(label), string_cell(&value)]));
    }
    out.push_str("   <Row/>\n");

    let table = table(&report.data);
    if !table.headers.is_empty() {
        out.push_str(&row(table.headers.iter().map(|h| string_cell(h))));
        for data in &table.rows {
            out.push_str(&row(data.iter().map(value_cell)));
        }
    }

    out.push_str("  </Table>\n </Worksheet>\n</Workbook>\n");
    out
}
