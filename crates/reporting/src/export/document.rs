//! Paginated document encoding as a self-contained PDF 1.4 file using the
//! built-in Helvetica font: a title block on the first page, the
//! pretty-printed payload as body text, and a page footer.

use super::metadata;
use crate::report_builder::Report;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 50;
const LEADING: u32 = 12;
const BODY_FONT_SIZE: u32 = 9;
const MAX_LINE_CHARS: usize = 100;
/// Body lines that fit between the top margin and the footer.
const MAX_LINES_PER_PAGE: usize = 56;
/// Line slots the first-page title block occupies.
const TITLE_BLOCK_LINES: usize = 6;

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\t' => out.push_str("    "),
            c if c == ' ' || c.is_ascii_graphic() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn wrap(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(MAX_LINE_CHARS)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn text_op(out: &mut String, size: u32, y: u32, text: &str) {
    out.push_str(&format!(
        "BT /F1 {size} Tf {MARGIN} {y} Td ({}) Tj ET\n",
        escape_text(text)
    ));
}

/// Split body lines into pages; the first page leaves room for the title.
fn paginate(lines: Vec<String>, lines_per_page: usize) -> Vec<Vec<String>> {
    let per_page = lines_per_page.clamp(TITLE_BLOCK_LINES + 1, MAX_LINES_PER_PAGE);
    let first_page = per_page - TITLE_BLOCK_LINES;

    let mut pages = Vec::new();
    let mut rest = lines.as_slice();
    let take = first_page.min(rest.len());
    pages.push(rest[..take].to_vec());
    rest = &rest[take..];
    while !rest.is_empty() {
        let take = per_page.min(rest.len());
        pages.push(rest[..take].to_vec());
        rest = &rest[take..];
    }
    pages
}

fn page_content(report: &Report, index: usize, total: usize, lines: &[String]) -> String {
    let mut content = String::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    if index == 0 {
        text_op(&mut content, 16, y, &report.name);
        y -= 2 * LEADING;
        for (label, value) in metadata(report) {
            text_op(&mut content, 10, y, &format!("{label}: {value}"));
            y -= LEADING + 2;
        }
        y = PAGE_HEIGHT - MARGIN - (TITLE_BLOCK_LINES as u32) * LEADING;
    }

    for line in lines {
        text_op(&mut content, BODY_FONT_SIZE, y, line);
        y -= LEADING;
    }

    text_op(
        &mut content,
        8,
        MARGIN / 2,
        &format!("Page {} of {}", index + 1, total),
    );
    content
}

struct PdfWriter {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            offsets: Vec::new(),
        }
    }

    /// Append the next object; objects are numbered in write order from 1.
    fn object(&mut self, body: &str) {
        self.offsets.push(self.out.len());
        let number = self.offsets.len();
        self.out
            .extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    fn stream(&mut self, content: &str) {
        self.object(&format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.out.len();
        let count = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {count}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {count} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        ));
        self.out.extend_from_slice(xref.as_bytes());
        self.out
    }
}

pub(super) fn render(report: &Report, lines_per_page: usize) -> Vec<u8> {
    let dump = serde_json::to_string_pretty(&report.data).unwrap_or_else(|_| "null".into());
    let lines: Vec<String> = dump.lines().flat_map(wrap).collect();
    let pages = paginate(lines, lines_per_page);
    let total = pages.len();

    // 1 catalog, 2 page tree, 3 font, then a (page, contents) pair per page.
    let kids: Vec<String> = (0..total).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();

    let mut pdf = PdfWriter::new();
    pdf.object("<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(&format!(
        "<< /Type /Pages /Kids [{}] /Count {total} >>",
        kids.join(" ")
    ));
    pdf.object("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>");
    for (index, lines) in pages.iter().enumerate() {
        let contents = 5 + 2 * index;
        pdf.object(&format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {contents} 0 R >>"
        ));
        pdf.stream(&page_content(report, index, total, lines));
    }
    pdf.finish()
}
