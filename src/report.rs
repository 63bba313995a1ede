use serde::{Deserialize, Serialize};

pub const CSV_HEADER: [&str; 5] = [
    "URL",
    "Error_Type",
    "Current_Value",
    "Recommended_Fix",
    "Priority",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRow {
    pub url: String,
    pub error_type: String,
    pub current_value: String,
    pub recommended_fix: String,
    pub priority: String,
}

impl RemediationRow {
    fn cells(&self) -> [&str; 5] {
        [
            &self.url,
            &self.error_type,
            &self.current_value,
            &self.recommended_fix,
            &self.priority,
        ]
    }
}

/// Squeezes free-form model output into rows of the fixed 5-column grid.
/// Lines that cannot be read as a row are dropped.
pub fn parse_rows(text: &str) -> Vec<RemediationRow> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<RemediationRow> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("```") {
        return None;
    }

    let line = line.trim_start_matches('|').trim_end_matches('|');
    let mut cells: Vec<String> = line.split('|').map(clean_cell).collect();
    if cells.len() < CSV_HEADER.len() {
        return None;
    }
    if is_separator_row(&cells) || is_header_row(&cells) {
        return None;
    }

    // Stray separators inside the fix text end up as extra middle cells.
    if cells.len() > CSV_HEADER.len() {
        let priority = cells.pop().unwrap_or_default();
        let fix = cells.split_off(3).join(" | ");
        cells.push(fix);
        cells.push(priority);
    }

    let mut cells = cells.into_iter();
    let row = RemediationRow {
        url: cells.next().unwrap_or_default(),
        error_type: cells.next().unwrap_or_default(),
        current_value: cells.next().unwrap_or_default(),
        recommended_fix: cells.next().unwrap_or_default(),
        priority: cells.next().unwrap_or_default(),
    };
    if row.url.is_empty() {
        return None;
    }
    Some(row)
}

fn clean_cell(cell: &str) -> String {
    cell.trim()
        .trim_matches('`')
        .trim_matches('"')
        .trim_matches('*')
        .trim()
        .to_owned()
}

fn is_separator_row(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|cell| !cell.is_empty() && cell.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn is_header_row(cells: &[String]) -> bool {
    cells.first().is_some_and(|c| c.eq_ignore_ascii_case("url"))
        && cells
            .iter()
            .any(|c| c.eq_ignore_ascii_case("priority"))
}

/// RFC 4180 CSV with a header line.
pub fn to_csv(rows: &[RemediationRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, &CSV_HEADER);
    for row in rows {
        push_record(&mut out, &row.cells());
    }
    out
}

fn push_record(out: &mut String, cells: &[&str]) {
    let line = cells
        .iter()
        .map(|cell| quote_field(cell))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
