use crate::walk::PageRecord;

pub const DEFAULT_MAX_CHARS: usize = 15_000;

const FIELD_SEPARATOR: &str = " | ";

/// One line per page, capped at `max_chars` characters. Nothing past the cap
/// is ever handed to the findings generator.
pub fn render(records: &[PageRecord], max_chars: usize) -> String {
    let full = records
        .iter()
        .map(render_line)
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&full, max_chars).to_owned()
}

fn render_line(record: &PageRecord) -> String {
    [
        format!("URL: {}", record.url),
        format!("Title: {}", record.title),
        format!("H1: {}", record.heading),
        format!("Description: {}", record.description),
    ]
    .join(FIELD_SEPARATOR)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
