//! Terminal rendering helpers shared by help output and error reporting.

use colored::Colorize;
use serde_json::Value;
use std::io::Write;

/// Collapse newlines/extra whitespace and bound length for listing columns.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Width of the widest entry, for aligning a two-column listing.
pub fn column_width<'a>(entries: impl Iterator<Item = &'a str>) -> usize {
    entries.map(|e| e.chars().count()).max().unwrap_or(0)
}

/// Human form of a default value: strings unquoted, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print `message` in the error style. Write failures on the error stream
/// have nowhere left to go and are ignored.
pub fn report_error(err: &mut dyn Write, message: &str) {
    let _ = writeln!(err, "{}", message.red());
}
