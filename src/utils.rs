//! Common utility functions used across the LSP implementation.

use tower_lsp::lsp_types::{Position, Range};

/// Returns the text covered by a single-line `range`.
///
/// Columns are UTF-16 code units, as LSP positions are by default.
/// Returns `None` if the range spans lines, is inverted, or falls outside
/// the document.
///
/// # Arguments
///
/// * `content` - Full document text
/// * `range` - Range on a single line
pub fn text_in_range(content: &str, range: Range) -> Option<&str> {
    if range.start.line != range.end.line || range.start.character > range.end.character {
        return None;
    }

    let line = content.split('\n').nth(range.start.line as usize)?;
    let line = line.strip_suffix('\r').unwrap_or(line);

    let start = byte_offset(line, range.start)?;
    let end = byte_offset(line, range.end)?;
    line.get(start..end)
}

/// Convert a UTF-16 column into a byte offset within `line`.
fn byte_offset(line: &str, position: Position) -> Option<usize> {
    let target = position.character as usize;
    let mut units = 0;
    for (idx, ch) in line.char_indices() {
        if units == target {
            return Some(idx);
        }
        units += ch.len_utf16();
        if units > target {
            // Column falls inside a surrogate pair
            return None;
        }
    }
    (units == target).then_some(line.len())
}

/// Matches a package name against a user pattern.
///
/// A pattern without `*` must equal the name. With a single `*`, the name
/// must start with the part before it and end with the part after it.
/// With several, only the leading part is checked.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return name == pattern;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 2 {
        name.len() >= parts[0].len() + parts[1].len()
            && name.starts_with(parts[0])
            && name.ends_with(parts[1])
    } else {
        name.starts_with(parts[0])
    }
}
