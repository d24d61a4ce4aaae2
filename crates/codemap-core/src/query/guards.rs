//! Shared guardrails for query payload bounds.

pub const MAX_QUERY_LENGTH: usize = 512;
pub const MAX_OUTLINE_LINES: usize = 2000;

/// Trim and cap a query string without splitting a character.
pub fn truncate_query(query: &str) -> String {
    let stripped = query.trim();
    if stripped.len() <= MAX_QUERY_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_QUERY_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}
