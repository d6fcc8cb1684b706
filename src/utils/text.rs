/// Find the largest valid UTF-8 boundary at or before the given byte index.
/// Returns the byte index that is safe to slice at.
#[inline]
fn safe_byte_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    s.char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0)
}

/// Truncate a string with a marker if it exceeds the maximum length (UTF-8 safe).
///
/// The max_len is in bytes, but truncation respects UTF-8 character
/// boundaries to avoid panics with multi-byte characters.
#[inline]
pub fn truncate_with_marker(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let boundary = safe_byte_boundary(s, max_len);
        format!("{}...[truncated]", &s[..boundary])
    }
}

/// First non-empty line of an error message, bounded to `max_len` bytes.
///
/// Failure reasons captured from stage errors can quote source excerpts;
/// stored reasons must stay readable in session views and event streams.
pub fn error_snippet(message: &str, max_len: usize) -> String {
    let line = message
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    truncate_with_marker(line, max_len)
}
