//! Display-name length limits

/// Longest name carried on the wire (heartbeats and name commands)
pub const WIRE_NAME_MAX: usize = 16;

/// Longest name a node keeps locally
pub const LOCAL_NAME_MAX: usize = 31;

/// Truncate to at most `max` bytes without splitting a UTF-8 character
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
