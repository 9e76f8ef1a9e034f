//! POSIX shell quoting for command strings sent over SSH.

/// Quote `s` as a single shell word.
///
/// Wraps the value in single quotes and rewrites embedded quotes as `'\''`,
/// so the remote shell sees the bytes unchanged.
#[must_use]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
