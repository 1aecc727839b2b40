//! MySQL string literal escaping.

/// Escape `text` for use inside a quoted MySQL string literal.
///
/// Matches `mysql_escape_string` for UTF-8 connections: NUL, LF, CR, backslash,
/// both quote characters and Ctrl-Z are backslash-escaped.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    escape_into(&mut out, text);
    out
}

/// Append the escaped form of `text` to `out`.
pub fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() {
        assert_eq!(escape_string("hello world"), "hello world");
    }

    #[test]
    fn test_quotes_and_backslash() {
        assert_eq!(escape_string(r#"it's "x" \ y"#), r#"it\'s \"x\" \\ y"#);
    }

    #[test]
    fn test_control_chars() {
        assert_eq!(escape_string("a\0b\nc\rd\x1a"), "a\\0b\\nc\\rd\\Z");
    }
}
