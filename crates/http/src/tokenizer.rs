//! Quoted-string aware splitting of delimited header values.
//!
//! Cookie and Forwarded header values embed quoted-strings whose content may
//! contain the delimiter character itself. The splitter here toggles quote
//! state on an unescaped `"` and lets `\` pass the following character through
//! untouched, so fragments are cut only at delimiters sitting outside quotes.

/// Splits `value` on `delimiter`, honoring quoted-strings and backslash escapes.
///
/// Fragments are borrowed slices of the input: escape sequences and quotes are
/// left in place for the caller to unwrap (see [`crate::cookie`]). An
/// unterminated quote does not fail; the trailing fragment is emitted as-is.
pub fn split(value: &str, delimiter: char) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fragments.push(&value[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    fragments.push(&value[start..]);
    fragments
}
