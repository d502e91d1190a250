//! Field value normalization
//!
//! Turns one raw field substring into `None` (SQL NULL) or plain text.
//! Typing happens later in [`crate::schema`].

/// Normalize one raw field substring
///
/// - unquoted `NULL` and empty fields become `None`
/// - one matching pair of outer single or double quotes is stripped
/// - `\'`, `\"` and `\\` are unescaped, in that order
pub fn normalize_value(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "NULL" {
        return None;
    }

    Some(unescape(strip_quotes(raw)))
}

fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn unescape(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }

    value
        .replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_literal_and_empty_field() {
        assert_eq!(normalize_value("NULL"), None);
        assert_eq!(normalize_value(""), None);
    }

    #[test]
    fn test_quoted_null_is_text() {
        assert_eq!(normalize_value("'NULL'"), Some("NULL".to_string()));
    }

    #[test]
    fn test_lowercase_null_is_text() {
        assert_eq!(normalize_value("null"), Some("null".to_string()));
    }

    #[test]
    fn test_strips_one_pair_of_quotes() {
        assert_eq!(normalize_value("'abc'"), Some("abc".to_string()));
        assert_eq!(normalize_value("\"abc\""), Some("abc".to_string()));
        assert_eq!(normalize_value("''abc''"), Some("'abc'".to_string()));
        assert_eq!(normalize_value("''"), Some(String::new()));
    }

    #[test]
    fn test_mismatched_or_lone_quotes_are_kept() {
        assert_eq!(normalize_value("'abc\""), Some("'abc\"".to_string()));
        assert_eq!(normalize_value("'"), Some("'".to_string()));
        assert_eq!(normalize_value("'abc"), Some("'abc".to_string()));
    }

    #[test]
    fn test_unescapes_quotes_and_backslashes() {
        assert_eq!(normalize_value(r"'it\'s'"), Some("it's".to_string()));
        assert_eq!(
            normalize_value(r#"'{\"a\":1}'"#),
            Some(r#"{"a":1}"#.to_string())
        );
        assert_eq!(normalize_value(r"'C:\\temp'"), Some(r"C:\temp".to_string()));
    }

    #[test]
    fn test_other_escapes_pass_through() {
        assert_eq!(normalize_value(r"'line\nbreak'"), Some(r"line\nbreak".to_string()));
    }

    #[test]
    fn test_numbers_and_dates_stay_text() {
        assert_eq!(normalize_value("42"), Some("42".to_string()));
        assert_eq!(
            normalize_value("'2021-01-01 00:00:00'"),
            Some("2021-01-01 00:00:00".to_string())
        );
    }
}
