//! Row tuple tokenizer for `INSERT INTO <table> VALUES (...),(...);` lines
//!
//! Works in two passes over one statement line:
//!
//! 1. [`split_groups`] finds every top-level `(...)` group of the value list.
//! 2. [`split_fields`] cuts one group into its comma-separated fields, keeping
//!    commas that sit inside single-quoted strings or `{...}` literals.
//!
//! Both passes are plain character scans. Fields are returned as trimmed
//! slices of the original line; nothing is unquoted here (see
//! [`crate::normalize`]).

use regex::Regex;
use thiserror::Error;

/// Field substrings of one `(...)` group, in column order
pub type RawTuple<'a> = Vec<&'a str>;

/// Structural problems that make a whole line unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("value group opened at byte {offset} is never closed")]
    UnterminatedGroup { offset: usize },
}

/// Recognizes insert statements for one table and extracts their tuples
#[derive(Debug, Clone)]
pub struct StatementTokenizer {
    table: String,
    prefix: Regex,
}

impl StatementTokenizer {
    /// Build a tokenizer for `table`
    ///
    /// The table name is matched case-insensitively, bare or wrapped in
    /// backticks or double quotes. `INSERT IGNORE` and an explicit column
    /// list (`--complete-insert` dumps) are accepted as well.
    pub fn new(table: &str) -> Result<Self, regex::Error> {
        let t = regex::escape(table);
        let pattern = format!(
            r#"(?i)^\s*INSERT\s+(?:IGNORE\s+)?INTO\s+(?:`{t}`|"{t}"|{t}\b)\s*(?:\([^)]*\)\s*)?VALUES\b\s*"#
        );

        Ok(Self {
            table: table.to_string(),
            prefix: Regex::new(&pattern)?,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Tokenize one line
    ///
    /// Returns `Ok(None)` when the line is not an insert into the configured
    /// table, and `Ok(Some(vec![]))` for an insert without any value group.
    pub fn tokenize<'a>(&self, line: &'a str) -> Result<Option<Vec<RawTuple<'a>>>, TokenizeError> {
        let Some(found) = self.prefix.find(line) else {
            return Ok(None);
        };

        let values = &line[found.end()..];
        let tuples = split_groups(values)?
            .into_iter()
            .map(split_fields)
            .collect();

        Ok(Some(tuples))
    }
}

/// Return the inner text of each top-level `(...)` group
///
/// Parentheses inside single-quoted strings or unquoted `{...}` literals are
/// ignored; inside quotes a backslash escapes the next character. Anything
/// between groups (commas, whitespace, the trailing `;`) is skipped.
pub fn split_groups(values: &str) -> Result<Vec<&str>, TokenizeError> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut braces = 0usize;
    let mut start = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in values.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        if quoted {
            match c {
                '\\' => escaped = true,
                '\'' => quoted = false,
                _ => {},
            }
            continue;
        }

        match c {
            '\'' if depth > 0 => quoted = true,
            '{' if depth > 0 => braces += 1,
            '}' if depth > 0 => braces = braces.saturating_sub(1),
            _ if braces > 0 => {},
            '(' => {
                if depth == 0 {
                    start = i + 1;
                }
                depth += 1;
            },
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    groups.push(&values[start..i]);
                }
            },
            _ => {},
        }
    }

    if depth > 0 {
        return Err(TokenizeError::UnterminatedGroup {
            offset: start.saturating_sub(1),
        });
    }

    Ok(groups)
}

/// Split the inner text of one group into trimmed field substrings
///
/// A `,` separates fields only outside quotes and at brace depth zero. A
/// quote preceded by a backslash never toggles the quote state, which also
/// means `\\'` (escaped backslash, then closing quote) keeps the field open.
pub fn split_fields(group: &str) -> RawTuple<'_> {
    let mut fields = Vec::new();
    let mut scanner = FieldScanner::default();
    let mut start = 0usize;

    for (i, c) in group.char_indices() {
        if scanner.step(c) {
            fields.push(group[start..i].trim());
            start = i + c.len_utf8();
        }
    }
    fields.push(group[start..].trim());

    fields
}

/// Scanner state while walking one group
///
/// Normal, in-quote, and in-brace(n) are tracked as a quote flag plus a
/// brace depth so that a quoted string inside a brace literal keeps the
/// depth it was opened at. Braces inside quotes are deliberately not
/// counted, so a stray `}` in a string cannot close a literal early.
#[derive(Debug, Default)]
struct FieldScanner {
    in_quote: bool,
    brace_depth: usize,
    prev: Option<char>,
}

impl FieldScanner {
    /// Advance over `c`; true when `c` ends the current field
    fn step(&mut self, c: char) -> bool {
        let separator = match c {
            '\'' if self.prev != Some('\\') => {
                self.in_quote = !self.in_quote;
                false
            },
            '{' if !self.in_quote => {
                self.brace_depth += 1;
                false
            },
            '}' if !self.in_quote => {
                self.brace_depth = self.brace_depth.saturating_sub(1);
                false
            },
            ',' => !self.in_quote && self.brace_depth == 0,
            _ => false,
        };

        self.prev = Some(c);
        separator
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tokenizer() -> StatementTokenizer {
        StatementTokenizer::new("ACTIVITYLOG").unwrap()
    }

    #[test]
    fn test_single_tuple_from_dump_line() {
        let line = "INSERT INTO `ACTIVITYLOG` VALUES (1,2,'{\"a\":1}','2021-01-01 00:00:00','2021-01-01 00:00:00','NULL');";
        let tuples = tokenizer().tokenize(line).unwrap().unwrap();

        assert_eq!(tuples.len(), 1);
        assert_eq!(
            tuples[0],
            vec![
                "1",
                "2",
                "'{\"a\":1}'",
                "'2021-01-01 00:00:00'",
                "'2021-01-01 00:00:00'",
                "'NULL'"
            ]
        );
    }

    #[test]
    fn test_multiple_tuples_keep_order() {
        let line = "INSERT INTO `ACTIVITYLOG` VALUES (1,'a'),(2,'b'),(3,'c');";
        let tuples = tokenizer().tokenize(line).unwrap().unwrap();

        let ids: Vec<&str> = tuples.iter().map(|t| t[0]).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(tuples[2][1], "'c'");
    }

    #[test]
    fn test_prefix_is_case_and_whitespace_tolerant() {
        let line = "   insert   into activitylog\tvalues(7,'x')  ;";
        let tuples = tokenizer().tokenize(line).unwrap().unwrap();
        assert_eq!(tuples, vec![vec!["7", "'x'"]]);
    }

    #[test]
    fn test_other_tables_and_statements_are_not_applicable() {
        let t = tokenizer();
        assert_eq!(t.tokenize("INSERT INTO `USERS` VALUES (1);").unwrap(), None);
        assert_eq!(t.tokenize("INSERT INTO `ACTIVITYLOGS` VALUES (1);").unwrap(), None);
        assert_eq!(t.tokenize("-- MySQL dump 10.13").unwrap(), None);
        assert_eq!(t.tokenize("LOCK TABLES `ACTIVITYLOG` WRITE;").unwrap(), None);
        assert_eq!(t.tokenize("").unwrap(), None);
    }

    #[test]
    fn test_insert_ignore_and_column_list() {
        let line = "INSERT IGNORE INTO `ACTIVITYLOG` (`logId`,`adminId`) VALUES (1,2);";
        let tuples = tokenizer().tokenize(line).unwrap().unwrap();
        assert_eq!(tuples, vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_statement_without_groups_yields_no_tuples() {
        let tuples = tokenizer().tokenize("INSERT INTO `ACTIVITYLOG` VALUES ;").unwrap();
        assert_eq!(tuples, Some(vec![]));
    }

    #[test]
    fn test_comma_inside_quotes_does_not_split() {
        assert_eq!(split_fields("1,'a,b',2"), vec!["1", "'a,b'", "2"]);
    }

    #[test]
    fn test_comma_inside_braces_does_not_split() {
        assert_eq!(
            split_fields(r#"1,{"a":1,"b":{"c":2,"d":3}},2"#),
            vec!["1", r#"{"a":1,"b":{"c":2,"d":3}}"#, "2"]
        );
    }

    #[test]
    fn test_brace_inside_quotes_is_ignored() {
        assert_eq!(split_fields("'smile :}',2,3"), vec!["'smile :}'", "2", "3"]);
    }

    #[test]
    fn test_escaped_quote_does_not_toggle() {
        assert_eq!(
            split_fields(r"'it\'s, fine',2"),
            vec![r"'it\'s, fine'", "2"]
        );
    }

    #[test]
    fn test_escaped_backslash_before_quote_keeps_field_open() {
        // `\\'` is read as an escaped quote, so the comma after it stays inside the field.
        assert_eq!(split_fields(r"'C:\\',2"), vec![r"'C:\\',2"]);
    }

    #[test]
    fn test_fields_are_trimmed() {
        assert_eq!(split_fields(" 1 ,  'a' ,NULL "), vec!["1", "'a'", "NULL"]);
    }

    #[test]
    fn test_parentheses_inside_strings_do_not_end_group() {
        let groups = split_groups("(1,'a) (b'),(2,'c');").unwrap();
        assert_eq!(groups, vec!["1,'a) (b'", "2,'c'"]);
    }

    #[test]
    fn test_last_group_before_semicolon_is_kept() {
        let groups = split_groups("(1),(2);").unwrap();
        assert_eq!(groups, vec!["1", "2"]);
    }

    #[test]
    fn test_parenthesis_inside_brace_literal_does_not_end_group() {
        let groups = split_groups(r#"(1,{"a":")"},2),(3)"#).unwrap();
        assert_eq!(groups, vec![r#"1,{"a":")"},2"#, "3"]);
        assert_eq!(split_fields(groups[0]), vec!["1", r#"{"a":")"}"#, "2"]);

        let line = r#"INSERT INTO `ACTIVITYLOG` VALUES (1,{"x":"(("},2);"#;
        let tuples = tokenizer().tokenize(line).unwrap().unwrap();
        assert_eq!(tuples, vec![vec!["1", r#"{"x":"(("}"#, "2"]]);
    }

    #[test]
    fn test_escaped_quote_inside_group_string() {
        let groups = split_groups(r"(1,'don\'t (x)'),(2,'y')").unwrap();
        assert_eq!(groups, vec![r"1,'don\'t (x)'", "2,'y'"]);
    }

    #[test]
    fn test_unterminated_group_is_an_error() {
        let err = split_groups("(1,2),(3,'open").unwrap_err();
        assert_eq!(err, TokenizeError::UnterminatedGroup { offset: 6 });

        let line = "INSERT INTO `ACTIVITYLOG` VALUES (1,2),(3,";
        assert!(tokenizer().tokenize(line).is_err());
    }

    #[test]
    fn test_table_name_is_escaped_in_pattern() {
        let t = StatementTokenizer::new("log.v2").unwrap();
        assert!(t.tokenize("INSERT INTO `log.v2` VALUES (1);").unwrap().is_some());
        assert!(t.tokenize("INSERT INTO `logXv2` VALUES (1);").unwrap().is_none());
        assert_eq!(t.table(), "log.v2");
    }
}
