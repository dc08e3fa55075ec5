//! SQL identifier and literal quoting
//!
//! Every identifier or literal interpolated into generated SQL goes through
//! one of these functions. Identifiers are always quoted because Snowflake
//! folds unquoted names to upper case.

/// Quote an identifier: wrap in double quotes and double embedded ones.
///
/// ```rust
/// use db_writer_snowflake::database::quote::quote_identifier;
///
/// assert_eq!(quote_identifier("id"), "\"id\"");
/// assert_eq!(quote_identifier("my\"col"), "\"my\"\"col\"");
/// ```
pub fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quote a string literal: wrap in single quotes, backslash-escaping
/// backslashes, quotes and NUL bytes so the literal cannot terminate early.
///
/// ```rust
/// use db_writer_snowflake::database::quote::quote_literal;
///
/// assert_eq!(quote_literal("abc"), "'abc'");
/// assert_eq!(quote_literal("it's"), "'it\\'s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '"' => quoted.push_str("\\\""),
            '\0' => quoted.push_str("\\0"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote each name and join with `", "`.
pub fn quote_identifier_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| quote_identifier(name.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
