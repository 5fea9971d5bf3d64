//! SQL helper functions for catalog statements.
//!
//! Values always travel as `$n` parameters. Identifiers cannot be bound as
//! parameters in DDL (`ALTER SCHEMA`, `CREATE SCHEMA`), so they are quoted
//! here instead.

/// Quotes a PostgreSQL identifier.
///
/// Wraps the name in double quotes and doubles any embedded double quote,
/// so the result always parses as exactly one identifier with the original
/// spelling and case.
///
/// # Examples
///
/// ```
/// use ag_clone_graph::catalog::quote_ident;
///
/// assert_eq!(quote_ident("gtemplate"), "\"gtemplate\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
#[must_use]
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
