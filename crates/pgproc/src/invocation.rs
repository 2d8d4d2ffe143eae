//! Invocation Builder

/// Positional placeholders `$1,$2,...,$n`, empty for `n == 0`
pub fn placeholders(nargs: usize) -> String {
    (1..=nargs)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote an identifier for PostgreSQL.
///
/// Embedded double quotes are doubled. PostgreSQL identifiers cannot contain
/// NUL, so the name is cut at the first one.
pub fn quote_identifier(name: &str) -> String {
    let name = name.split('\0').next().unwrap_or_default();
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The statement invoking `schema.routine` with `nargs` positional arguments.
/// The same text serves every return shape.
pub fn build(schema: &str, routine: &str, nargs: usize) -> String {
    format!(
        "SELECT * FROM {}.{}({})",
        quote_identifier(schema),
        quote_identifier(routine),
        placeholders(nargs)
    )
}
