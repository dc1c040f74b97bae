//! Textual SQL wrappers applied on top of caller-supplied statements.
//!
//! These shapes are relied on by hosts and must stay byte-for-byte stable.

/// Strip surrounding whitespace and a single trailing statement terminator.
fn strip_terminator(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed)
}

/// Re-page an arbitrary query without rewriting it.
pub fn add_limit(sql: &str, limit: i64, offset: i64) -> String {
    format!(
        "select * from ({}) offset {} limit {};",
        strip_terminator(sql),
        offset,
        limit
    )
}

/// `CREATE OR REPLACE VIEW` statement wrapping an already translated query.
pub fn create_view_sql(name: &str, sql: &str) -> String {
    format!(
        "CREATE OR REPLACE VIEW '{}' AS ({})",
        name.replace('\'', "''"),
        sql
    )
}
