//! SQLite schema for a queue table.
//!
//! Timestamps are stored as TEXT with millisecond precision so leases shorter than a
//! second can be compared with `julianday()`. `AUTOINCREMENT` keeps ids from being reused
//! after the highest row is deleted.

/// Millisecond-precision UTC timestamp expression.
pub(crate) const NOW_MS: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

/// Statements that create the table and its claim index.
pub fn create_statements(prefix: &str) -> Vec<String> {
    let table = crate::store::table_name(prefix);
    vec![
        format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL DEFAULT ({NOW_MS}),
    checkout TEXT,
    payload BLOB NOT NULL
)"#
        ),
        // NULLs sort first in ascending SQLite indexes.
        format!("CREATE INDEX IF NOT EXISTS {table}_idx ON {table} (checkout ASC, timestamp ASC)"),
    ]
}

pub fn drop_statements(prefix: &str) -> Vec<String> {
    vec![format!(
        "DROP TABLE IF EXISTS {}",
        crate::store::table_name(prefix)
    )]
}
