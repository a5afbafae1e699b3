//! PostgreSQL schema for a queue table.
//!
//! `create_statements` and `drop_statements` are pure: a prefix maps to a fixed list of
//! statements, each guarded with `IF [NOT] EXISTS` so repeated calls are harmless.

/// Statements that create the sequence, table, claim index and autovacuum settings.
pub fn create_statements(prefix: &str) -> Vec<String> {
    let table = crate::store::table_name(prefix);
    vec![
        format!("CREATE SEQUENCE IF NOT EXISTS {table}_id_seq"),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
    id BIGINT NOT NULL DEFAULT nextval('{table}_id_seq') PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
    checkout TIMESTAMPTZ,
    payload BYTEA NOT NULL
)"#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_idx ON {table} (checkout ASC NULLS FIRST, timestamp ASC)"
        ),
        // Every commit deletes rows; vacuum on absolute thresholds instead of table fraction.
        format!(
            "ALTER TABLE {table} SET (autovacuum_vacuum_scale_factor = 0.0, autovacuum_vacuum_threshold = 250000, autovacuum_analyze_scale_factor = 0.0, autovacuum_analyze_threshold = 50000)"
        ),
    ]
}

/// Statements that drop the table, then its sequence.
pub fn drop_statements(prefix: &str) -> Vec<String> {
    let table = crate::store::table_name(prefix);
    vec![
        format!("DROP TABLE IF EXISTS {table}"),
        format!("DROP SEQUENCE IF EXISTS {table}_id_seq"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_statements_use_prefix() {
        let stmts = create_statements("test_");
        assert_eq!(stmts.len(), 4);
        assert_eq!(stmts[0], "CREATE SEQUENCE IF NOT EXISTS test_q_id_seq");
        assert!(stmts[1].starts_with("CREATE TABLE IF NOT EXISTS test_q ("));
        assert!(stmts[1].contains("nextval('test_q_id_seq')"));
        assert!(stmts[2].contains("ON test_q (checkout ASC NULLS FIRST, timestamp ASC)"));
        assert!(stmts[3].starts_with("ALTER TABLE test_q SET"));
    }

    #[test]
    fn test_drop_statements_drop_table_before_sequence() {
        assert_eq!(
            drop_statements("jobs_"),
            vec![
                "DROP TABLE IF EXISTS jobs_q".to_string(),
                "DROP SEQUENCE IF EXISTS jobs_q_id_seq".to_string(),
            ]
        );
    }
}
