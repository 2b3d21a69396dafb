use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "fitgrade.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS options(
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            label TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_options_field ON options(field, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_definitions(
            test_type TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            input_format TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    // Threshold tables are stored long-form: one row per (row, column) cell,
    // including the final_score column. Values stay as text.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS benchmark_cells(
            test_type TEXT NOT NULL,
            row_idx INTEGER NOT NULL,
            column_name TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY(test_type, row_idx, column_name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS endpoint_rows(
            test_type TEXT NOT NULL,
            gender TEXT NOT NULL,
            grade TEXT NOT NULL,
            top_score TEXT NOT NULL,
            bottom_score TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_endpoint_rows_test ON endpoint_rows(test_type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_weights(
            test_type TEXT NOT NULL,
            gender TEXT,
            weight_percent TEXT NOT NULL,
            label TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_imports(
            id TEXT PRIMARY KEY,
            folder TEXT NOT NULL,
            digest TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            option_count INTEGER NOT NULL,
            test_count INTEGER NOT NULL,
            benchmark_table_count INTEGER NOT NULL,
            endpoint_row_count INTEGER NOT NULL,
            weight_count INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("{}-{}", prefix, nanos))
    }

    #[test]
    fn open_is_idempotent_and_settings_roundtrip() {
        let ws = temp_workspace("fitgrade-db");
        let conn = open_db(&ws).expect("open");
        assert_eq!(settings_get_json(&conn, "setup.grading").unwrap(), None);
        settings_set_json(&conn, "setup.grading", &json!({ "countMinimum": "nonNegative" }))
            .expect("set");
        settings_set_json(&conn, "setup.grading", &json!({ "countMinimum": "positive" }))
            .expect("overwrite");
        drop(conn);

        let conn = open_db(&ws).expect("reopen");
        assert_eq!(
            settings_get_json(&conn, "setup.grading").unwrap(),
            Some(json!({ "countMinimum": "positive" }))
        );
        let _ = std::fs::remove_dir_all(&ws);
    }
}
