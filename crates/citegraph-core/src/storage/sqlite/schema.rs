use rusqlite::Connection;

use crate::error::Result;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            label       TEXT NOT NULL,
            key         TEXT NOT NULL,
            properties  TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (label, key)
        );

        CREATE TABLE IF NOT EXISTS relationships (
            kind        TEXT NOT NULL,
            from_label  TEXT NOT NULL,
            from_key    TEXT NOT NULL,
            to_label    TEXT NOT NULL,
            to_key      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (kind, from_label, from_key, to_label, to_key)
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_relationships_to
            ON relationships(kind, to_label, to_key);
        ",
    )?;
    Ok(())
}

/// Idempotent: safe to run on every open.
pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}
