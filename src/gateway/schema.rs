use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            icon TEXT NOT NULL DEFAULT 'folder',
            color TEXT NOT NULL DEFAULT 'text-gray-400',
            parent_id TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS docs (
            id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            icon TEXT,
            color TEXT,
            cover TEXT,
            is_locked INTEGER NOT NULL DEFAULT 0,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            attachments TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS folders_created_idx ON folders(created_at);
        CREATE INDEX IF NOT EXISTS docs_created_idx ON docs(created_at);
        CREATE INDEX IF NOT EXISTS docs_parent_idx ON docs(parent_id);
        "#,
    )
    .context("applying schema")?;
    Ok(())
}
