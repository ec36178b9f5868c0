use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS confessions (
            id          TEXT PRIMARY KEY,
            message     TEXT NOT NULL,
            nickname    TEXT,
            mood        TEXT,
            latitude    REAL,
            longitude   REAL,
            reactions   TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_confessions_created
            ON confessions(created_at DESC);

        CREATE TABLE IF NOT EXISTS analytics (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type  TEXT NOT NULL,
            event_data  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_analytics_type
            ON analytics(event_type);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
