use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            date        TEXT NOT NULL,
            time        TEXT NOT NULL,
            location    TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'active',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS attendees (
            id          INTEGER PRIMARY KEY,
            event_id    INTEGER NOT NULL REFERENCES events(id),
            name        TEXT NOT NULL,
            dependents  INTEGER NOT NULL DEFAULT 0,
            relation    TEXT NOT NULL DEFAULT 'self',
            status      TEXT NOT NULL DEFAULT 'pending',
            car_plate   TEXT NOT NULL DEFAULT '',
            total       INTEGER NOT NULL DEFAULT 1,
            is_leader   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_attendees_event
            ON attendees(event_id, id);

        CREATE TABLE IF NOT EXISTS event_images (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id    INTEGER NOT NULL REFERENCES events(id),
            image_data  TEXT NOT NULL,
            uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_event_images_event
            ON event_images(event_id, uploaded_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
