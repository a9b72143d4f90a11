use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Seed a demo event and roster so a fresh server has something to show.
/// Runs only when the events table is empty.
pub fn run(conn: &Connection) -> Result<()> {
    let events: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    if events > 0 {
        return Ok(());
    }

    conn.execute(
        "INSERT INTO events (name, date, time, location)
         VALUES ('Annual Member Day', '2026-09-12', '09:30', 'Riverside Pavilion')",
        [],
    )?;
    let event_id = conn.last_insert_rowid();

    let roster: &[(&str, i64, &str, bool)] = &[
        ("Avery Lin", 0, "self", false),
        ("Dana Reyes", 2, "dependent", true),
        ("Noor Haddad", 1, "dependent", false),
        ("Sam Ortiz", 0, "self", false),
        ("Priya Nair", 0, "self", false),
        ("Jonas Weber", 2, "dependent", false),
        ("Mei Tanaka", 0, "guest", false),
        ("Lucas Moreau", 1, "dependent", false),
        ("Ida Svensson", 0, "self", false),
        ("Tomás Vega", 0, "guest", false),
    ];

    let mut stmt = conn.prepare(
        "INSERT INTO attendees (event_id, name, dependents, relation, total, is_leader)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (name, dependents, relation, is_leader) in roster {
        stmt.execute(rusqlite::params![
            event_id,
            name,
            dependents,
            relation,
            dependents + 1,
            is_leader
        ])?;
    }

    info!("Seeded demo event {} with {} attendees", event_id, roster.len());
    Ok(())
}
