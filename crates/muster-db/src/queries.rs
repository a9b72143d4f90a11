use crate::models::{AttendeeRow, EventRow, StatsRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

const ATTENDEE_SELECT: &str = "SELECT a.id, a.event_id, a.name, a.dependents, a.relation,
            a.status, a.car_plate, a.total, a.is_leader, a.created_at, a.updated_at,
            e.name, e.date
     FROM attendees a
     JOIN events e ON a.event_id = e.id";

impl Database {
    // -- Events --

    pub fn create_event(&self, name: &str, date: &str, time: &str, location: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO events (name, date, time, location) VALUES (?1, ?2, ?3, ?4)",
                (name, date, time, location),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_event(&self, id: i64) -> Result<Option<EventRow>> {
        self.with_conn(|conn| query_event(conn, id))
    }

    pub fn list_events(&self) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, date, time, location, status, created_at
                 FROM events ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], event_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Attendees --

    pub fn create_attendee(
        &self,
        event_id: i64,
        name: &str,
        dependents: i64,
        relation: &str,
        is_leader: bool,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO attendees (event_id, name, dependents, relation, total, is_leader)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![event_id, name, dependents, relation, dependents + 1, is_leader],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_attendee(&self, id: i64) -> Result<Option<AttendeeRow>> {
        self.with_conn(|conn| query_attendee(conn, id))
    }

    pub fn list_attendees(&self, event_id: i64) -> Result<Vec<AttendeeRow>> {
        self.with_conn(|conn| query_attendees(conn, event_id))
    }

    /// Write half of a check-in. Returns the affected row count; zero means
    /// no such attendee.
    pub fn set_attendee_status(&self, id: i64, status: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute(
                "UPDATE attendees SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                rusqlite::params![status, id],
            )?;
            Ok(affected)
        })
    }

    pub fn set_attendee_car_plate(&self, id: i64, plate: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute(
                "UPDATE attendees SET car_plate = ?1, updated_at = datetime('now') WHERE id = ?2",
                rusqlite::params![plate, id],
            )?;
            Ok(affected)
        })
    }

    // -- Event images --

    /// Atomically swap the event's image set for exactly one new row.
    /// Delete-all + insert inside one transaction, so no observer can see
    /// zero-and-two images around the swap.
    pub fn replace_event_image(&self, event_id: i64, image_data: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM event_images WHERE event_id = ?1",
                [event_id],
            )?;
            tx.execute(
                "INSERT INTO event_images (event_id, image_data) VALUES (?1, ?2)",
                rusqlite::params![event_id, image_data],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn latest_event_image(&self, event_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT image_data FROM event_images
                     WHERE event_id = ?1
                     ORDER BY uploaded_at DESC, id DESC LIMIT 1",
                    [event_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Reset --

    /// Bulk reset of one event: every attendee back to pending with an empty
    /// car plate, all images dropped. One transaction, so a reader never
    /// observes half-reset rows.
    pub fn reset_event(&self, event_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE attendees
                 SET status = 'pending', car_plate = '', updated_at = datetime('now')
                 WHERE event_id = ?1",
                [event_id],
            )?;
            tx.execute(
                "DELETE FROM event_images WHERE event_id = ?1",
                [event_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Stats --

    pub fn event_stats(&self, event_id: i64) -> Result<StatsRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(total), 0),
                        COALESCE(SUM(CASE WHEN status = 'checked-in' THEN total ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'pending' THEN total ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN car_plate <> '' THEN 1 ELSE 0 END), 0)
                 FROM attendees WHERE event_id = ?1",
                [event_id],
                |row| {
                    Ok(StatsRow {
                        registrations: row.get(0)?,
                        total_people: row.get(1)?,
                        checked_in_people: row.get(2)?,
                        pending_people: row.get(3)?,
                        car_plates: row.get(4)?,
                    })
                },
            )?;
            Ok(row)
        })
    }
}

fn query_event(conn: &Connection, id: i64) -> Result<Option<EventRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, date, time, location, status, created_at
         FROM events WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], event_from_row).optional()?;
    Ok(row)
}

fn query_attendee(conn: &Connection, id: i64) -> Result<Option<AttendeeRow>> {
    let mut stmt = conn.prepare(&format!("{ATTENDEE_SELECT} WHERE a.id = ?1"))?;
    let row = stmt.query_row([id], attendee_from_row).optional()?;
    Ok(row)
}

fn query_attendees(conn: &Connection, event_id: i64) -> Result<Vec<AttendeeRow>> {
    let mut stmt = conn.prepare(&format!(
        "{ATTENDEE_SELECT} WHERE a.event_id = ?1 ORDER BY a.id"
    ))?;
    let rows = stmt
        .query_map([event_id], attendee_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        name: row.get(1)?,
        date: row.get(2)?,
        time: row.get(3)?,
        location: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn attendee_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendeeRow> {
    Ok(AttendeeRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        name: row.get(2)?,
        dependents: row.get(3)?,
        relation: row.get(4)?,
        status: row.get(5)?,
        car_plate: row.get(6)?,
        total: row.get(7)?,
        is_leader: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        event_name: row.get(11)?,
        event_date: row.get(12)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use tempfile::TempDir;

    fn setup() -> (Database, TempDir, i64) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let event_id = db
            .create_event("Spring Meetup", "2026-04-18", "09:00", "North Hall")
            .unwrap();
        (db, dir, event_id)
    }

    #[test]
    fn check_in_updates_row_and_read_back_reflects_it() {
        let (db, _dir, event_id) = setup();
        let id = db.create_attendee(event_id, "Dana Reyes", 2, "dependent", true).unwrap();

        let affected = db.set_attendee_status(id, "checked-in").unwrap();
        assert_eq!(affected, 1);

        let row = db.get_attendee(id).unwrap().unwrap();
        assert_eq!(row.status, "checked-in");
        assert_eq!(row.total, 3);
        assert!(row.is_leader);
        assert_eq!(row.event_name, "Spring Meetup");
        assert_eq!(row.event_date, "2026-04-18");
    }

    #[test]
    fn updating_missing_attendee_affects_zero_rows() {
        let (db, _dir, _event_id) = setup();
        assert_eq!(db.set_attendee_status(999, "checked-in").unwrap(), 0);
        assert_eq!(db.set_attendee_car_plate(999, "ABC-123").unwrap(), 0);
    }

    #[test]
    fn image_replace_is_last_write_wins() {
        let (db, _dir, event_id) = setup();

        db.replace_event_image(event_id, "img-v1").unwrap();
        db.replace_event_image(event_id, "img-v2").unwrap();

        assert_eq!(
            db.latest_event_image(event_id).unwrap().as_deref(),
            Some("img-v2")
        );

        // Exactly one row survives the swap
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM event_images WHERE event_id = ?1",
                    [event_id],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn images_are_scoped_per_event() {
        let (db, _dir, event_a) = setup();
        let event_b = db
            .create_event("Autumn Meetup", "2026-10-03", "10:00", "South Hall")
            .unwrap();

        db.replace_event_image(event_a, "img-a").unwrap();
        db.replace_event_image(event_b, "img-b").unwrap();

        assert_eq!(db.latest_event_image(event_a).unwrap().as_deref(), Some("img-a"));
        assert_eq!(db.latest_event_image(event_b).unwrap().as_deref(), Some("img-b"));
    }

    #[test]
    fn reset_clears_status_plates_and_images() {
        let (db, _dir, event_id) = setup();
        let a = db.create_attendee(event_id, "Avery Lin", 0, "self", false).unwrap();
        let b = db.create_attendee(event_id, "Noor Haddad", 1, "dependent", false).unwrap();

        db.set_attendee_status(a, "checked-in").unwrap();
        db.set_attendee_car_plate(b, "XYZ-789").unwrap();
        db.replace_event_image(event_id, "banner").unwrap();

        db.reset_event(event_id).unwrap();

        let stats = db.event_stats(event_id).unwrap();
        assert_eq!(stats.checked_in_people, 0);
        assert_eq!(stats.pending_people, stats.total_people);
        assert_eq!(stats.car_plates, 0);
        assert!(db.latest_event_image(event_id).unwrap().is_none());
    }

    #[test]
    fn reset_leaves_other_events_alone() {
        let (db, _dir, event_a) = setup();
        let event_b = db
            .create_event("Autumn Meetup", "2026-10-03", "10:00", "South Hall")
            .unwrap();
        let other = db.create_attendee(event_b, "Sam Ortiz", 0, "guest", false).unwrap();
        db.set_attendee_status(other, "checked-in").unwrap();

        db.reset_event(event_a).unwrap();

        let row = db.get_attendee(other).unwrap().unwrap();
        assert_eq!(row.status, "checked-in");
    }

    #[test]
    fn stats_aggregate_headcounts() {
        let (db, _dir, event_id) = setup();
        let a = db.create_attendee(event_id, "Avery Lin", 0, "self", false).unwrap();
        let b = db.create_attendee(event_id, "Dana Reyes", 2, "dependent", true).unwrap();
        db.create_attendee(event_id, "Sam Ortiz", 0, "guest", false).unwrap();

        db.set_attendee_status(b, "checked-in").unwrap();
        db.set_attendee_car_plate(a, "ABC-123").unwrap();

        let stats = db.event_stats(event_id).unwrap();
        assert_eq!(stats.registrations, 3);
        assert_eq!(stats.total_people, 5);
        assert_eq!(stats.checked_in_people, 3);
        assert_eq!(stats.pending_people, 2);
        assert_eq!(stats.car_plates, 1);
    }

    #[test]
    fn attendees_list_in_id_order() {
        let (db, _dir, event_id) = setup();
        for name in ["Avery Lin", "Dana Reyes", "Sam Ortiz"] {
            db.create_attendee(event_id, name, 0, "self", false).unwrap();
        }
        let rows = db.list_attendees(event_id).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(rows.len(), 3);
    }
}
