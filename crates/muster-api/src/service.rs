//! The mutation service: every state change is one linear pipeline of
//! validate -> write -> read back the canonical row -> broadcast -> return.
//! Handlers stay thin; everything that must hold for correctness lives here.

use anyhow::anyhow;
use tracing::warn;

use muster_types::events::RoomEvent;
use muster_types::records::{AttendeeRecord, AttendeeStatus, EventRecord, Relation, StatsRecord};

use crate::AppStateInner;
use crate::error::ApiError;

/// Check an attendee in (or back out). The broadcast carries the row as
/// re-read after the write, never the request payload.
pub async fn check_in(
    state: &AppStateInner,
    attendee_id: i64,
    status: &str,
) -> Result<AttendeeRecord, ApiError> {
    let status: AttendeeStatus = status
        .parse()
        .map_err(|e: muster_types::records::UnknownValue| ApiError::InvalidArgument(e.to_string()))?;

    let db = state.db.clone();
    let affected = run_blocking(move || db.set_attendee_status(attendee_id, status.as_str())).await?;
    if affected == 0 {
        return Err(ApiError::NotFound);
    }

    let record = read_back_attendee(state, attendee_id).await?;
    broadcast_after(
        state,
        record.event_id,
        RoomEvent::AttendeeUpdated {
            record: record.clone(),
        },
    )
    .await;
    Ok(record)
}

/// Set or clear an attendee's car plate. Plate text is opaque; no validation.
pub async fn set_car_plate(
    state: &AppStateInner,
    attendee_id: i64,
    plate: &str,
) -> Result<AttendeeRecord, ApiError> {
    let db = state.db.clone();
    let plate = plate.to_string();
    let affected = run_blocking(move || db.set_attendee_car_plate(attendee_id, &plate)).await?;
    if affected == 0 {
        return Err(ApiError::NotFound);
    }

    let record = read_back_attendee(state, attendee_id).await?;
    broadcast_after(
        state,
        record.event_id,
        RoomEvent::AttendeeUpdated {
            record: record.clone(),
        },
    )
    .await;
    Ok(record)
}

/// Replace the event's image set with exactly one new image.
pub async fn set_event_image(
    state: &AppStateInner,
    event_id: i64,
    image_data: String,
) -> Result<Option<String>, ApiError> {
    let db = state.db.clone();
    let replaced = run_blocking(move || {
        if db.get_event(event_id)?.is_none() {
            return Ok(false);
        }
        db.replace_event_image(event_id, &image_data)?;
        Ok(true)
    })
    .await?;
    if !replaced {
        return Err(ApiError::NotFound);
    }

    let image_url = read_back_image(state, event_id).await?;
    broadcast_after(
        state,
        event_id,
        RoomEvent::ImageUpdated {
            image_url: image_url.clone(),
        },
    )
    .await;
    Ok(image_url)
}

/// Reset one event: every attendee back to pending, plates cleared, images
/// dropped — one transaction at the store. Returns the refreshed list.
pub async fn reset_event(
    state: &AppStateInner,
    event_id: i64,
) -> Result<Vec<AttendeeRecord>, ApiError> {
    let db = state.db.clone();
    let reset = run_blocking(move || {
        if db.get_event(event_id)?.is_none() {
            return Ok(false);
        }
        db.reset_event(event_id)?;
        Ok(true)
    })
    .await?;
    if !reset {
        return Err(ApiError::NotFound);
    }

    let attendees = read_back_attendees(state, event_id).await?;
    broadcast_after(
        state,
        event_id,
        RoomEvent::DataReset {
            attendees: attendees.clone(),
        },
    )
    .await;
    Ok(attendees)
}

/// Read-only aggregate; never broadcasts.
pub async fn stats(state: &AppStateInner, event_id: i64) -> Result<StatsRecord, ApiError> {
    let db = state.db.clone();
    let stats = run_blocking(move || {
        if db.get_event(event_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.event_stats(event_id)?))
    })
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(stats.into_record())
}

/// Add a registration to an event's roster. Live viewers learn about the
/// new row the same way they learn about any other attendee change.
pub async fn register_attendee(
    state: &AppStateInner,
    event_id: i64,
    name: String,
    dependents: i64,
    relation: &str,
    is_leader: bool,
) -> Result<AttendeeRecord, ApiError> {
    let relation: Relation = relation
        .parse()
        .map_err(|e: muster_types::records::UnknownValue| ApiError::InvalidArgument(e.to_string()))?;
    if name.trim().is_empty() {
        return Err(ApiError::InvalidArgument("attendee name cannot be empty".into()));
    }
    if dependents < 0 {
        return Err(ApiError::InvalidArgument("dependents cannot be negative".into()));
    }

    let db = state.db.clone();
    let attendee_id = run_blocking(move || {
        if db.get_event(event_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.create_attendee(
            event_id,
            &name,
            dependents,
            relation.as_str(),
            is_leader,
        )?))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let record = read_back_attendee(state, attendee_id).await?;
    broadcast_after(
        state,
        record.event_id,
        RoomEvent::AttendeeUpdated {
            record: record.clone(),
        },
    )
    .await;
    Ok(record)
}

// -- Reads exposed to the HTTP layer --

pub async fn list_attendees(
    state: &AppStateInner,
    event_id: i64,
) -> Result<Vec<AttendeeRecord>, ApiError> {
    let db = state.db.clone();
    let rows = run_blocking(move || {
        if db.get_event(event_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.list_attendees(event_id)?))
    })
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(rows.into_iter().map(|row| row.into_record()).collect())
}

pub async fn get_image(state: &AppStateInner, event_id: i64) -> Result<Option<String>, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.latest_event_image(event_id)).await
}

pub async fn list_events(state: &AppStateInner) -> Result<Vec<EventRecord>, ApiError> {
    let db = state.db.clone();
    let rows = run_blocking(move || db.list_events()).await?;
    Ok(rows.into_iter().map(|row| row.into_record()).collect())
}

pub async fn create_event(
    state: &AppStateInner,
    name: String,
    date: String,
    time: String,
    location: String,
) -> Result<EventRecord, ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::InvalidArgument("event name cannot be empty".into()));
    }

    let db = state.db.clone();
    let event_id = run_blocking(move || db.create_event(&name, &date, &time, &location)).await?;

    let db = state.db.clone();
    let row = run_blocking(move || db.get_event(event_id))
        .await?
        .ok_or_else(|| ApiError::Store(anyhow!("event {} vanished after insert", event_id)))?;
    Ok(row.into_record())
}

// -- Pipeline plumbing --

/// The single post-mutation hook: every successful state-changing mutation
/// calls this exactly once, scoped to the owning event, with the canonical
/// post-write payload. Delivery is best-effort; transport errors never fail
/// the mutation that triggered it.
async fn broadcast_after(state: &AppStateInner, event_id: i64, event: RoomEvent) {
    state.dispatcher.publish(event_id, event).await;
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Store(anyhow!("blocking task failed: {e}")))?
        .map_err(ApiError::Store)
}

/// Re-read the canonical attendee row after a write. The write already
/// committed, so a failed read means failed-to-confirm: retry once, then
/// surface `Store` — without a verified record nothing may be broadcast.
async fn read_back_attendee(
    state: &AppStateInner,
    attendee_id: i64,
) -> Result<AttendeeRecord, ApiError> {
    let mut last_err = None;
    for attempt in 0..2 {
        let db = state.db.clone();
        match run_blocking(move || db.get_attendee(attendee_id)).await {
            Ok(Some(row)) => return Ok(row.into_record()),
            Ok(None) => {
                last_err = Some(anyhow!("attendee {} vanished after write", attendee_id));
            }
            Err(ApiError::Store(e)) => last_err = Some(e),
            Err(e) => return Err(e),
        }
        if attempt == 0 {
            warn!("Read-back for attendee {} failed, retrying once", attendee_id);
        }
    }
    Err(ApiError::Store(last_err.unwrap_or_else(|| {
        anyhow!("read-back failed for attendee {}", attendee_id)
    })))
}

async fn read_back_image(
    state: &AppStateInner,
    event_id: i64,
) -> Result<Option<String>, ApiError> {
    let mut last_err = None;
    for attempt in 0..2 {
        let db = state.db.clone();
        match run_blocking(move || db.latest_event_image(event_id)).await {
            Ok(image) => return Ok(image),
            Err(ApiError::Store(e)) => last_err = Some(e),
            Err(e) => return Err(e),
        }
        if attempt == 0 {
            warn!("Read-back for event {} image failed, retrying once", event_id);
        }
    }
    Err(ApiError::Store(last_err.unwrap_or_else(|| {
        anyhow!("read-back failed for event {} image", event_id)
    })))
}

async fn read_back_attendees(
    state: &AppStateInner,
    event_id: i64,
) -> Result<Vec<AttendeeRecord>, ApiError> {
    let mut last_err = None;
    for attempt in 0..2 {
        let db = state.db.clone();
        match run_blocking(move || db.list_attendees(event_id)).await {
            Ok(rows) => return Ok(rows.into_iter().map(|row| row.into_record()).collect()),
            Err(ApiError::Store(e)) => last_err = Some(e),
            Err(e) => return Err(e),
        }
        if attempt == 0 {
            warn!("Read-back for event {} attendees failed, retrying once", event_id);
        }
    }
    Err(ApiError::Store(last_err.unwrap_or_else(|| {
        anyhow!("read-back failed for event {} attendees", event_id)
    })))
}
