use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use muster_db::Database;
use muster_types::events::{ClientCommand, RoomEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single viewer WebSocket for its whole lifetime: register it,
/// relay room and global events to it, process join/leave commands, and
/// guarantee registry cleanup when the socket goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before registering so this connection also sees the count
    // update its own arrival causes.
    let mut broadcast_rx = dispatcher.subscribe();
    let (conn_id, mut conn_rx) = dispatcher.register().await;
    info!("Viewer {} connected", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward global broadcasts + room/targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&dispatcher_recv, &db, conn_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "Viewer {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            truncate_utf8(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id).await;
    info!("Viewer {} disconnected", conn_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &RoomEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    conn_id: Uuid,
    cmd: ClientCommand,
) {
    match cmd {
        ClientCommand::JoinEvent { event_id } => {
            // Membership and the snapshot are installed atomically, so the
            // joiner's queue always starts with the snapshot and every
            // mutation lands either inside it or behind it.
            let db = db.clone();
            let count = dispatcher
                .join_with_snapshot(event_id, conn_id, move || {
                    let attendees = db
                        .list_attendees(event_id)?
                        .into_iter()
                        .map(|row| row.into_record())
                        .collect();
                    let image = db.latest_event_image(event_id)?;
                    Ok(vec![
                        RoomEvent::InitialData { attendees },
                        RoomEvent::ImageUpdated { image_url: image },
                    ])
                })
                .await;
            info!("Viewer {} joined event {} ({} in room)", conn_id, event_id, count);
        }
        ClientCommand::LeaveEvent { event_id } => {
            info!("Viewer {} left event {}", conn_id, event_id);
            dispatcher.leave(event_id, conn_id).await;
        }
    }
}

/// Cut log output at `max` bytes without splitting a multi-byte character.
fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_truncation_respects_char_boundaries() {
        // 100 three-byte characters; byte 200 falls inside one of them
        let text = "好".repeat(100);
        let cut = truncate_utf8(&text, 200);
        assert_eq!(cut.len(), 198);
        assert!(cut.chars().all(|c| c == '好'));

        assert_eq!(truncate_utf8("short", 200), "short");
        let ascii = "a".repeat(300);
        assert_eq!(truncate_utf8(&ascii, 200).len(), 200);
    }
}
