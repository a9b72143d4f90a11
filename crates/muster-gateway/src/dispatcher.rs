use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::warn;
use uuid::Uuid;

use muster_types::events::RoomEvent;

/// Manages all connected viewers, their per-event rooms and the live counts,
/// and routes broadcasts to exactly the room that owns them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Process-wide events (userCountUpdate) — every connection receives these
    broadcast_tx: broadcast::Sender<RoomEvent>,

    /// Connection and room membership state, guarded together so a join or
    /// disconnect can never leave the two views disagreeing
    registry: RwLock<Registry>,
}

#[derive(Default)]
struct Registry {
    /// conn_id -> (sender, rooms the connection currently sits in)
    connections: HashMap<Uuid, ConnectionEntry>,

    /// event_id -> members; entries exist only while the room is non-empty
    rooms: HashMap<i64, HashSet<Uuid>>,

    /// Global connected-viewer counter. Explicit rather than derived so an
    /// underflow from a lifecycle bug is clamped and logged, never displayed
    /// as a negative count.
    connected: usize,
}

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<RoomEvent>,
    rooms: HashSet<i64>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    /// Subscribe to process-wide events. Each connection calls this once,
    /// before `register`, so it also sees its own count update.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Track a new connection. Returns its id and the receiver for targeted
    /// and room-scoped events, and announces the new global count. The count
    /// is sent while the registry lock is still held, so racing registers
    /// and disconnects can never deliver counts out of order.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<RoomEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut registry = self.inner.registry.write().await;
        registry.connections.insert(
            conn_id,
            ConnectionEntry {
                tx,
                rooms: HashSet::new(),
            },
        );
        registry.connected += 1;
        let _ = self.inner.broadcast_tx.send(RoomEvent::UserCountUpdate {
            count: registry.connected,
        });
        (conn_id, rx)
    }

    /// Add a connection to an event's room, creating the room lazily, and
    /// announce the updated count to the room. Returns the new count.
    pub async fn join(&self, event_id: i64, conn_id: Uuid) -> usize {
        let mut registry = self.inner.registry.write().await;
        let Some((count, members)) = registry.join_room(event_id, conn_id) else {
            warn!("Join for unknown connection {}", conn_id);
            return 0;
        };
        deliver(&members, &RoomEvent::EventUserCountUpdate { event_id, count });
        count
    }

    /// Join a room and install the connection's snapshot in one atomic step.
    /// `fetch` runs on the blocking pool while the registry write lock is
    /// held, which stalls every `publish` for the duration: a concurrent
    /// mutation lands either inside the snapshot or in the queue behind it,
    /// and the joiner's first room events are always the snapshot itself.
    pub async fn join_with_snapshot<F>(&self, event_id: i64, conn_id: Uuid, fetch: F) -> usize
    where
        F: FnOnce() -> anyhow::Result<Vec<RoomEvent>> + Send + 'static,
    {
        let mut registry = self.inner.registry.write().await;
        if !registry.connections.contains_key(&conn_id) {
            warn!("Join for unknown connection {}", conn_id);
            return 0;
        }

        let snapshot = tokio::task::spawn_blocking(fetch).await;

        let Some((count, members)) = registry.join_room(event_id, conn_id) else {
            return 0;
        };

        // A failed fetch is logged and the join stands; the viewer keeps
        // its connection and still receives subsequent broadcasts.
        if let Some(entry) = registry.connections.get(&conn_id) {
            match snapshot {
                Ok(Ok(events)) => {
                    for event in events {
                        let _ = entry.tx.send(event);
                    }
                }
                Ok(Err(e)) => warn!("Snapshot fetch for event {} failed: {}", event_id, e),
                Err(e) => warn!("Snapshot task for event {} panicked: {}", event_id, e),
            }
        }

        deliver(&members, &RoomEvent::EventUserCountUpdate { event_id, count });
        count
    }

    /// Remove a connection from a room. Leaving a room never joined is
    /// tolerated silently. An emptied room is dropped without a broadcast —
    /// no listeners remain.
    pub async fn leave(&self, event_id: i64, conn_id: Uuid) {
        let mut registry = self.inner.registry.write().await;
        if let Some((count, members)) = registry.leave_room(event_id, conn_id) {
            deliver(&members, &RoomEvent::EventUserCountUpdate { event_id, count });
        }
    }

    /// Drop a connection: leave every room it was in, decrement the global
    /// counter exactly once and announce it. Idempotent — a second call for
    /// the same connection is a no-op. All counts go out under the registry
    /// lock so observers see them in the order they happened.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let mut registry = self.inner.registry.write().await;
        let Some(entry) = registry.connections.remove(&conn_id) else {
            return;
        };

        for event_id in entry.rooms {
            if let Some((count, members)) = registry.leave_room(event_id, conn_id) {
                deliver(&members, &RoomEvent::EventUserCountUpdate { event_id, count });
            }
        }

        if registry.connected == 0 {
            warn!("Connection counter underflow on disconnect of {}", conn_id);
        }
        registry.connected = registry.connected.saturating_sub(1);
        let _ = self.inner.broadcast_tx.send(RoomEvent::UserCountUpdate {
            count: registry.connected,
        });
    }

    /// Deliver an event to every current member of one room, and no others.
    /// Fire-and-forget: send failures are the receiver's problem.
    pub async fn publish(&self, event_id: i64, event: RoomEvent) {
        let registry = self.inner.registry.read().await;
        let Some(room) = registry.rooms.get(&event_id) else {
            return;
        };
        let ids = room.iter().copied().collect::<Vec<_>>();
        deliver(&registry.senders_for(&ids), &event);
    }

    pub async fn connected_users(&self) -> usize {
        self.inner.registry.read().await.connected
    }

    pub async fn room_count(&self, event_id: i64) -> Option<usize> {
        self.inner
            .registry
            .read()
            .await
            .rooms
            .get(&event_id)
            .map(HashSet::len)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Shared join path. Returns `None` for an unknown connection, otherwise
    /// the new room count and the members to notify.
    fn join_room(
        &mut self,
        event_id: i64,
        conn_id: Uuid,
    ) -> Option<(usize, Vec<mpsc::UnboundedSender<RoomEvent>>)> {
        if !self.connections.contains_key(&conn_id) {
            return None;
        }

        let room = self.rooms.entry(event_id).or_default();
        room.insert(conn_id);
        let count = room.len();
        let members = room.iter().copied().collect::<Vec<_>>();

        if let Some(entry) = self.connections.get_mut(&conn_id) {
            entry.rooms.insert(event_id);
        }
        Some((count, self.senders_for(&members)))
    }

    /// Shared leave path for `leave` and `disconnect`. Returns the remaining
    /// members to notify, or `None` if the room emptied or nothing changed.
    fn leave_room(
        &mut self,
        event_id: i64,
        conn_id: Uuid,
    ) -> Option<(usize, Vec<mpsc::UnboundedSender<RoomEvent>>)> {
        if let Some(entry) = self.connections.get_mut(&conn_id) {
            entry.rooms.remove(&event_id);
        }

        let room = self.rooms.get_mut(&event_id)?;
        if !room.remove(&conn_id) {
            return None;
        }

        if room.is_empty() {
            self.rooms.remove(&event_id);
            return None;
        }

        let count = room.len();
        let members = room.iter().copied().collect::<Vec<_>>();
        Some((count, self.senders_for(&members)))
    }

    fn senders_for(&self, conn_ids: &[Uuid]) -> Vec<mpsc::UnboundedSender<RoomEvent>> {
        conn_ids
            .iter()
            .filter_map(|id| self.connections.get(id).map(|entry| entry.tx.clone()))
            .collect()
    }
}

fn deliver(members: &[mpsc::UnboundedSender<RoomEvent>], event: &RoomEvent) {
    for tx in members {
        let _ = tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn room_counts(events: &[RoomEvent]) -> Vec<(i64, usize)> {
        events
            .iter()
            .filter_map(|e| match e {
                RoomEvent::EventUserCountUpdate { event_id, count } => Some((*event_id, *count)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn joins_emit_incrementing_room_counts() {
        let dispatcher = Dispatcher::new();
        let (a, mut rx_a) = dispatcher.register().await;
        let (b, _rx_b) = dispatcher.register().await;
        let (c, _rx_c) = dispatcher.register().await;

        dispatcher.join(1, a).await;
        dispatcher.join(1, b).await;
        dispatcher.join(1, c).await;

        // The first member saw each join land
        assert_eq!(room_counts(&drain(&mut rx_a)), vec![(1, 1), (1, 2), (1, 3)]);
        assert_eq!(dispatcher.room_count(1).await, Some(3));
    }

    #[tokio::test]
    async fn emptied_room_is_dropped_and_rejoin_starts_fresh() {
        let dispatcher = Dispatcher::new();
        let (a, _rx_a) = dispatcher.register().await;
        let (b, _rx_b) = dispatcher.register().await;

        dispatcher.join(4, a).await;
        dispatcher.join(4, b).await;
        dispatcher.leave(4, a).await;
        dispatcher.leave(4, b).await;

        assert_eq!(dispatcher.room_count(4).await, None);

        let count = dispatcher.join(4, a).await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn leave_without_join_is_silent() {
        let dispatcher = Dispatcher::new();
        let (a, _rx_a) = dispatcher.register().await;

        // Never joined room 9; must not panic or create the room
        dispatcher.leave(9, a).await;
        assert_eq!(dispatcher.room_count(9).await, None);
    }

    #[tokio::test]
    async fn disconnect_leaves_every_room_and_is_idempotent() {
        let dispatcher = Dispatcher::new();
        let (a, _rx_a) = dispatcher.register().await;
        let (b, mut rx_b) = dispatcher.register().await;

        dispatcher.join(1, a).await;
        dispatcher.join(2, a).await;
        dispatcher.join(1, b).await;
        drain(&mut rx_b);

        dispatcher.disconnect(a).await;
        // Remaining member of room 1 saw exactly one decrement
        assert_eq!(room_counts(&drain(&mut rx_b)), vec![(1, 1)]);
        // Room 2 emptied out entirely
        assert_eq!(dispatcher.room_count(2).await, None);
        assert_eq!(dispatcher.connected_users().await, 1);

        // Second disconnect is a no-op, not a double decrement
        dispatcher.disconnect(a).await;
        assert_eq!(dispatcher.connected_users().await, 1);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn global_count_never_goes_negative() {
        let dispatcher = Dispatcher::new();
        let (a, _rx_a) = dispatcher.register().await;

        dispatcher.disconnect(a).await;
        dispatcher.disconnect(a).await;
        dispatcher.disconnect(Uuid::new_v4()).await;

        assert_eq!(dispatcher.connected_users().await, 0);
    }

    #[tokio::test]
    async fn publish_reaches_room_members_only() {
        let dispatcher = Dispatcher::new();
        let (a, mut rx_a) = dispatcher.register().await;
        let (b, mut rx_b) = dispatcher.register().await;

        dispatcher.join(1, a).await;
        dispatcher.join(2, b).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        dispatcher
            .publish(1, RoomEvent::ImageUpdated { image_url: Some("img".into()) })
            .await;

        let received = drain(&mut rx_a);
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], RoomEvent::ImageUpdated { .. }));

        // The connection joined only to event 2's room sees nothing
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn publish_to_unknown_room_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .publish(42, RoomEvent::ImageUpdated { image_url: None })
            .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn join_snapshot_precedes_concurrent_room_broadcasts() {
        let dispatcher = Dispatcher::new();
        let (a, mut rx_a) = dispatcher.register().await;

        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let joiner = dispatcher.clone();
        let join_task = tokio::spawn(async move {
            joiner
                .join_with_snapshot(1, a, move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(vec![RoomEvent::InitialData {
                        attendees: Vec::new(),
                    }])
                })
                .await
        });

        // Fan out a mutation while the snapshot read is still in flight
        started_rx.recv().unwrap();
        let publisher = dispatcher.clone();
        let publish_task = tokio::spawn(async move {
            publisher
                .publish(1, RoomEvent::ImageUpdated { image_url: Some("img".into()) })
                .await;
        });
        release_tx.send(()).unwrap();

        assert_eq!(join_task.await.unwrap(), 1);
        publish_task.await.unwrap();

        // The snapshot heads the queue; the racing broadcast lands behind it
        let events = drain(&mut rx_a);
        assert!(matches!(events[0], RoomEvent::InitialData { .. }));
        let image_pos = events
            .iter()
            .position(|e| matches!(e, RoomEvent::ImageUpdated { .. }))
            .expect("racing broadcast was delivered");
        assert!(image_pos > 0);
    }

    #[tokio::test]
    async fn failed_snapshot_fetch_still_joins_the_room() {
        let dispatcher = Dispatcher::new();
        let (a, mut rx_a) = dispatcher.register().await;

        let count = dispatcher
            .join_with_snapshot(1, a, || anyhow::bail!("store offline"))
            .await;
        assert_eq!(count, 1);
        assert_eq!(dispatcher.room_count(1).await, Some(1));

        // No snapshot, but the join's count update still arrives
        assert_eq!(room_counts(&drain(&mut rx_a)), vec![(1, 1)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn global_counts_are_delivered_in_order_under_races() {
        let dispatcher = Dispatcher::new();
        let mut global = dispatcher.subscribe();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let d = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                let (id, _rx) = d.register().await;
                d.disconnect(id).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Each event changes the count by exactly one; any reordering
        // would show up as a jump or a repeat
        let mut last: Option<i64> = None;
        while let Ok(event) = global.try_recv() {
            if let RoomEvent::UserCountUpdate { count } = event {
                let count = count as i64;
                if let Some(prev) = last {
                    assert_eq!((prev - count).abs(), 1, "counts out of order");
                }
                last = Some(count);
            }
        }
        assert_eq!(last, Some(0));
    }

    #[tokio::test]
    async fn register_and_disconnect_announce_global_counts() {
        let dispatcher = Dispatcher::new();
        let mut global = dispatcher.subscribe();

        let (a, _rx_a) = dispatcher.register().await;
        let (_b, _rx_b) = dispatcher.register().await;
        dispatcher.disconnect(a).await;

        let mut counts = Vec::new();
        while let Ok(event) = global.try_recv() {
            if let RoomEvent::UserCountUpdate { count } = event {
                counts.push(count);
            }
        }
        assert_eq!(counts, vec![1, 2, 1]);
    }
}
