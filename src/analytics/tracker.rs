//! In-memory view-event tracker with periodic flush
//!
//! Page views are recorded on the request hot path, so they are buffered in
//! memory and written to storage in batches instead of one insert per view.
//!
//! Uses an actor with an mpsc channel to avoid lock contention on hot
//! businesses, in a 2-layer arrangement:
//! - Layer 1: actor-local HashMap (single-threaded, no locks)
//! - Layer 2: shared DashMap the flush task drains concurrently

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::analytics::models::NewViewEvent;
use crate::config::TrackerConfig;
use crate::storage::Storage;

enum ActorMessage {
    RecordView(NewViewEvent),
    /// Shutdown signal, flush all buffered events
    Shutdown,
}

struct TrackerActor {
    receiver: mpsc::Receiver<ActorMessage>,
    /// Layer 1: single-threaded event buffer keyed by business id
    buffer: HashMap<i64, Vec<NewViewEvent>>,
    /// Layer 2: shared buffer the flush task reads from
    shared_buffer: Arc<DashMap<i64, Vec<NewViewEvent>>>,
    fast_flush_interval: Duration,
}

impl TrackerActor {
    async fn run(mut self) {
        let mut fast_flush_ticker = tokio::time::interval(self.fast_flush_interval);

        // Skip the first tick which fires immediately
        fast_flush_ticker.tick().await;

        loop {
            tokio::select! {
                Some(msg) = self.receiver.recv() => {
                    match msg {
                        ActorMessage::RecordView(event) => {
                            self.buffer
                                .entry(event.business_id)
                                .or_default()
                                .push(event);
                        }
                        ActorMessage::Shutdown => {
                            info!("View tracker received shutdown signal, flushing...");
                            self.flush_buffer_to_shared();
                            break;
                        }
                    }
                }
                _ = fast_flush_ticker.tick() => {
                    self.flush_buffer_to_shared();
                }
                else => {
                    warn!("View tracker channel closed unexpectedly, flushing...");
                    self.flush_buffer_to_shared();
                    break;
                }
            }
        }
    }

    /// Move Layer 1 into Layer 2. Fast and non-blocking.
    fn flush_buffer_to_shared(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        for (business_id, events) in self.buffer.drain() {
            self.shared_buffer
                .entry(business_id)
                .and_modify(|existing| existing.extend(events.clone()))
                .or_insert(events);
        }
    }
}

/// Buffered view-event ingestion.
pub struct ViewTracker {
    actor_tx: mpsc::Sender<ActorMessage>,
    shared_buffer: Arc<DashMap<i64, Vec<NewViewEvent>>>,
    shutdown: Arc<Mutex<bool>>,
    actor_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ViewTracker {
    pub fn new_with_config(buffer_size: usize, fast_flush_interval_ms: u64) -> Self {
        let (actor_tx, actor_rx) = mpsc::channel(buffer_size);
        let shared_buffer = Arc::new(DashMap::new());

        let actor = TrackerActor {
            receiver: actor_rx,
            buffer: HashMap::new(),
            shared_buffer: Arc::clone(&shared_buffer),
            fast_flush_interval: Duration::from_millis(fast_flush_interval_ms),
        };

        let actor_handle = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_tx,
            shared_buffer,
            shutdown: Arc::new(Mutex::new(false)),
            actor_handle: Mutex::new(Some(actor_handle)),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new_with_config(config.buffer_size, config.fast_flush_interval_ms)
    }

    /// Record one page view. Hot-path method: lock-free send, and if the
    /// channel is full the event is dropped with a warning rather than
    /// stalling the request.
    pub fn record(&self, event: NewViewEvent) {
        if self.actor_tx.try_send(ActorMessage::RecordView(event)).is_err() {
            warn!("View tracker buffer full, dropping event");
        }
    }

    /// Drain all buffered events from the shared buffer.
    pub fn drain_events(&self) -> Vec<NewViewEvent> {
        let mut result = Vec::new();

        let keys: Vec<i64> = self
            .shared_buffer
            .iter()
            .map(|entry| *entry.key())
            .collect();

        for key in keys {
            if let Some((_, mut events)) = self.shared_buffer.remove(&key) {
                result.append(&mut events);
            }
        }

        result
    }

    /// Spawn the background task that writes buffered views to storage.
    pub fn start_flush_task(
        &self,
        flush_interval_secs: u64,
        storage: Arc<dyn Storage>,
    ) -> tokio::task::JoinHandle<()> {
        let shared_buffer = Arc::clone(&self.shared_buffer);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(flush_interval_secs));

            loop {
                interval.tick().await;

                let shutting_down = *shutdown.lock().await;

                let events = drain_shared(&shared_buffer);
                if !events.is_empty() {
                    debug!("Flushing {} buffered view events", events.len());
                    if let Err(e) = storage.insert_view_logs(&events).await {
                        warn!("Failed to flush view events, requeueing: {}", e);
                        for event in events {
                            shared_buffer
                                .entry(event.business_id)
                                .or_default()
                                .push(event);
                        }
                    }
                }

                if shutting_down {
                    info!("View tracker flush task shutting down");
                    break;
                }
            }
        })
    }

    /// Signal shutdown: the actor drains its local buffer and the flush
    /// task performs one final write before stopping.
    ///
    /// Waits for the actor to finish before raising the flush-task flag,
    /// so the final flush is guaranteed to see the actor's drained events.
    pub async fn shutdown(&self) {
        let _ = self.actor_tx.send(ActorMessage::Shutdown).await;
        if let Some(handle) = self.actor_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("View tracker actor task failed during shutdown: {}", e);
            }
        }
        let mut shutdown = self.shutdown.lock().await;
        *shutdown = true;
    }

    /// Number of businesses with buffered events awaiting flush.
    pub fn pending_buffers(&self) -> usize {
        self.shared_buffer.len()
    }
}

fn drain_shared(shared_buffer: &DashMap<i64, Vec<NewViewEvent>>) -> Vec<NewViewEvent> {
    let keys: Vec<i64> = shared_buffer.iter().map(|entry| *entry.key()).collect();

    let mut events = Vec::new();
    for key in keys {
        if let Some((_, mut buffered)) = shared_buffer.remove(&key) {
            events.append(&mut buffered);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::Platform;
    use chrono::Utc;
    use tokio::time::sleep;

    fn event(business_id: i64) -> NewViewEvent {
        NewViewEvent {
            business_id,
            viewed_at: Utc::now(),
            platform: Platform::Web,
            visitor_ip: Some("203.0.113.9".to_string()),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_record_reaches_shared_buffer() {
        let tracker = ViewTracker::new_with_config(1000, 20);

        tracker.record(event(1));
        tracker.record(event(1));
        tracker.record(event(2));

        // Wait out a couple of fast-flush ticks.
        sleep(Duration::from_millis(200)).await;

        let events = tracker.drain_events();
        assert_eq!(events.len(), 3);
        assert_eq!(tracker.pending_buffers(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_local_buffer() {
        let tracker = ViewTracker::new_with_config(1000, 60_000);

        tracker.record(event(7));
        tracker.shutdown().await;

        // shutdown() waits for the actor, so the Layer 1 events must be in
        // the shared buffer the moment it returns. No grace sleep.
        let events = tracker.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].business_id, 7);
    }

    #[tokio::test]
    async fn test_final_flush_sees_events_recorded_just_before_shutdown() {
        let tracker = ViewTracker::new_with_config(1000, 60_000);

        // Long fast-flush interval: only the shutdown drain can move these.
        tracker.record(event(1));
        tracker.record(event(2));
        tracker.record(event(2));
        tracker.shutdown().await;

        // A flush that observes the shutdown flag after this point drains
        // everything; nothing is stranded in Layer 1.
        let events = tracker.drain_events();
        assert_eq!(events.len(), 3);
        assert_eq!(tracker.pending_buffers(), 0);
    }
}
