//! The session fan-out hub.
//!
//! Tracks every live connection, routes conversation events to interested
//! sessions, and enforces per-connection backpressure. Each connection owns
//! a bounded outbound queue the hub can reach into: on overflow the oldest
//! droppable frame is evicted (for a `new_message` event, the oldest
//! `new_message` of the same conversation) so fresh state still gets
//! through, a `lag` event tells the client frames were lost, and a
//! connection that stays saturated too long is closed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use orchestrator::{ConversationEvent, EventPublisher};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::protocol::{EventPayload, ServerFrame};

/// Outbound frames buffered per connection before eviction kicks in.
const OUTBOUND_BUFFER: usize = 256;
/// A connection saturated longer than this is closed.
const SATURATION_LIMIT: Duration = Duration::from_secs(30);
/// Width of the "recent" metrics window.
const METRICS_WINDOW_MINUTES: u64 = 15;

/// A frame plus the routing facts eviction decisions need. Frames without
/// an event name (responses, errors) are critical and never evicted.
struct QueuedFrame {
    frame: ServerFrame,
    event_name: Option<&'static str>,
    conversation_id: Option<String>,
}

impl QueuedFrame {
    fn droppable(&self) -> bool {
        self.event_name.is_some()
    }
}

/// Single-consumer outbound queue with targeted eviction.
struct Outbound {
    queue: StdMutex<VecDeque<QueuedFrame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Outbound {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: StdMutex::new(VecDeque::with_capacity(OUTBOUND_BUFFER)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// The session task's end of the outbound queue.
pub struct OutboundReceiver {
    outbound: Arc<Outbound>,
}

impl OutboundReceiver {
    /// Next frame; `None` once the hub has dropped the connection and the
    /// queue has drained.
    pub async fn recv(&self) -> Option<ServerFrame> {
        loop {
            // Register interest before checking, so a push between the
            // check and the await still wakes us.
            let notified = self.outbound.notify.notified();
            if let Some(frame) = self.try_recv() {
                return Some(frame);
            }
            if self.outbound.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Non-blocking variant, for tests.
    pub fn try_recv(&self) -> Option<ServerFrame> {
        self.outbound
            .queue
            .lock()
            .expect("outbound queue poisoned")
            .pop_front()
            .map(|q| q.frame)
    }
}

struct ClientHandle {
    outbound: Arc<Outbound>,
    user_id: Option<String>,
    authenticated: bool,
    /// Conversations this session has referenced; it receives their events.
    watched: HashSet<String>,
    saturated_since: Option<Instant>,
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.outbound.close();
    }
}

/// Per-minute counter over a sliding window.
struct RollingCount {
    started: Instant,
    buckets: StdMutex<VecDeque<(u64, u64)>>,
}

impl RollingCount {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            buckets: StdMutex::new(VecDeque::new()),
        }
    }

    fn minute(&self) -> u64 {
        self.started.elapsed().as_secs() / 60
    }

    fn record(&self) {
        let now = self.minute();
        let mut buckets = self.buckets.lock().expect("metrics poisoned");
        prune(&mut buckets, now);
        match buckets.back_mut() {
            Some((minute, count)) if *minute == now => *count += 1,
            _ => buckets.push_back((now, 1)),
        }
    }

    /// Total over the last [`METRICS_WINDOW_MINUTES`].
    fn recent(&self) -> u64 {
        let now = self.minute();
        let mut buckets = self.buckets.lock().expect("metrics poisoned");
        prune(&mut buckets, now);
        buckets.iter().map(|(_, count)| count).sum()
    }
}

fn prune(buckets: &mut VecDeque<(u64, u64)>, now: u64) {
    let oldest = now.saturating_sub(METRICS_WINDOW_MINUTES - 1);
    while buckets.front().is_some_and(|(minute, _)| *minute < oldest) {
        buckets.pop_front();
    }
}

/// Registry of live sessions plus windowed counters for the dashboard.
pub struct Hub {
    clients: Mutex<HashMap<String, ClientHandle>>,
    events: RollingCount,
    errors: RollingCount,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            events: RollingCount::new(),
            errors: RollingCount::new(),
        }
    }

    /// Register a session; returns the receiver its writer task drains.
    pub async fn register(
        &self,
        client_id: &str,
        user_id: Option<String>,
        authenticated: bool,
    ) -> OutboundReceiver {
        let outbound = Outbound::new();
        let handle = ClientHandle {
            outbound: outbound.clone(),
            user_id,
            authenticated,
            watched: HashSet::new(),
            saturated_since: None,
        };
        self.clients.lock().await.insert(client_id.to_string(), handle);
        debug!(client = %client_id, "session registered");
        OutboundReceiver { outbound }
    }

    /// Drop a session.
    pub async fn unregister(&self, client_id: &str) {
        self.clients.lock().await.remove(client_id);
        debug!(client = %client_id, "session unregistered");
    }

    /// Record that a session referenced a conversation; it is from now on
    /// implicitly subscribed to that conversation's events.
    pub async fn watch_conversation(&self, client_id: &str, conversation_id: &str) {
        if let Some(handle) = self.clients.lock().await.get_mut(client_id) {
            handle.watched.insert(conversation_id.to_string());
        }
    }

    /// Send a frame to one session (responses, errors). These are critical
    /// and never evicted; a saturated session is closed instead.
    pub async fn send_to(&self, client_id: &str, frame: ServerFrame) {
        if matches!(frame, ServerFrame::Error { .. }) {
            self.errors.record();
        }
        let mut clients = self.clients.lock().await;
        if let Some(handle) = clients.get_mut(client_id) {
            Self::offer(
                client_id,
                handle,
                QueuedFrame {
                    frame,
                    event_name: None,
                    conversation_id: None,
                },
            );
            if Self::should_drop(handle) {
                clients.remove(client_id);
            }
        }
    }

    /// Current number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Events published over the recent window.
    pub fn events_recent(&self) -> u64 {
        self.events.recent()
    }

    /// Error frames emitted over the recent window.
    pub fn errors_recent(&self) -> u64 {
        self.errors.recent()
    }

    /// Count an error frame a session wrote directly to its socket.
    pub fn record_error(&self) {
        self.errors.record();
    }

    /// Enqueue a frame, evicting an older one on overflow.
    fn offer(client_id: &str, handle: &mut ClientHandle, incoming: QueuedFrame) {
        let mut queue = handle
            .outbound
            .queue
            .lock()
            .expect("outbound queue poisoned");

        if queue.len() < OUTBOUND_BUFFER {
            queue.push_back(incoming);
            handle.saturated_since = None;
            handle.outbound.notify.notify_one();
            return;
        }

        // Overflow. Evict the oldest new_message of the same conversation
        // when the incoming frame supersedes it, otherwise the oldest
        // droppable frame of any kind.
        let transitioned = handle.saturated_since.is_none();
        if transitioned {
            handle.saturated_since = Some(Instant::now());
            warn!(client = %client_id, "outbound buffer full; evicting stale frames");
        }

        let same_conversation = |q: &QueuedFrame| {
            q.event_name == Some("new_message")
                && incoming.event_name == Some("new_message")
                && q.conversation_id == incoming.conversation_id
        };
        let victim = queue
            .iter()
            .position(same_conversation)
            .or_else(|| queue.iter().position(QueuedFrame::droppable));

        match victim {
            Some(index) => {
                let _ = queue.remove(index);
                queue.push_back(incoming);
            }
            // Only critical frames queued; the incoming frame is lost and
            // the saturation clock decides the session's fate.
            None => return,
        }

        if transitioned {
            // Make the loss visible to the client, at the cost of one more
            // stale frame.
            if queue.len() >= OUTBOUND_BUFFER {
                if let Some(index) = queue.iter().position(QueuedFrame::droppable) {
                    let _ = queue.remove(index);
                }
            }
            if queue.len() < OUTBOUND_BUFFER {
                queue.push_back(QueuedFrame {
                    frame: ServerFrame::Event {
                        id: uuid::Uuid::new_v4().to_string(),
                        payload: EventPayload {
                            event_type: "lag".to_string(),
                            data: serde_json::json!({ "dropped": true }),
                        },
                    },
                    event_name: Some("lag"),
                    conversation_id: None,
                });
            }
        }

        handle.outbound.notify.notify_one();
    }

    fn should_drop(handle: &ClientHandle) -> bool {
        handle
            .saturated_since
            .is_some_and(|since| since.elapsed() >= SATURATION_LIMIT)
    }

    /// Whether a session should receive an event.
    fn is_interested(handle: &ClientHandle, event: &ConversationEvent) -> bool {
        if let Some(conversation_id) = event.conversation_id() {
            if handle.watched.contains(conversation_id) {
                return true;
            }
        }
        if let (Some(event_user), Some(session_user)) = (event.user_id(), &handle.user_id) {
            if event_user == session_user {
                return true;
            }
        }
        // Operator sessions see the whole stream.
        handle.authenticated
    }
}

#[async_trait]
impl EventPublisher for Hub {
    async fn publish(&self, event: ConversationEvent) {
        self.events.record();

        let event_id = uuid::Uuid::new_v4().to_string();
        let data = match serde_json::to_value(&event) {
            Ok(serde_json::Value::Object(map)) => {
                map.get("data").cloned().unwrap_or_default()
            }
            _ => serde_json::Value::Null,
        };
        let name = event.name();
        let conversation_id = event.conversation_id().map(str::to_string);

        let mut clients = self.clients.lock().await;
        let mut doomed = Vec::new();

        for (client_id, handle) in clients.iter_mut() {
            if !Self::is_interested(handle, &event) {
                continue;
            }
            Self::offer(
                client_id,
                handle,
                QueuedFrame {
                    frame: ServerFrame::Event {
                        id: event_id.clone(),
                        payload: EventPayload {
                            event_type: name.to_string(),
                            data: data.clone(),
                        },
                    },
                    event_name: Some(name),
                    conversation_id: conversation_id.clone(),
                },
            );
            if Self::should_drop(handle) {
                doomed.push(client_id.clone());
            }
        }

        for client_id in doomed {
            warn!(client = %client_id, "closing saturated session");
            clients.remove(&client_id);
        }
    }
}
