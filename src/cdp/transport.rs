use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::error::CdpError;
use super::types::{Event, FrameKind, InboundFrame, OutboundFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Per-subscription event buffer capacity. When a subscriber falls this far
/// behind, the oldest buffered event is discarded and its drop counter
/// increments; delivery never blocks the reader.
pub const EVENT_BUFFER: usize = 256;

/// Shared map from target id to attached session id. The transport task
/// removes entries when it observes `Target.detachedFromTarget`; the client
/// inserts at most once per target per connection.
pub type SessionTable = Arc<std::sync::Mutex<HashMap<String, String>>>;

/// Command sent from a client handle to the transport task.
pub enum TransportCommand {
    /// Write a frame and deliver the matching response via the oneshot.
    Send {
        frame: OutboundFrame,
        response_tx: oneshot::Sender<Result<serde_json::Value, CdpError>>,
        deadline: Instant,
    },
    /// Register interest in events on (session, method).
    Subscribe {
        session_id: Option<String>,
        method: String,
        reply_tx: oneshot::Sender<(u64, broadcast::Receiver<Event>)>,
    },
    /// Remove a subscription by id.
    Unsubscribe { id: u64 },
    /// Close the socket and drain everything.
    Shutdown,
}

/// One unresolved command awaiting its response frame.
struct PendingRequest {
    response_tx: oneshot::Sender<Result<serde_json::Value, CdpError>>,
    method: String,
    deadline: Instant,
}

/// A registered event subscription inside the transport task.
struct Subscription {
    id: u64,
    session_id: Option<String>,
    /// Exact event name, or a prefix when it ends with `*`
    /// (e.g. `Network.*`).
    method: String,
    tx: broadcast::Sender<Event>,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        if self.session_id != event.session_id {
            return false;
        }
        match self.method.strip_suffix('*') {
            Some(prefix) => event.method.starts_with(prefix),
            None => self.method == event.method,
        }
    }
}

/// Clonable handle for talking to the transport task.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    command_tx: mpsc::Sender<TransportCommand>,
    connected: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl TransportHandle {
    /// Forward a command to the background task.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has exited.
    pub async fn send(&self, cmd: TransportCommand) -> Result<(), CdpError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| CdpError::Internal("transport task is not running".into()))
    }

    /// Non-blocking variant used from `Drop` impls.
    pub fn send_nowait(&self, cmd: TransportCommand) {
        let _ = self.command_tx.try_send(cmd);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Allocate the next message id. Monotonic per connection, never reused.
    pub fn next_message_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Dial the WebSocket and spawn the transport task.
///
/// # Errors
///
/// Returns `CdpError::ConnectFailed` if the WebSocket handshake fails or
/// exceeds `connect_timeout`.
pub async fn spawn_transport(
    url: &str,
    channel_capacity: usize,
    connect_timeout: Duration,
    sessions: SessionTable,
) -> Result<TransportHandle, CdpError> {
    let ws_stream = connect_ws(url, connect_timeout).await?;
    let connected = Arc::new(AtomicBool::new(true));
    let next_id = Arc::new(AtomicU64::new(1));
    let (command_tx, command_rx) = mpsc::channel(channel_capacity);

    let handle = TransportHandle {
        command_tx,
        connected: Arc::clone(&connected),
        next_id,
    };

    tokio::spawn(async move {
        let mut task = TransportTask {
            ws_stream,
            command_rx,
            pending: HashMap::new(),
            subscriptions: Vec::new(),
            next_subscription_id: 1,
            connected,
            sessions,
            lost: None,
        };
        task.run().await;
    });

    Ok(handle)
}

async fn connect_ws(url: &str, timeout: Duration) -> Result<WsStream, CdpError> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(CdpError::ConnectFailed(e.to_string())),
        Err(_) => Err(CdpError::ConnectFailed(format!(
            "WebSocket dial to {url} timed out"
        ))),
    }
}

/// The background task that owns the WebSocket. The select loop is both the
/// sole reader of the socket and the single point through which writes are
/// serialized.
struct TransportTask {
    ws_stream: WsStream,
    command_rx: mpsc::Receiver<TransportCommand>,
    pending: HashMap<u64, PendingRequest>,
    subscriptions: Vec<Subscription>,
    next_subscription_id: u64,
    connected: Arc<AtomicBool>,
    sessions: SessionTable,
    /// Set once the connection has failed; every later Send is answered
    /// immediately with `TransportLost` carrying this message.
    lost: Option<String>,
}

impl TransportTask {
    async fn run(&mut self) {
        loop {
            // Once the connection is lost, serve commands with immediate
            // errors until the handle side goes away.
            if let Some(ref reason) = self.lost {
                match self.command_rx.recv().await {
                    Some(TransportCommand::Send { response_tx, .. }) => {
                        let _ = response_tx.send(Err(CdpError::TransportLost(reason.clone())));
                    }
                    Some(TransportCommand::Subscribe { reply_tx, .. }) => {
                        // Hand back an already-closed receiver.
                        let (tx, rx) = broadcast::channel(1);
                        drop(tx);
                        let _ = reply_tx.send((0, rx));
                    }
                    Some(TransportCommand::Unsubscribe { .. }) => {}
                    Some(TransportCommand::Shutdown) | None => return,
                }
                continue;
            }

            let next_deadline = self.earliest_deadline();
            let timeout_sleep = async {
                if let Some(deadline) = next_deadline {
                    tokio::time::sleep_until(deadline).await;
                } else {
                    std::future::pending::<()>().await;
                }
            };

            tokio::select! {
                ws_msg = self.ws_stream.next() => {
                    match ws_msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_frame(&text);
                        }
                        Some(Ok(Message::Close(_))) => {
                            self.fail("browser closed the connection".into());
                        }
                        Some(Err(e)) => {
                            self.fail(format!("WebSocket read error: {e}"));
                        }
                        None => {
                            self.fail("WebSocket stream ended".into());
                        }
                        Some(Ok(_)) => {
                            // Binary, Ping, Pong, Frame — ignore
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(TransportCommand::Send { frame, response_tx, deadline }) => {
                            self.handle_send(frame, response_tx, deadline).await;
                        }
                        Some(TransportCommand::Subscribe { session_id, method, reply_tx }) => {
                            self.handle_subscribe(session_id, method, reply_tx);
                        }
                        Some(TransportCommand::Unsubscribe { id }) => {
                            self.subscriptions.retain(|s| s.id != id);
                        }
                        Some(TransportCommand::Shutdown) | None => {
                            self.drain_pending("connection closed");
                            self.subscriptions.clear();
                            let _ = self.ws_stream.close(None).await;
                            self.connected.store(false, Ordering::Relaxed);
                            return;
                        }
                    }
                }

                () = timeout_sleep => {
                    self.sweep_deadlines();
                }
            }
        }
    }

    fn handle_text_frame(&mut self, text: &str) {
        let raw: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("dropping unparseable frame: {e}");
                return;
            }
        };

        let Some(kind) = raw.classify() else {
            tracing::debug!("dropping unclassifiable frame");
            return;
        };

        match kind {
            FrameKind::Response(response) => {
                // A pending entry removed by a deadline sweep leaves a late
                // response with no sink; it is discarded here.
                if let Some(pending) = self.pending.remove(&response.id) {
                    let result = match response.result {
                        Ok(value) => Ok(value),
                        Err(proto) => Err(CdpError::Protocol {
                            code: proto.code,
                            message: proto.message,
                        }),
                    };
                    let _ = pending.response_tx.send(result);
                }
            }
            FrameKind::Event(event) => {
                self.track_session_lifecycle(&event);
                self.dispatch_event(&event);
            }
        }
    }

    /// Maintain the session table from browser-scoped attach/detach events.
    /// These are routed through the same reader loop, so the table is
    /// updated before any subsequent event for that session is dispatched.
    fn track_session_lifecycle(&self, event: &Event) {
        match event.method.as_str() {
            "Target.attachedToTarget" => {
                let target = event.params["targetInfo"]["targetId"].as_str();
                let session = event.params["sessionId"].as_str();
                if let (Some(target), Some(session)) = (target, session) {
                    if let Ok(mut table) = self.sessions.lock() {
                        table
                            .entry(target.to_owned())
                            .or_insert_with(|| session.to_owned());
                    }
                }
            }
            "Target.detachedFromTarget" => {
                if let Some(session) = event.params["sessionId"].as_str() {
                    if let Ok(mut table) = self.sessions.lock() {
                        table.retain(|_, s| s != session);
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch_event(&mut self, event: &Event) {
        // broadcast::send never blocks; a full buffer evicts the oldest
        // entry and the receiver side counts it as dropped.
        self.subscriptions
            .retain(|sub| !sub.matches(event) || sub.tx.send(event.clone()).is_ok());
    }

    fn handle_subscribe(
        &mut self,
        session_id: Option<String>,
        method: String,
        reply_tx: oneshot::Sender<(u64, broadcast::Receiver<Event>)>,
    ) {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        let (tx, rx) = broadcast::channel(EVENT_BUFFER);
        if reply_tx.send((id, rx)).is_ok() {
            self.subscriptions.push(Subscription {
                id,
                session_id,
                method,
                tx,
            });
        }
    }

    async fn handle_send(
        &mut self,
        frame: OutboundFrame,
        response_tx: oneshot::Sender<Result<serde_json::Value, CdpError>>,
        deadline: Instant,
    ) {
        let id = frame.id;
        let method = frame.method.clone();

        let json = match serde_json::to_string(&frame) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(CdpError::Internal(format!(
                    "frame serialization error: {e}"
                ))));
                return;
            }
        };

        if let Err(e) = self.ws_stream.send(Message::Text(json.into())).await {
            let reason = format!("WebSocket write error: {e}");
            let _ = response_tx.send(Err(CdpError::TransportLost(reason.clone())));
            self.fail(reason);
            return;
        }

        self.pending.insert(
            id,
            PendingRequest {
                response_tx,
                method,
                deadline,
            },
        );
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    fn sweep_deadlines(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(&id, _)| id)
            .collect();

        for id in expired {
            if let Some(pending) = self.pending.remove(&id) {
                let _ = pending.response_tx.send(Err(CdpError::timeout(format!(
                    "response to {}",
                    pending.method
                ))));
            }
        }
    }

    fn drain_pending(&mut self, reason: &str) {
        let pending = std::mem::take(&mut self.pending);
        for (_, req) in pending {
            let _ = req
                .response_tx
                .send(Err(CdpError::TransportLost(reason.to_owned())));
        }
    }

    /// Transition into the permanently-lost state: fail every pending
    /// request, close every subscription stream, mark the handle
    /// disconnected.
    fn fail(&mut self, reason: String) {
        tracing::debug!("transport lost: {reason}");
        self.connected.store(false, Ordering::Relaxed);
        self.drain_pending(&reason);
        self.subscriptions.clear();
        self.lost = Some(reason);
    }
}

/// A live event subscription: the receiving half of a bounded buffer plus
/// the stop handle that deregisters it.
///
/// Dropping the stream also deregisters it (best-effort), so events stop
/// flowing on every exit path.
#[derive(Debug)]
pub struct EventStream {
    id: u64,
    rx: broadcast::Receiver<Event>,
    handle: TransportHandle,
    dropped: u64,
    stopped: bool,
}

impl EventStream {
    pub(crate) fn new(id: u64, rx: broadcast::Receiver<Event>, handle: TransportHandle) -> Self {
        Self {
            id,
            rx,
            handle,
            dropped: 0,
            stopped: false,
        }
    }

    /// Receive the next event, in browser-delivery order. Returns `None`
    /// once the subscription is closed (stop, connection loss, or client
    /// close). Overflow evicts the oldest buffered events; the eviction
    /// count accumulates in [`dropped`](Self::dropped).
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive used to drain already-buffered events.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(_) => return None,
            }
        }
    }

    /// Number of events discarded because this subscriber's buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Deregister the subscription. Idempotent; further `recv` calls return
    /// buffered events and then `None`.
    pub async fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            let _ = self
                .handle
                .send(TransportCommand::Unsubscribe { id: self.id })
                .await;
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.stopped {
            self.handle
                .send_nowait(TransportCommand::Unsubscribe { id: self.id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(method: &str, session: Option<&str>) -> Event {
        Event {
            method: method.into(),
            params: json!({}),
            session_id: session.map(str::to_owned),
        }
    }

    fn subscription(method: &str, session: Option<&str>) -> Subscription {
        let (tx, _rx) = broadcast::channel(4);
        Subscription {
            id: 1,
            session_id: session.map(str::to_owned),
            method: method.into(),
            tx,
        }
    }

    #[test]
    fn exact_method_match() {
        let sub = subscription("Page.loadEventFired", Some("s1"));
        assert!(sub.matches(&event("Page.loadEventFired", Some("s1"))));
        assert!(!sub.matches(&event("Page.frameNavigated", Some("s1"))));
    }

    #[test]
    fn session_mismatch_does_not_match() {
        let sub = subscription("Page.loadEventFired", Some("s1"));
        assert!(!sub.matches(&event("Page.loadEventFired", Some("s2"))));
        assert!(!sub.matches(&event("Page.loadEventFired", None)));
    }

    #[test]
    fn browser_scoped_subscription_matches_browser_events() {
        let sub = subscription("Target.targetCreated", None);
        assert!(sub.matches(&event("Target.targetCreated", None)));
        assert!(!sub.matches(&event("Target.targetCreated", Some("s1"))));
    }

    #[test]
    fn prefix_match_with_star() {
        let sub = subscription("Network.*", Some("s1"));
        assert!(sub.matches(&event("Network.requestWillBeSent", Some("s1"))));
        assert!(sub.matches(&event("Network.responseReceived", Some("s1"))));
        assert!(!sub.matches(&event("Page.loadEventFired", Some("s1"))));
    }

    #[tokio::test]
    async fn event_stream_counts_dropped_events() {
        let (tx, rx) = broadcast::channel(2);
        let (command_tx, _command_rx) = mpsc::channel(4);
        let handle = TransportHandle {
            command_tx,
            connected: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let mut stream = EventStream::new(1, rx, handle);

        for i in 0..5 {
            tx.send(event(&format!("Ev.{i}"), None)).unwrap();
        }
        drop(tx);

        // Capacity 2 means the three oldest events were evicted.
        let first = stream.recv().await.unwrap();
        assert_eq!(first.method, "Ev.3");
        assert_eq!(stream.dropped(), 3);
        assert_eq!(stream.recv().await.unwrap().method, "Ev.4");
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn event_stream_preserves_arrival_order() {
        let (tx, rx) = broadcast::channel(16);
        let (command_tx, _command_rx) = mpsc::channel(4);
        let handle = TransportHandle {
            command_tx,
            connected: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let mut stream = EventStream::new(1, rx, handle);

        for i in 0..8 {
            tx.send(event(&format!("Ev.{i}"), None)).unwrap();
        }
        for i in 0..8 {
            assert_eq!(stream.recv().await.unwrap().method, format!("Ev.{i}"));
        }
        assert_eq!(stream.dropped(), 0);
    }

    #[tokio::test]
    async fn stop_deregisters_subscription() {
        let (tx, rx) = broadcast::channel(4);
        let (command_tx, mut command_rx) = mpsc::channel(4);
        let handle = TransportHandle {
            command_tx,
            connected: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let mut stream = EventStream::new(42, rx, handle);
        stream.stop().await;
        stream.stop().await; // idempotent

        let Some(TransportCommand::Unsubscribe { id }) = command_rx.recv().await else {
            panic!("expected unsubscribe");
        };
        assert_eq!(id, 42);
        // Only one unsubscribe was issued.
        assert!(command_rx.try_recv().is_err());
        drop(tx);
    }
}
