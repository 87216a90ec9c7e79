//! Event stream client.
//!
//! Keeps one logical connection to `{base}/notifications/stream` open:
//! - exponential-backoff reconnection after failures
//! - heartbeat timeout (any message counts as liveness)
//! - resumption via the last seen event id
//!
//! Every session and every reconnect timer captures the client's generation
//! number. `disconnect()` and each new session bump it, so a timer or task that
//! wakes up late finds a different generation and does nothing.
//!
//! Forwarded events carry the cursor epoch. `reset_cursor()` bumps it, so
//! events still buffered for the receiver from before the reset are dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::backoff::Backoff;
use super::sse::{SseDecoder, SseFrame};
use super::status::ConnectionStatus;
use super::transport::{ByteStream, StreamRequest, StreamTransport};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::event::{CHANGE_DETECTED_TYPE, CONNECTED_TYPE, NotificationEvent, StreamPayload};
use crate::utils::url::endpoint;

/// Stream event names decoded as notification payloads.
const PAYLOAD_EVENTS: &[&str] = &[super::sse::DEFAULT_EVENT, CHANGE_DETECTED_TYPE];

/// Receiving half of the client's domain event channel.
pub struct EventReceiver {
    rx: mpsc::Receiver<(u64, NotificationEvent)>,
    epoch: Arc<AtomicU64>,
}

impl EventReceiver {
    /// Receive the next domain event. Returns `None` once the client is dropped.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        loop {
            let (epoch, event) = self.rx.recv().await?;
            if let Some(event) = self.accept(epoch, event) {
                return Some(event);
            }
        }
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<NotificationEvent> {
        loop {
            let (epoch, event) = self.rx.try_recv().ok()?;
            if let Some(event) = self.accept(epoch, event) {
                return Some(event);
            }
        }
    }

    fn accept(&self, epoch: u64, event: NotificationEvent) -> Option<NotificationEvent> {
        if epoch == self.epoch.load(Ordering::Acquire) {
            Some(event)
        } else {
            trace!(id = %event.id, "Dropping event buffered before cursor reset");
            None
        }
    }
}

impl Stream for EventReceiver {
    type Item = NotificationEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some((epoch, event))) => {
                    if let Some(event) = this.accept(epoch, event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Why a session stopped.
enum SessionEnd {
    Failed(Error),
    ConsumerGone,
}

struct ClientState {
    token: String,
    last_event_id: Option<String>,
    /// Set by `disconnect()`; suppresses automatic reconnection.
    closed: bool,
    connected: bool,
    attempt: u32,
    generation: u64,
    session: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct ClientShared {
    stream_url: Url,
    config: StreamConfig,
    backoff: Backoff,
    transport: Arc<dyn StreamTransport>,
    state: Mutex<ClientState>,
    event_tx: mpsc::Sender<(u64, NotificationEvent)>,
    epoch: Arc<AtomicU64>,
    status_tx: watch::Sender<ConnectionStatus>,
}

/// Closes the connection once the last client handle is dropped.
struct CloseOnDrop(Arc<ClientShared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Handle to the event stream connection. Cloning shares the connection.
#[derive(Clone)]
pub struct EventStreamClient {
    shared: Arc<ClientShared>,
    _close: Arc<CloseOnDrop>,
}

impl EventStreamClient {
    /// Create a disconnected client.
    ///
    /// Domain events are delivered through the returned [`EventReceiver`];
    /// connection changes through [`status`](Self::status).
    pub fn new(
        config: StreamConfig,
        token: impl Into<String>,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<(Self, EventReceiver)> {
        config.validate()?;
        let stream_url = endpoint(&config.base()?, &["notifications", "stream"])?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let epoch = Arc::new(AtomicU64::new(0));

        let shared = Arc::new(ClientShared {
            stream_url,
            backoff: Backoff::from_config(&config),
            config,
            transport,
            state: Mutex::new(ClientState {
                token: token.into(),
                last_event_id: None,
                closed: false,
                connected: false,
                attempt: 0,
                generation: 0,
                session: None,
                reconnect: None,
            }),
            event_tx,
            epoch: Arc::clone(&epoch),
            status_tx,
        });

        let client = Self {
            _close: Arc::new(CloseOnDrop(Arc::clone(&shared))),
            shared,
        };
        Ok((client, EventReceiver { rx: event_rx, epoch }))
    }

    /// Open the stream. A second call while a session is active is a no-op.
    pub fn connect(&self) {
        let mut state = self.shared.state.lock();
        if state.session.is_some() {
            warn!("Event stream already connected, ignoring connect()");
            return;
        }
        state.closed = false;
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }
        self.shared.start_session(&mut state);
    }

    /// Close the stream and stop reconnecting. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shared.close();
    }

    /// Forget the resumption cursor and drop events the receiver has not
    /// taken yet. The next session starts without `lastEventId`.
    pub fn reset_cursor(&self) {
        let mut state = self.shared.state.lock();
        state.last_event_id = None;
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        debug!("Event stream cursor reset");
    }

    /// Replace the bearer token, re-authenticating an active session.
    pub fn update_token(&self, token: impl Into<String>) {
        let token = token.into();
        let reconnect = {
            let mut state = self.shared.state.lock();
            if state.token == token {
                return;
            }
            state.token = token;
            state.session.is_some()
        };

        if reconnect {
            info!("Token changed, re-authenticating event stream");
            self.disconnect();
            self.connect();
        }
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    /// Watch connection status changes.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.state.lock().attempt
    }

    /// Current resumption cursor.
    pub fn last_event_id(&self) -> Option<String> {
        self.shared.state.lock().last_event_id.clone()
    }
}

impl ClientShared {
    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.generation = state.generation.wrapping_add(1);
        if let Some(session) = state.session.take() {
            session.abort();
        }
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }
        if std::mem::replace(&mut state.connected, false) {
            info!(url = %self.stream_url, "Event stream disconnected");
        }
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Spawn a session for a fresh generation. Caller holds the state lock.
    fn start_session(self: &Arc<Self>, state: &mut ClientState) {
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let request = StreamRequest::new(
            &self.stream_url,
            &state.token,
            state.last_event_id.as_deref(),
        );

        self.status_tx.send_replace(ConnectionStatus::Connecting {
            attempt: state.attempt,
        });
        info!(
            url = %self.stream_url,
            attempt = state.attempt,
            resume_from = ?state.last_event_id,
            "Event stream connecting"
        );

        let shared = Arc::clone(self);
        state.session = Some(tokio::spawn(async move {
            shared.run_session(generation, request).await;
        }));
    }

    async fn run_session(self: Arc<Self>, generation: u64, request: StreamRequest) {
        let connect_timeout = self.config.connect_timeout_duration();
        let opened = match timeout(connect_timeout, self.transport.open(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectTimeout(connect_timeout)),
        };

        let end = match opened {
            Ok(body) => {
                if !self.on_open(generation) {
                    return;
                }
                self.read_events(generation, body).await
            }
            Err(e) => SessionEnd::Failed(e),
        };

        self.on_session_end(generation, end);
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.attempt = 0;
        state.connected = true;
        self.status_tx.send_replace(ConnectionStatus::Connected);
        info!(url = %self.stream_url, "Event stream connected");
        true
    }

    async fn read_events(&self, generation: u64, mut body: ByteStream) -> SessionEnd {
        let heartbeat_timeout = self.config.heartbeat_timeout_duration();
        let heartbeat = sleep(heartbeat_timeout);
        tokio::pin!(heartbeat);
        let mut decoder = SseDecoder::new();

        loop {
            tokio::select! {
                _ = &mut heartbeat => {
                    return SessionEnd::Failed(Error::HeartbeatTimeout(heartbeat_timeout));
                }

                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            for frame in decoder.feed(&bytes) {
                                heartbeat.as_mut().reset(Instant::now() + heartbeat_timeout);
                                if !self.handle_frame(generation, frame).await {
                                    return SessionEnd::ConsumerGone;
                                }
                            }
                        }
                        Some(Err(e)) => return SessionEnd::Failed(e),
                        None => return SessionEnd::Failed(Error::StreamEnded),
                    }
                }
            }
        }
    }

    /// Process one frame. Returns `false` once the event receiver is gone.
    async fn handle_frame(&self, generation: u64, frame: SseFrame) -> bool {
        if let Some(id) = frame.id {
            let mut state = self.state.lock();
            if state.generation != generation {
                return true;
            }
            state.last_event_id = Some(id);
        }

        if frame.event == CONNECTED_TYPE {
            debug!("Event stream acknowledged by server");
            return true;
        }
        if !PAYLOAD_EVENTS.contains(&frame.event.as_str()) {
            trace!(event = %frame.event, "Ignoring unhandled stream event");
            return true;
        }

        match StreamPayload::decode(&frame.data) {
            Ok(StreamPayload::Control(kind)) => {
                trace!(?kind, "Control message received");
                true
            }
            Ok(StreamPayload::Event(event)) => {
                let epoch = self.epoch.load(Ordering::Acquire);
                if !self.is_current(generation) {
                    return true;
                }
                debug!(id = %event.id, entity_id = %event.entity_id, "Notification received");
                self.event_tx.send((epoch, event)).await.is_ok()
            }
            Err(e) => {
                warn!(error = %e, event = %frame.event, "Dropping malformed stream message");
                true
            }
        }
    }

    fn on_session_end(self: &Arc<Self>, generation: u64, end: SessionEnd) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation, "Stale session ended, ignoring");
            return;
        }
        state.session = None;
        state.connected = false;

        match end {
            SessionEnd::ConsumerGone => {
                info!("Notification consumer dropped, closing event stream");
                state.closed = true;
                self.status_tx.send_replace(ConnectionStatus::Disconnected);
            }
            SessionEnd::Failed(error) => {
                warn!(url = %self.stream_url, error = %error, "Event stream lost");
                if state.closed {
                    self.status_tx.send_replace(ConnectionStatus::Disconnected);
                } else {
                    self.schedule_reconnect(&mut state, error.to_string());
                }
            }
        }
    }

    /// Arm the reconnect timer unless one is already pending.
    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState, reason: String) {
        if state.reconnect.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }

        let delay = self.backoff.delay(state.attempt);
        state.attempt = state.attempt.saturating_add(1);
        let generation = state.generation;

        warn!(
            attempt = state.attempt,
            delay_ms = delay.as_millis() as u64,
            "Event stream reconnecting after backoff"
        );
        self.status_tx.send_replace(ConnectionStatus::Reconnecting {
            attempt: state.attempt,
            delay,
            reason,
        });

        let shared = Arc::clone(self);
        state.reconnect = Some(tokio::spawn(async move {
            sleep(delay).await;
            shared.on_reconnect_due(generation);
        }));
    }

    fn on_reconnect_due(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation || state.closed {
            debug!(generation, "Stale reconnect timer fired, ignoring");
            return;
        }
        state.reconnect = None;
        self.start_session(&mut state);
    }
}
