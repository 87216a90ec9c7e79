//! Delivery façade.
//!
//! Wires the [`EventStreamClient`] into the [`NotificationStore`], raises
//! local alerts for fresh notifications and mirrors read state back to the
//! server. This is the surface a UI binds to.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{HttpBackend, NotificationsBackend};
use crate::config::{DeliveryConfig, StreamConfig};
use crate::error::Result;
use crate::event::NotificationEvent;
use crate::store::{
    AddOutcome, Notification, NotificationSettings, NotificationSettingsPatch, NotificationStore,
    NotificationsState,
};
use crate::stream::{ConnectionStatus, EventReceiver, EventStreamClient, HttpTransport};
use crate::utils::http_client::build_client;

/// Request timeout for the REST calls. The stream itself is unbounded.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Local alert surface for newly arrived notifications.
pub trait AlertSink: Send + Sync {
    fn alert(&self, notification: &Notification);
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, notification: &Notification) {
        let event = notification.event();
        info!(
            id = %event.id,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            significant = event.is_significant,
            "{}: {}",
            event.title(),
            event.description()
        );
    }
}

/// Connects the stream client, the store and the server read state.
pub struct NotificationDelivery {
    store: NotificationStore,
    client: EventStreamClient,
    backend: Arc<dyn NotificationsBackend>,
    alerts: Arc<dyn AlertSink>,
    config: DeliveryConfig,
    events: Mutex<Option<EventReceiver>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl NotificationDelivery {
    pub fn new(
        store: NotificationStore,
        client: EventStreamClient,
        events: EventReceiver,
        backend: Arc<dyn NotificationsBackend>,
    ) -> Self {
        Self {
            store,
            client,
            backend,
            alerts: Arc::new(TracingAlertSink),
            config: DeliveryConfig::default(),
            events: Mutex::new(Some(events)),
            pump: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a façade talking to the REST API at `config.base_url`.
    pub fn http(config: StreamConfig, store: NotificationStore, token: &str) -> Result<Self> {
        let base = config.base()?;
        let stream_http = build_client(config.connect_timeout_duration(), Duration::ZERO);
        let api_http = build_client(config.connect_timeout_duration(), API_TIMEOUT);

        let transport = Arc::new(HttpTransport::new(stream_http));
        let (client, events) = EventStreamClient::new(config, token, transport)?;
        let backend = Arc::new(HttpBackend::new(api_http, base, token));
        Ok(Self::new(store, client, events, backend))
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn client(&self) -> &EventStreamClient {
        &self.client
    }

    /// Load recent history, start forwarding events and open the stream.
    ///
    /// A history failure is logged and the stream is opened anyway.
    pub async fn start(&self) {
        if self.config.load_history {
            self.load_history().await;
        }
        self.spawn_pump();
        self.client.connect();
    }

    async fn load_history(&self) {
        match self.backend.history(self.config.history_limit).await {
            Ok(records) => {
                info!(count = records.len(), "Loaded notification history");
                self.store
                    .load_notifications(records.into_iter().map(NotificationEvent::from));
            }
            Err(e) => warn!(error = %e, "Failed to load notification history"),
        }
    }

    fn spawn_pump(&self) {
        let Some(events) = self.events.lock().take() else {
            return;
        };

        let pump = Pump {
            store: self.store.clone(),
            alerts: Arc::clone(&self.alerts),
            status: self.client.status(),
            cancel: self.cancel.clone(),
        };
        *self.pump.lock() = Some(tokio::spawn(pump.run(events)));
    }

    /// Mark one notification read locally, then tell the server.
    pub fn mark_as_read(&self, id: &str) -> bool {
        let changed = self.store.mark_as_read(id);
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = backend.mark_read(&id).await {
                warn!(id = %id, error = %e, "Failed to sync read state");
            }
        });
        changed
    }

    /// Mark everything read locally, then tell the server.
    pub fn mark_all_as_read(&self) -> usize {
        let changed = self.store.mark_all_as_read();
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.mark_all_read().await {
                warn!(error = %e, "Failed to sync read-all state");
            }
        });
        changed
    }

    pub fn clear_all(&self) {
        self.store.clear_all();
    }

    pub fn update_settings(&self, patch: NotificationSettingsPatch) -> NotificationSettings {
        self.store.update_settings(patch)
    }

    /// Swap the bearer token for both the stream and the REST calls.
    pub fn update_token(&self, token: &str) {
        self.backend.set_token(token);
        self.client.update_token(token);
    }

    /// Close the stream and forget the current user's notifications.
    ///
    /// The resumption cursor is dropped with them, along with any events
    /// the pump has not taken yet.
    pub fn logout(&self) {
        info!("Logging out, closing event stream");
        self.client.disconnect();
        self.client.reset_cursor();
        self.store.clear_all();
        self.store.set_connected(false);
    }

    /// Start streaming for a newly authenticated user.
    pub fn login(&self, token: &str) {
        self.update_token(token);
        self.client.connect();
    }

    /// Close the stream and stop the pump.
    pub async fn shutdown(&self) {
        self.client.disconnect();
        self.cancel.cancel();
        let pump = self.pump.lock().take();
        if let Some(pump) = pump
            && let Err(e) = pump.await
        {
            warn!(error = %e, "Delivery pump ended abnormally");
        }
        debug!("Notification delivery shut down");
    }

    pub fn state(&self) -> NotificationsState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationsState> {
        self.store.subscribe()
    }
}

struct Pump {
    store: NotificationStore,
    alerts: Arc<dyn AlertSink>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl Pump {
    async fn run(mut self, mut events: EventReceiver) {
        let connected = self.status.borrow_and_update().is_connected();
        self.store.set_connected(connected);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.deliver(event),
                    None => {
                        debug!("Event stream closed, stopping delivery");
                        break;
                    }
                },
                changed = self.status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = self.status.borrow_and_update().clone();
                    debug!(status = %status, "Event stream status changed");
                    self.store.set_connected(status.is_connected());
                }
            }
        }
        self.store.set_connected(false);
    }

    fn deliver(&self, event: NotificationEvent) {
        if let AddOutcome::Inserted(notification) = self.store.add_notification(event)
            && self.store.settings().show_toasts
        {
            self.alerts.alert(&notification);
        }
    }
}
