//! regwatch: real-time change notifications for the company/entrepreneur registry.
//!
//! This crate keeps a live, deduplicated view of registry changes pushed by the
//! server over a `text/event-stream` connection.
//!
//! ## Core Types
//!
//! - [`EventStreamClient`] - Long-lived stream connection with backoff, heartbeat
//!   timeout and resumption cursor
//! - [`NotificationStore`] - Bounded, newest-first notification list with read state
//! - [`NotificationDelivery`] - Wires the client, the store and the server-side
//!   read-state sync together
//!
//! ## Wire Types
//!
//! - [`NotificationEvent`] - A single change record as sent by the server
//! - [`StreamPayload`] - Decoded stream payload (domain event or control message)
//!
//! ## Transport
//!
//! - [`HttpTransport`] - reqwest-backed streaming GET
//! - [`ChannelTransport`] - In-memory transport fed from scripted sessions

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod store;
pub mod stream;
pub mod utils;

pub use api::{HistoryRecord, HttpBackend, NotificationsBackend};
pub use config::{DeliveryConfig, StoreConfig, StreamConfig};
pub use delivery::{AlertSink, NotificationDelivery, TracingAlertSink};
pub use error::{Error, Result};
pub use event::{ChangeType, ControlKind, EntityType, NotificationEvent, StreamPayload};
pub use store::{
    AddOutcome, JsonFileSettings, MemorySettings, Notification, NotificationSettings,
    NotificationSettingsPatch, NotificationStore, NotificationsState, SettingsStorage,
};
pub use stream::{
    ChannelTransport, ConnectionStatus, EventReceiver, EventStreamClient, HttpTransport,
    SessionSender, StreamRequest, StreamTransport,
};
