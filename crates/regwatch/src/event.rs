//! Notification events.
//!
//! Defines the change records pushed by the server and the control messages
//! that share the same stream.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire type of the server's "stream is up" control message.
pub const CONNECTED_TYPE: &str = "connected";
/// Wire type of the server's liveness message.
pub const HEARTBEAT_TYPE: &str = "heartbeat";
/// Wire type used for registry changes.
pub const CHANGE_DETECTED_TYPE: &str = "change_detected";

/// Kind of registry entity a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Company,
    Entrepreneur,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Entrepreneur => "entrepreneur",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of a registry record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Status,
    Director,
    Founders,
    Address,
    Capital,
    Activities,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Director => "director",
            Self::Founders => "founders",
            Self::Address => "address",
            Self::Capital => "capital",
            Self::Activities => "activities",
        }
    }

    /// Human-friendly label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Status => "Status changed",
            Self::Director => "Director changed",
            Self::Founders => "Founders changed",
            Self::Address => "Address changed",
            Self::Capital => "Capital changed",
            Self::Activities => "Activities changed",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change record as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Server-assigned, globally unique id.
    pub id: String,
    /// Wire discriminator (`type`).
    #[serde(rename = "type")]
    pub kind: String,
    pub entity_type: EntityType,
    /// Registry identifier of the entity.
    pub entity_id: String,
    pub entity_name: String,
    pub change_type: ChangeType,
    pub field_name: String,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
    #[serde(default)]
    pub is_significant: bool,
    /// ISO-8601 timestamp of the change.
    pub timestamp: String,
    #[serde(default)]
    pub region_code: String,
}

impl NotificationEvent {
    /// Short title for alert surfaces.
    pub fn title(&self) -> String {
        format!("{}: {}", self.entity_name, self.change_type.label())
    }

    /// One-line description of the change.
    pub fn description(&self) -> String {
        match (self.old_value.is_empty(), self.new_value.is_empty()) {
            (true, true) => format!("{} updated", self.field_name),
            (true, false) => format!("{} set to \"{}\"", self.field_name, self.new_value),
            (false, true) => format!("{} \"{}\" removed", self.field_name, self.old_value),
            (false, false) => format!(
                "{}: \"{}\" -> \"{}\"",
                self.field_name, self.old_value, self.new_value
            ),
        }
    }

    /// Parse `timestamp` as RFC 3339.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Control messages that keep the stream alive but carry no change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Connected,
    Heartbeat,
}

impl ControlKind {
    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            CONNECTED_TYPE => Some(Self::Connected),
            HEARTBEAT_TYPE => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// A decoded stream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    Control(ControlKind),
    Event(NotificationEvent),
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type", borrow)]
    kind: Option<std::borrow::Cow<'a, str>>,
}

impl StreamPayload {
    /// Decode the `data` of a stream message.
    ///
    /// Control payloads only need their `type`; everything else must be a
    /// complete [`NotificationEvent`].
    pub fn decode(data: &str) -> Result<Self> {
        let envelope: Envelope<'_> = serde_json::from_str(data)?;
        if let Some(control) = envelope.kind.as_deref().and_then(ControlKind::from_type) {
            return Ok(Self::Control(control));
        }

        let event: NotificationEvent = serde_json::from_str(data)?;
        if event.id.is_empty() {
            return Err(Error::protocol("notification event without id"));
        }
        Ok(Self::Event(event))
    }
}
