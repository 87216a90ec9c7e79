//! Notification state types.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::NotificationEvent;

/// A notification held by the store.
///
/// `read_at` is set exactly once, on the first transition to read, and
/// `created_at` never changes after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(flatten)]
    event: NotificationEvent,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Notification {
    /// Build an unread notification; `created_at` comes from the event
    /// timestamp, or `now` when that is not valid RFC 3339.
    pub(crate) fn from_event(event: NotificationEvent, now: DateTime<Utc>) -> Self {
        let created_at = event.parsed_timestamp().unwrap_or(now);
        Self {
            event,
            is_read: false,
            read_at: None,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn event(&self) -> &NotificationEvent {
        &self.event
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn read_at(&self) -> Option<DateTime<Utc>> {
        self.read_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Mark as read. Returns `false` if it already was.
    pub(crate) fn mark_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at.get_or_insert(now);
        true
    }
}

/// User preferences; the only persisted part of the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Raise an alert for every new notification.
    pub show_toasts: bool,
    /// Drop events the server did not flag as significant.
    pub show_only_significant: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            show_toasts: true,
            show_only_significant: false,
        }
    }
}

/// Partial settings update; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettingsPatch {
    pub show_toasts: Option<bool>,
    pub show_only_significant: Option<bool>,
}

impl NotificationSettingsPatch {
    pub fn show_toasts(mut self, value: bool) -> Self {
        self.show_toasts = Some(value);
        self
    }

    pub fn show_only_significant(mut self, value: bool) -> Self {
        self.show_only_significant = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.show_toasts.is_none() && self.show_only_significant.is_none()
    }

    pub(crate) fn apply(&self, settings: &mut NotificationSettings) {
        if let Some(value) = self.show_toasts {
            settings.show_toasts = value;
        }
        if let Some(value) = self.show_only_significant {
            settings.show_only_significant = value;
        }
    }
}

/// Snapshot of everything the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsState {
    pub(crate) notifications: VecDeque<Notification>,
    pub(crate) unread_count: usize,
    pub(crate) is_connected: bool,
    pub(crate) settings: NotificationSettings,
}

impl NotificationsState {
    pub(crate) fn with_settings(settings: NotificationSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> impl ExactSizeIterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id() == id)
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn settings(&self) -> NotificationSettings {
        self.settings
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.notifications.iter().any(|n| n.id() == id)
    }

    pub(crate) fn recompute_unread(&mut self) {
        self.unread_count = self.notifications.iter().filter(|n| !n.is_read()).count();
    }
}
