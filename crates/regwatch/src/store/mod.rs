//! Notification store: the bounded list the UI renders, read state and
//! persisted settings.

use std::sync::Arc;

use crate::config::StoreConfig;

mod container;
mod settings;
mod state;

pub use container::{AddOutcome, NotificationStore};
pub use settings::{JsonFileSettings, MemorySettings, SettingsStorage};
pub use state::{Notification, NotificationSettings, NotificationSettingsPatch, NotificationsState};

/// Default maximum number of notifications kept.
pub const DEFAULT_CAPACITY: usize = 100;

impl NotificationStore {
    /// Build a store from configuration, persisting settings to
    /// `settings_path` when one is set.
    pub fn from_config(config: &StoreConfig) -> Self {
        let storage: Arc<dyn SettingsStorage> = match &config.settings_path {
            Some(path) => Arc::new(JsonFileSettings::new(path.clone())),
            None => Arc::new(MemorySettings::new()),
        };
        Self::new(config.capacity, storage)
    }
}
