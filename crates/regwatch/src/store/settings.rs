//! Durable storage for [`NotificationSettings`].

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use super::state::NotificationSettings;
use crate::error::{Error, Result};

/// Loads and saves user settings across sessions.
///
/// Calls are synchronous so store operations never yield mid-mutation.
pub trait SettingsStorage: Send + Sync {
    /// Previously saved settings, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<NotificationSettings>>;

    fn save(&self, settings: &NotificationSettings) -> Result<()>;
}

/// Settings kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStorage for JsonFileSettings {
    fn load(&self) -> Result<Option<NotificationSettings>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::other(format!(
                    "reading settings {}: {e}",
                    self.path.display()
                )));
            }
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, settings: &NotificationSettings) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Notification settings saved");
        Ok(())
    }
}

/// Settings that live only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySettings {
    saved: Mutex<Option<NotificationSettings>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStorage for MemorySettings {
    fn load(&self) -> Result<Option<NotificationSettings>> {
        Ok(*self.saved.lock())
    }

    fn save(&self, settings: &NotificationSettings) -> Result<()> {
        *self.saved.lock() = Some(*settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileSettings::new(dir.path().join("nested").join("settings.json"));
        assert_eq!(storage.load().unwrap(), None);

        let settings = NotificationSettings {
            show_toasts: false,
            show_only_significant: true,
        };
        storage.save(&settings).unwrap();
        assert_eq!(storage.load().unwrap(), Some(settings));
        assert!(!storage.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileSettings::new(path).load().is_err());
    }

    #[test]
    fn test_memory_settings() {
        let storage = MemorySettings::new();
        assert_eq!(storage.load().unwrap(), None);
        storage.save(&NotificationSettings::default()).unwrap();
        assert_eq!(storage.load().unwrap(), Some(NotificationSettings::default()));
    }
}
