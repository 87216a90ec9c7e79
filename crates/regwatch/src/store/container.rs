//! The shared notification store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::settings::{MemorySettings, SettingsStorage};
use super::state::{Notification, NotificationSettings, NotificationSettingsPatch, NotificationsState};
use super::DEFAULT_CAPACITY;
use crate::event::NotificationEvent;

/// Result of [`NotificationStore::add_notification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Stored at the head of the list.
    Inserted(Notification),
    /// An entry with the same id already exists; the store is unchanged.
    Duplicate,
    /// Rejected by the significance filter.
    Filtered,
}

impl AddOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

struct StoreInner {
    state: RwLock<NotificationsState>,
    capacity: usize,
    storage: Arc<dyn SettingsStorage>,
    snapshot_tx: watch::Sender<NotificationsState>,
}

/// Bounded, newest-first notification list with read state and settings.
///
/// Cloning yields another handle to the same store. Every operation runs
/// under a single write lock and never yields, so operations are atomic
/// with respect to each other. A snapshot is published after each change.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Arc::new(MemorySettings::new()))
    }
}

impl NotificationStore {
    /// Create a store holding at most `capacity` notifications.
    ///
    /// Saved settings are loaded from `storage`; a load failure falls back
    /// to the defaults.
    pub fn new(capacity: usize, storage: Arc<dyn SettingsStorage>) -> Self {
        let settings = match storage.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => NotificationSettings::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load notification settings, using defaults");
                NotificationSettings::default()
            }
        };

        let state = NotificationsState::with_settings(settings);
        let (snapshot_tx, _) = watch::channel(state.clone());
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                capacity: capacity.max(1),
                storage,
                snapshot_tx,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Add an event at the head of the list.
    pub fn add_notification(&self, event: NotificationEvent) -> AddOutcome {
        self.mutate(|state, capacity| {
            if state.settings.show_only_significant && !event.is_significant {
                debug!(id = %event.id, "Skipping non-significant notification");
                return AddOutcome::Filtered;
            }
            if state.contains(&event.id) {
                debug!(id = %event.id, "Duplicate notification ignored");
                return AddOutcome::Duplicate;
            }

            let notification = Notification::from_event(event, Utc::now());
            state.notifications.push_front(notification.clone());
            state.notifications.truncate(capacity);
            state.recompute_unread();
            AddOutcome::Inserted(notification)
        })
    }

    /// Mark one notification as read. Returns `false` if it is unknown or
    /// was already read.
    pub fn mark_as_read(&self, id: &str) -> bool {
        self.mutate(|state, _| {
            let now = Utc::now();
            let changed = state
                .notifications
                .iter_mut()
                .find(|n| n.id() == id)
                .is_some_and(|n| n.mark_read(now));
            state.recompute_unread();
            changed
        })
    }

    /// Mark every notification as read. Returns how many changed.
    pub fn mark_all_as_read(&self) -> usize {
        self.mutate(|state, _| {
            let now = Utc::now();
            let changed = state
                .notifications
                .iter_mut()
                .filter_map(|n| n.mark_read(now).then_some(()))
                .count();
            state.recompute_unread();
            changed
        })
    }

    /// Drop every notification. Settings and the connection flag are kept.
    pub fn clear_all(&self) {
        self.mutate(|state, _| {
            state.notifications.clear();
            state.recompute_unread();
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.mutate(|state, _| {
            state.is_connected = connected;
        })
    }

    /// Merge `patch` into the settings and persist the result.
    ///
    /// A persistence failure is logged; the in-memory settings still change.
    /// The save happens under the write lock so concurrent updates reach
    /// storage in the order they were applied.
    pub fn update_settings(&self, patch: NotificationSettingsPatch) -> NotificationSettings {
        let storage = &self.inner.storage;
        self.mutate(|state, _| {
            patch.apply(&mut state.settings);
            if let Err(e) = storage.save(&state.settings) {
                warn!(error = %e, "Failed to persist notification settings");
            }
            state.settings
        })
    }

    /// Replace the list with `events`, newest first.
    ///
    /// Later duplicates of an id are dropped and the list is cut to
    /// capacity. The significance filter does not apply.
    pub fn load_notifications(&self, events: impl IntoIterator<Item = NotificationEvent>) {
        self.mutate(|state, capacity| {
            let now = Utc::now();
            let mut seen = HashSet::new();
            state.notifications = events
                .into_iter()
                .filter(|event| seen.insert(event.id.clone()))
                .take(capacity)
                .map(|event| Notification::from_event(event, now))
                .collect();
            state.recompute_unread();
            debug!(count = state.notifications.len(), "Notifications loaded");
        })
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> NotificationsState {
        self.inner.state.read().clone()
    }

    /// Receive a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<NotificationsState> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state.read().unread_count
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.read().is_connected
    }

    pub fn settings(&self) -> NotificationSettings {
        self.inner.state.read().settings
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.inner.state.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().is_empty()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut NotificationsState, usize) -> R) -> R {
        let mut state = self.inner.state.write();
        let before = (*state).clone();
        let result = f(&mut state, self.inner.capacity);
        if *state != before {
            self.inner.snapshot_tx.send_replace(state.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::{Error, Result};
    use crate::event::tests::sample_event;

    fn store(capacity: usize) -> NotificationStore {
        NotificationStore::new(capacity, Arc::new(MemorySettings::new()))
    }

    fn insignificant(id: &str) -> NotificationEvent {
        let mut event = sample_event(id);
        event.is_significant = false;
        event
    }

    fn ids(store: &NotificationStore) -> Vec<String> {
        store
            .snapshot()
            .notifications()
            .map(|n| n.id().to_string())
            .collect()
    }

    struct FailingStorage;

    impl SettingsStorage for FailingStorage {
        fn load(&self) -> Result<Option<NotificationSettings>> {
            Err(Error::other("disk gone"))
        }

        fn save(&self, _: &NotificationSettings) -> Result<()> {
            Err(Error::other("disk gone"))
        }
    }

    #[test]
    fn test_add_prepends_and_counts() {
        let store = store(10);
        assert!(store.add_notification(sample_event("e1")).is_inserted());
        assert!(store.add_notification(sample_event("e2")).is_inserted());

        assert_eq!(ids(&store), ["e2", "e1"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let store = store(10);
        store.add_notification(sample_event("e1"));
        store.mark_as_read("e1");

        let mut again = sample_event("e1");
        again.entity_name = "Other".to_string();
        assert_eq!(store.add_notification(again), AddOutcome::Duplicate);

        let kept = store.get("e1").unwrap();
        assert_eq!(kept.event().entity_name, "Sberbank");
        assert!(kept.is_read());
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = store(3);
        for i in 1..=5 {
            store.add_notification(sample_event(&format!("e{i}")));
        }
        assert_eq!(ids(&store), ["e5", "e4", "e3"]);
        assert_eq!(store.unread_count(), 3);

        // An evicted id may come back.
        assert!(store.add_notification(sample_event("e1")).is_inserted());
        assert_eq!(ids(&store), ["e1", "e5", "e4"]);
    }

    #[test]
    fn test_significance_filter() {
        let store = store(10);
        store.update_settings(NotificationSettingsPatch::default().show_only_significant(true));

        assert_eq!(
            store.add_notification(insignificant("e1")),
            AddOutcome::Filtered
        );
        assert!(store.add_notification(sample_event("e2")).is_inserted());
        assert_eq!(ids(&store), ["e2"]);

        store.update_settings(NotificationSettingsPatch::default().show_only_significant(false));
        assert!(store.add_notification(insignificant("e3")).is_inserted());
    }

    #[test]
    fn test_mark_as_read_is_idempotent() {
        let store = store(10);
        store.add_notification(sample_event("e1"));
        store.add_notification(sample_event("e2"));

        assert!(store.mark_as_read("e1"));
        let read_at = store.get("e1").unwrap().read_at();
        assert!(read_at.is_some());

        assert!(!store.mark_as_read("e1"));
        assert_eq!(store.get("e1").unwrap().read_at(), read_at);
        assert_eq!(store.unread_count(), 1);

        assert!(!store.mark_as_read("missing"));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_mark_all_keeps_existing_read_at() {
        let store = store(10);
        for id in ["e1", "e2", "e3"] {
            store.add_notification(sample_event(id));
        }
        store.mark_as_read("e2");
        let e2_read_at = store.get("e2").unwrap().read_at();

        assert_eq!(store.mark_all_as_read(), 2);
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.get("e2").unwrap().read_at(), e2_read_at);
        assert!(store.snapshot().notifications().all(|n| n.read_at().is_some()));

        assert_eq!(store.mark_all_as_read(), 0);
    }

    #[test]
    fn test_clear_all_keeps_settings_and_connection() {
        let store = store(10);
        store.set_connected(true);
        store.update_settings(NotificationSettingsPatch::default().show_toasts(false));
        store.add_notification(sample_event("e1"));

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
        assert!(store.is_connected());
        assert!(!store.settings().show_toasts);
    }

    #[test]
    fn test_load_replaces_and_dedups() {
        let store = store(3);
        store.add_notification(sample_event("live"));

        store.load_notifications(
            ["h1", "h2", "h1", "h3", "h4"]
                .into_iter()
                .map(insignificant),
        );
        assert_eq!(ids(&store), ["h1", "h2", "h3"]);
        assert_eq!(store.unread_count(), 3);
    }

    #[test]
    fn test_settings_persisted_and_reloaded() {
        let storage = Arc::new(MemorySettings::new());
        let store = NotificationStore::new(10, storage.clone());
        let updated =
            store.update_settings(NotificationSettingsPatch::default().show_only_significant(true));
        assert!(updated.show_toasts);
        assert!(updated.show_only_significant);
        assert_eq!(storage.load().unwrap(), Some(updated));

        let reopened = NotificationStore::new(10, storage);
        assert_eq!(reopened.settings(), updated);
    }

    /// Blocks the first `save` until released.
    struct GatedStorage {
        saved: MemorySettings,
        calls: std::sync::atomic::AtomicUsize,
        entered: std::sync::mpsc::SyncSender<()>,
        release: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SettingsStorage for GatedStorage {
        fn load(&self) -> Result<Option<NotificationSettings>> {
            self.saved.load()
        }

        fn save(&self, settings: &NotificationSettings) -> Result<()> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                self.entered.send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
            self.saved.save(settings)
        }
    }

    #[test]
    fn test_concurrent_settings_updates_persist_in_order() {
        let (entered_tx, entered_rx) = std::sync::mpsc::sync_channel(1);
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let storage = Arc::new(GatedStorage {
            saved: MemorySettings::new(),
            calls: Default::default(),
            entered: entered_tx,
            release: parking_lot::Mutex::new(release_rx),
        });
        let store = NotificationStore::new(10, storage.clone());

        let first = {
            let store = store.clone();
            std::thread::spawn(move || {
                store.update_settings(NotificationSettingsPatch::default().show_toasts(false))
            })
        };
        entered_rx.recv().unwrap();

        let second = {
            let store = store.clone();
            std::thread::spawn(move || {
                store.update_settings(
                    NotificationSettingsPatch::default().show_only_significant(true),
                )
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        release_tx.send(()).unwrap();

        first.join().unwrap();
        second.join().unwrap();

        let expected = NotificationSettings {
            show_toasts: false,
            show_only_significant: true,
        };
        assert_eq!(store.settings(), expected);
        assert_eq!(storage.load().unwrap(), Some(expected));
    }

    #[test]
    fn test_default_capacity_evicts_oldest() {
        let store = NotificationStore::new(DEFAULT_CAPACITY, Arc::new(MemorySettings::new()));
        for i in 0..=DEFAULT_CAPACITY {
            assert!(store.add_notification(sample_event(&format!("e{i}"))).is_inserted());
        }

        assert_eq!(store.len(), DEFAULT_CAPACITY);
        assert!(store.get("e0").is_none());
        assert!(store.get("e1").is_some());
        assert_eq!(ids(&store)[0], format!("e{DEFAULT_CAPACITY}"));
        assert_eq!(store.unread_count(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_settings_storage_failure_is_not_raised() {
        let store = NotificationStore::new(10, Arc::new(FailingStorage));
        assert_eq!(store.settings(), NotificationSettings::default());

        let updated = store.update_settings(NotificationSettingsPatch::default().show_toasts(false));
        assert!(!updated.show_toasts);
        assert!(!store.settings().show_toasts);
    }

    #[test]
    fn test_subscribe_sees_changes() {
        let store = store(10);
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.add_notification(sample_event("e1"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().unread_count(), 1);

        // No-op operations publish nothing.
        store.mark_as_read("missing");
        assert!(!rx.has_changed().unwrap());

        store.set_connected(true);
        assert!(rx.borrow_and_update().is_connected());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, bool),
        MarkRead(u8),
        MarkAll,
        Clear,
        Load(Vec<u8>),
        OnlySignificant(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (0u8..20, any::<bool>()).prop_map(|(id, significant)| Op::Add(id, significant)),
            3 => (0u8..20).prop_map(Op::MarkRead),
            1 => Just(Op::MarkAll),
            1 => Just(Op::Clear),
            1 => prop::collection::vec(0u8..20, 0..12).prop_map(Op::Load),
            1 => any::<bool>().prop_map(Op::OnlySignificant),
        ]
    }

    fn event(id: u8, significant: bool) -> NotificationEvent {
        let mut event = sample_event(&format!("e{id}"));
        event.is_significant = significant;
        event
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_store_invariants(capacity in 1usize..8, ops in prop::collection::vec(op(), 0..60)) {
            let store = store(capacity);

            for op in ops {
                match op {
                    Op::Add(id, significant) => {
                        let only_significant = store.settings().show_only_significant;
                        let existed = store.get(&format!("e{id}")).is_some();
                        let outcome = store.add_notification(event(id, significant));
                        if only_significant && !significant {
                            prop_assert_eq!(outcome, AddOutcome::Filtered);
                        } else if existed {
                            prop_assert_eq!(outcome, AddOutcome::Duplicate);
                        } else {
                            prop_assert!(outcome.is_inserted());
                            prop_assert_eq!(ids(&store)[0].clone(), format!("e{id}"));
                        }
                    }
                    Op::MarkRead(id) => {
                        store.mark_as_read(&format!("e{id}"));
                    }
                    Op::MarkAll => {
                        store.mark_all_as_read();
                        prop_assert_eq!(store.unread_count(), 0);
                    }
                    Op::Clear => {
                        store.clear_all();
                        prop_assert!(store.is_empty());
                    }
                    Op::Load(batch) => {
                        store.load_notifications(batch.into_iter().map(|id| event(id, false)));
                    }
                    Op::OnlySignificant(value) => {
                        store.update_settings(
                            NotificationSettingsPatch::default().show_only_significant(value),
                        );
                    }
                }

                let snapshot = store.snapshot();
                let listed = ids(&store);
                let unique: HashSet<_> = listed.iter().collect();
                prop_assert_eq!(unique.len(), listed.len());
                prop_assert!(snapshot.len() <= capacity);
                prop_assert_eq!(
                    snapshot.unread_count(),
                    snapshot.notifications().filter(|n| !n.is_read()).count()
                );
                prop_assert!(
                    snapshot
                        .notifications()
                        .all(|n| n.is_read() == n.read_at().is_some())
                );
            }
        }
    }
}
