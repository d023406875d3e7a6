//! Session tracking: follows auth state and keeps the signed-in user's log.
//!
//! A [`SessionTracker`] is mounted once at the root of a front end and owns
//! its auth subscription for as long as it lives. State is published as a
//! [`SessionSnapshot`] through a `tokio::sync::watch` channel; the log inside
//! it is only ever replaced wholesale (fetch) or prepended to (punch).
//!
//! Reads and writes run as spawned tasks that hold only a weak reference to
//! the tracker, so completions arriving after teardown are dropped quietly.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::attendance::AttendanceLogStore;
use crate::auth::{AuthListener, AuthProvider, Identity, Subscription};
use crate::error::{Error, Result};
use crate::models::{LogEntry, LogKind};
use crate::store::DocumentStore;

/// Lifecycle of one attendance session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No identity known; initial state and the state after sign-out
    #[default]
    Unauthenticated,
    /// An identity arrived and its log fetch is being issued
    Authenticating,
    /// Identity known and the initial fetch issued
    Ready,
}

/// Everything a front end renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user: Option<Identity>,
    /// Displayed log, newest first by local prepend order (not re-sorted)
    pub logs: Vec<LogEntry>,
    /// The fetch issued for the current identity has completed, successfully or not
    pub loaded: bool,
    epoch: u64,
}

impl SessionSnapshot {
    pub fn uid(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.uid.as_str())
    }
}

struct Shared<D> {
    snapshot: watch::Sender<SessionSnapshot>,
    store: AttendanceLogStore<D>,
    runtime: Handle,
}

impl<D: DocumentStore> Shared<D> {
    fn on_auth_change(self: &Arc<Self>, identity: Option<Identity>) {
        let Some(identity) = identity else {
            let changed = self.snapshot.send_if_modified(|state| {
                if state.phase == SessionPhase::Unauthenticated && state.user.is_none() {
                    return false;
                }
                *state = SessionSnapshot {
                    epoch: state.epoch + 1,
                    ..SessionSnapshot::default()
                };
                true
            });
            if changed {
                tracing::debug!("Session returned to unauthenticated");
            }
            return;
        };

        let mut issued_epoch = None;
        self.snapshot.send_modify(|state| {
            if state.uid() == Some(identity.uid.as_str()) {
                // Same user re-announced (e.g. token refresh): no new fetch.
                state.user = Some(identity.clone());
                return;
            }
            state.epoch += 1;
            state.phase = SessionPhase::Authenticating;
            state.user = Some(identity.clone());
            state.logs.clear();
            state.loaded = false;
            issued_epoch = Some(state.epoch);
        });

        let Some(epoch) = issued_epoch else {
            return;
        };

        self.spawn_fetch(identity.uid, epoch);
        self.snapshot.send_if_modified(|state| {
            if state.epoch == epoch && state.phase == SessionPhase::Authenticating {
                state.phase = SessionPhase::Ready;
                true
            } else {
                false
            }
        });
    }

    fn spawn_fetch(self: &Arc<Self>, uid: String, epoch: u64) {
        tracing::info!("Fetching logs for user: {}", uid);
        let weak = Arc::downgrade(self);
        let store = self.store.clone();
        self.runtime.spawn(async move {
            let result = store.fetch_log(&uid).await;
            let Some(shared) = weak.upgrade() else {
                tracing::debug!("Session torn down before log fetch for {} completed", uid);
                return;
            };
            shared.apply_fetch(&uid, epoch, result);
        });
    }

    fn apply_fetch(&self, uid: &str, epoch: u64, result: Result<Vec<LogEntry>>) {
        let logs = match result {
            Ok(logs) => Some(logs),
            Err(error) => {
                tracing::error!("Error fetching logs for {}: {}", uid, error);
                None
            }
        };

        let applied = self.snapshot.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            if let Some(logs) = logs {
                state.logs = logs;
            }
            state.loaded = true;
            true
        });
        if !applied {
            tracing::debug!("Discarding stale log fetch for {}", uid);
        }
    }
}

/// Handle to an in-flight append started by [`SessionTracker::record_time`]
///
/// Dropping it leaves the write running in the background.
pub struct PendingWrite {
    entry: LogEntry,
    handle: JoinHandle<Result<()>>,
}

impl PendingWrite {
    /// The entry being written (already shown locally)
    pub const fn entry(&self) -> &LogEntry {
        &self.entry
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the write to settle and return its outcome
    pub async fn wait(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(error) => Err(Error::Runtime(error.to_string())),
        }
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PendingWrite")
            .field("entry", &self.entry)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Tracks the signed-in user and their attendance log
///
/// Dropping the tracker (or calling [`unmount`](Self::unmount)) releases the
/// auth subscription.
pub struct SessionTracker<D> {
    shared: Arc<Shared<D>>,
    subscription: Subscription,
}

impl<D: DocumentStore> SessionTracker<D> {
    /// Subscribe to `provider` and start tracking.
    ///
    /// Must be called from within a Tokio runtime; fetches and appends are
    /// spawned onto it.
    pub fn mount<P>(provider: &P, store: AttendanceLogStore<D>) -> Result<Self>
    where
        P: AuthProvider + ?Sized,
    {
        let runtime = Handle::try_current().map_err(|error| Error::Runtime(error.to_string()))?;
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let shared = Arc::new(Shared {
            snapshot,
            store,
            runtime,
        });

        let weak: Weak<Shared<D>> = Arc::downgrade(&shared);
        let listener: AuthListener = Arc::new(move |identity: Option<Identity>| {
            match weak.upgrade() {
                Some(shared) => shared.on_auth_change(identity),
                None => tracing::debug!("Ignoring auth change after session teardown"),
            }
        });
        let subscription = provider.subscribe(listener);

        Ok(Self {
            shared,
            subscription,
        })
    }

    /// Release the auth subscription and drop all session state
    pub fn unmount(self) {
        drop(self);
    }

    /// Current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Signed-in identity, if any
    pub fn current_user(&self) -> Option<Identity> {
        self.shared.snapshot.borrow().user.clone()
    }

    /// Displayed log, newest first
    pub fn logs(&self) -> Vec<LogEntry> {
        self.shared.snapshot.borrow().logs.clone()
    }

    /// Receiver that observes every state change
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// The store this session reads from and writes to
    pub fn store(&self) -> &AttendanceLogStore<D> {
        &self.shared.store
    }

    /// Wait until the fetch for the current identity has completed.
    ///
    /// Returns immediately while unauthenticated.
    pub async fn wait_until_loaded(&self) -> SessionSnapshot {
        let mut receiver = self.watch();
        let result = receiver
            .wait_for(|state| state.loaded || state.phase == SessionPhase::Unauthenticated)
            .await
            .map(|state| state.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Re-read the current user's log and replace the displayed one.
    ///
    /// On failure the displayed log is left as it was.
    pub async fn refresh(&self) -> Result<()> {
        let (uid, epoch) = {
            let state = self.shared.snapshot.borrow();
            let Some(uid) = state.uid() else {
                return Err(Error::NotAuthenticated);
            };
            (uid.to_string(), state.epoch)
        };

        match self.shared.store.fetch_log(&uid).await {
            Ok(logs) => {
                self.shared.apply_fetch(&uid, epoch, Ok(logs));
                Ok(())
            }
            Err(error) => {
                tracing::error!("Error refreshing logs for {}: {}", uid, error);
                Err(error)
            }
        }
    }

    /// Time-In / Time-Out action stamped with the current time
    pub fn record_time(&self, kind: LogKind) -> Result<PendingWrite> {
        self.record_time_at(kind, Utc::now())
    }

    /// Record a punch at `instant`.
    ///
    /// The entry is prepended to the displayed log before this returns; the
    /// store append runs in the background. A failed append is logged and the
    /// local entry is kept. Without a signed-in user nothing is written and
    /// [`Error::NotAuthenticated`] is returned.
    pub fn record_time_at(&self, kind: LogKind, instant: DateTime<Utc>) -> Result<PendingWrite> {
        let entry = LogEntry::new_at(kind, instant);

        let mut target = None;
        self.shared.snapshot.send_if_modified(|state| {
            let Some(uid) = state.uid().map(ToString::to_string) else {
                return false;
            };
            state.logs.insert(0, entry.clone());
            target = Some(uid);
            true
        });
        let Some(uid) = target else {
            tracing::error!("User is not authenticated; ignoring {} punch", kind);
            return Err(Error::NotAuthenticated);
        };

        let store = self.shared.store.clone();
        let written = entry.clone();
        let handle = self.shared.runtime.spawn(async move {
            let result = store.append_log(&uid, &written).await;
            if let Err(error) = &result {
                tracing::error!("Error adding log entry {} for {}: {}", written.id, uid, error);
            }
            result
        });

        Ok(PendingWrite { entry, handle })
    }
}

impl<D> fmt::Debug for SessionTracker<D> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.snapshot.borrow();
        formatter
            .debug_struct("SessionTracker")
            .field("phase", &state.phase)
            .field("user", &state.user)
            .field("logs", &state.logs.len())
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::AuthStateNotifier;
    use crate::store::{MemoryDocumentStore, StoreError};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, minute, 0).unwrap()
    }

    fn identity(uid: &str) -> Identity {
        Identity::new(uid).unwrap()
    }

    async fn seeded_store(uid: &str, entries: &[LogEntry]) -> MemoryDocumentStore {
        let documents = MemoryDocumentStore::new();
        let store = AttendanceLogStore::new(documents.clone());
        store.provision_user(uid).await.unwrap();
        for entry in entries {
            store.append_log(uid, entry).await.unwrap();
        }
        documents
    }

    fn mount(
        notifier: &AuthStateNotifier,
        documents: &MemoryDocumentStore,
    ) -> SessionTracker<MemoryDocumentStore> {
        SessionTracker::mount(notifier, AttendanceLogStore::new(documents.clone())).unwrap()
    }

    #[tokio::test]
    async fn starts_unauthenticated_and_empty() {
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &MemoryDocumentStore::new());

        let state = tracker.wait_until_loaded().await;
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(state.user.is_none());
        assert!(state.logs.is_empty());
        assert_eq!(notifier.listener_count(), 1);
    }

    #[tokio::test]
    async fn sign_in_fetches_log_once() {
        let t0 = LogEntry::new_at(LogKind::In, at(0));
        let documents = seeded_store("u1", std::slice::from_ref(&t0)).await;
        let reads_before = documents.read_count();
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);

        notifier.sign_in(identity("u1"));
        notifier.sign_in(identity("u1").with_email("ada@example.com"));
        let state = tracker.wait_until_loaded().await;

        assert_eq!(state.phase, SessionPhase::Ready);
        assert_eq!(state.logs, vec![t0]);
        assert_eq!(documents.read_count() - reads_before, 1);
        assert_eq!(
            tracker.current_user().and_then(|user| user.email).as_deref(),
            Some("ada@example.com")
        );
    }

    #[tokio::test]
    async fn mount_after_sign_in_fetches_immediately() {
        let documents = seeded_store("u1", &[LogEntry::new_at(LogKind::In, at(0))]).await;
        let notifier = AuthStateNotifier::new();
        notifier.sign_in(identity("u1"));

        let tracker = mount(&notifier, &documents);
        assert_eq!(tracker.snapshot().phase, SessionPhase::Ready);
        let state = tracker.wait_until_loaded().await;
        assert_eq!(state.logs.len(), 1);
    }

    #[tokio::test]
    async fn user_without_record_sees_empty_log() {
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &MemoryDocumentStore::new());

        notifier.sign_in(identity("newcomer"));
        let state = tracker.wait_until_loaded().await;
        assert!(state.loaded);
        assert!(state.logs.is_empty());
    }

    #[tokio::test]
    async fn punch_is_rendered_before_write_runs() {
        let documents = seeded_store("u1", &[]).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        let pending = tracker.record_time_at(LogKind::In, at(5)).unwrap();
        assert_eq!(tracker.logs(), vec![pending.entry().clone()]);
        assert_eq!(documents.update_count(), 0);

        pending.wait().await.unwrap();
        assert_eq!(documents.update_count(), 1);
    }

    #[tokio::test]
    async fn time_out_after_time_in_scenario() {
        let t0 = LogEntry::new_at(LogKind::In, at(0));
        let documents = seeded_store("u1", std::slice::from_ref(&t0)).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        let pending = tracker.record_time_at(LogKind::Out, at(30)).unwrap();
        let t1 = pending.entry().clone();
        assert_eq!(t1.id, "2026-10-18T09:30:00.000Z");
        assert_eq!(tracker.logs(), vec![t1.clone(), t0.clone()]);

        pending.wait().await.unwrap();
        let stored = tracker.store().fetch_log("u1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.contains(&t0));
        assert!(stored.contains(&t1));
    }

    #[tokio::test]
    async fn punch_without_identity_is_rejected_without_writing() {
        let documents = MemoryDocumentStore::new();
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);

        let result = tracker.record_time(LogKind::In);
        assert!(matches!(result, Err(Error::NotAuthenticated)));
        assert!(tracker.logs().is_empty());
        tokio::task::yield_now().await;
        assert_eq!(documents.update_count(), 0);
    }

    #[tokio::test]
    async fn failed_write_keeps_optimistic_entry() {
        // No record provisioned: fetch is empty and the union update fails.
        let documents = MemoryDocumentStore::new();
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        let pending = tracker.record_time_at(LogKind::In, at(1)).unwrap();
        let entry = pending.entry().clone();
        let error = pending.wait().await.unwrap_err();

        assert!(matches!(error, Error::Write(StoreError::NotFound(_))));
        assert_eq!(tracker.logs(), vec![entry]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_current_log() {
        let t0 = LogEntry::new_at(LogKind::In, at(0));
        let documents = seeded_store("u1", std::slice::from_ref(&t0)).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        documents.set_offline(true);
        let error = tracker.refresh().await.unwrap_err();
        assert!(matches!(error, Error::Read(_)));
        assert_eq!(tracker.logs(), vec![t0]);
    }

    #[tokio::test]
    async fn failed_initial_fetch_marks_loaded_with_empty_log() {
        let documents = seeded_store("u1", &[LogEntry::new_at(LogKind::In, at(0))]).await;
        documents.set_offline(true);
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);

        notifier.sign_in(identity("u1"));
        let state = tracker.wait_until_loaded().await;
        assert!(state.loaded);
        assert!(state.logs.is_empty());
        assert_eq!(state.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn refresh_picks_up_entries_from_other_sessions() {
        let documents = seeded_store("u1", &[]).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        let elsewhere = LogEntry::new_at(LogKind::In, at(2));
        AttendanceLogStore::new(documents.clone())
            .append_log("u1", &elsewhere)
            .await
            .unwrap();

        tracker.refresh().await.unwrap();
        assert_eq!(tracker.logs(), vec![elsewhere]);
    }

    #[tokio::test]
    async fn sign_out_returns_to_unauthenticated_and_clears_log() {
        let documents = seeded_store("u1", &[LogEntry::new_at(LogKind::In, at(0))]).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        notifier.sign_out();
        let state = tracker.snapshot();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(state.user.is_none());
        assert!(state.logs.is_empty());
        assert!(matches!(
            tracker.record_time(LogKind::Out),
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn stale_fetch_for_previous_user_is_discarded() {
        let documents = seeded_store("u1", &[LogEntry::new_at(LogKind::In, at(0))]).await;
        AttendanceLogStore::new(documents.clone())
            .provision_user("u2")
            .await
            .unwrap();
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);

        // Both fetches are spawned before either runs.
        notifier.sign_in(identity("u1"));
        notifier.sign_in(identity("u2"));
        let state = tracker.wait_until_loaded().await;

        assert_eq!(state.uid(), Some("u2"));
        assert!(state.logs.is_empty());
        tokio::task::yield_now().await;
        assert!(tracker.logs().is_empty());
    }

    #[tokio::test]
    async fn unmount_releases_subscription_and_tolerates_late_fetch() {
        let documents = seeded_store("u1", &[LogEntry::new_at(LogKind::In, at(0))]).await;
        let reads_before = documents.read_count();
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);

        notifier.sign_in(identity("u1"));
        tracker.unmount();
        assert_eq!(notifier.listener_count(), 0);

        // Let the orphaned fetch run to completion.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(documents.read_count() - reads_before, 1);

        notifier.sign_out();
        notifier.sign_in(identity("u1"));
        assert_eq!(documents.read_count() - reads_before, 1);
    }

    #[tokio::test]
    async fn write_started_before_unmount_still_lands() {
        let documents = seeded_store("u1", &[]).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        let pending = tracker.record_time_at(LogKind::In, at(5)).unwrap();
        tracker.unmount();
        assert_eq!(notifier.listener_count(), 0);

        pending.wait().await.unwrap();
        let stored = AttendanceLogStore::new(documents).fetch_log("u1").await.unwrap();
        assert_eq!(stored, vec![LogEntry::new_at(LogKind::In, at(5))]);
    }

    #[tokio::test]
    async fn user_provisioned_with_padded_uid_can_punch() {
        let documents = MemoryDocumentStore::new();
        let store = AttendanceLogStore::new(documents.clone());
        assert!(store.provision_user(" u1").await.unwrap());
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);

        notifier.sign_in(identity(" u1"));
        tracker.wait_until_loaded().await;
        let pending = tracker.record_time_at(LogKind::In, at(7)).unwrap();
        pending.wait().await.unwrap();

        assert_eq!(
            store.fetch_log("u1").await.unwrap(),
            vec![LogEntry::new_at(LogKind::In, at(7))]
        );
    }

    #[tokio::test]
    async fn watchers_observe_punches() {
        let documents = seeded_store("u1", &[]).await;
        let notifier = AuthStateNotifier::new();
        let tracker = mount(&notifier, &documents);
        notifier.sign_in(identity("u1"));
        tracker.wait_until_loaded().await;

        let mut receiver = tracker.watch();
        let _ = receiver.borrow_and_update();
        let pending = tracker.record_time_at(LogKind::In, at(3)).unwrap();
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().logs.len(), 1);
        pending.wait().await.unwrap();
    }

    #[test]
    fn mount_outside_runtime_fails() {
        let notifier = AuthStateNotifier::new();
        let result = SessionTracker::mount(
            &notifier,
            AttendanceLogStore::new(MemoryDocumentStore::new()),
        );
        assert!(matches!(result, Err(Error::Runtime(_))));
        assert_eq!(notifier.listener_count(), 0);
    }
}
