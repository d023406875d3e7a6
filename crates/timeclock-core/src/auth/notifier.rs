//! In-process auth state holder that fans changes out to subscribers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::{AuthListener, AuthProvider, Identity, Subscription};

#[derive(Default)]
struct NotifierState {
    current: Option<Identity>,
    listeners: BTreeMap<u64, AuthListener>,
    next_id: u64,
}

/// [`AuthProvider`] whose state is set directly by the embedding application
///
/// Front ends feed it from whatever actually authenticates the user (a restored
/// Supabase session, a fixed development identity, a test). Listeners are
/// invoked outside the internal lock, so they may call back into the notifier.
#[derive(Clone, Default)]
pub struct AuthStateNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl AuthStateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current identity, if signed in
    pub fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Set the signed-in identity and notify listeners
    pub fn sign_in(&self, identity: Identity) {
        tracing::info!("Signed in as {}", identity.label());
        self.set(Some(identity));
    }

    /// Clear the identity and notify listeners
    pub fn sign_out(&self) {
        tracing::info!("Signed out");
        self.set(None);
    }

    fn set(&self, identity: Option<Identity>) {
        let listeners = {
            let mut state = self.lock();
            state.current.clone_from(&identity);
            state.listeners.values().cloned().collect::<Vec<_>>()
        };
        for listener in listeners {
            listener(identity.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn release(state: &Weak<Mutex<NotifierState>>, id: u64) {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut guard = state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.listeners.remove(&id).is_some() {
            tracing::debug!("Released auth listener {}", id);
        }
    }
}

impl AuthProvider for AuthStateNotifier {
    fn subscribe(&self, listener: AuthListener) -> Subscription {
        let (id, current) = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.insert(id, Arc::clone(&listener));
            (id, state.current.clone())
        };
        tracing::debug!("Registered auth listener {}", id);

        listener(current);

        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || Self::release(&weak, id))
    }
}
