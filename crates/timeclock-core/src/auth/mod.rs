//! Authentication state: identities, the provider contract, and subscriptions.
//!
//! An [`AuthProvider`] pushes the current identity (or `None`) to subscribers
//! once on subscribe and again after every change. Subscribing returns a
//! [`Subscription`] guard that releases the listener when dropped.

mod notifier;
mod supabase;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use notifier::AuthStateNotifier;
pub use supabase::{
    auth_endpoint, AuthError, AuthResult, AuthSession, AuthUser, SessionPersistence,
    SupabaseAuthProvider,
};

/// An authenticated user as seen by the attendance workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique user id; keys the user's record
    pub uid: String,
    pub email: Option<String>,
}

impl Identity {
    /// Identity with the given uid; blank uids are rejected
    pub fn new(uid: impl Into<String>) -> Result<Self> {
        let uid = uid.into().trim().to_string();
        if uid.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        Ok(Self { uid, email: None })
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Email when known, uid otherwise
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

/// Callback invoked with the current identity on every auth state change
pub type AuthListener = Arc<dyn Fn(Option<Identity>) + Send + Sync>;

/// Source of authentication state changes
pub trait AuthProvider {
    /// Register `listener`; it is called once right away with the current
    /// identity and again after every change until the subscription is released.
    fn subscribe(&self, listener: AuthListener) -> Subscription;
}

/// Scoped registration of an auth listener
///
/// The listener is removed when the guard is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called, whichever comes first.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the listener now
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    /// Whether the listener is still registered through this guard
    pub const fn is_active(&self) -> bool {
        self.release.is_some()
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
