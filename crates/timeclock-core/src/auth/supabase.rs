//! Supabase-backed [`AuthProvider`].
//!
//! Email/password sessions come from the Supabase GoTrue API and are kept in a
//! [`SessionPersistence`] between runs. Every change of session (sign-in,
//! refresh, sign-out, a session restored on first subscribe) is announced to
//! subscribers as the corresponding [`Identity`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::runtime::Handle;

use super::{AuthListener, AuthProvider, AuthStateNotifier, Identity, Subscription};
use crate::util::{compact_text, is_http_url, unix_timestamp_now};

const EXPIRY_SKEW_SECONDS: i64 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// A signed-in Supabase session as persisted between runs
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }

    /// Identity the attendance workflow keys the user's record by
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.user.id.trim().to_string(),
            email: self.user.email.clone(),
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("No signed-in session")]
    SignedOut,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Where a signed-in session is kept between runs
pub trait SessionPersistence: Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// The two GoTrue endpoints the provider talks to
struct GoTrue {
    auth_url: String,
    anon_key: String,
    http: Client,
}

impl GoTrue {
    fn new(url: &str, anon_key: String) -> AuthResult<Self> {
        let anon_key = anon_key.trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }
        Ok(Self {
            auth_url: auth_endpoint(url)?,
            anon_key,
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    /// `POST /token?grant_type=...`, yielding a fresh session
    async fn grant(&self, grant_type: &str, body: serde_json::Value) -> AuthResult<AuthSession> {
        let response = self
            .http
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .json(&body)
            .send()
            .await?;
        let grant = ensure_success(response)
            .await?
            .json::<TokenGrant>()
            .await?;
        grant.into_session()
    }

    async fn password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        if email.trim().is_empty() {
            return Err(AuthError::Api("Email is required".to_string()));
        }
        if password.trim().is_empty() {
            return Err(AuthError::Api("Password is required".to_string()));
        }
        self.grant("password", json!({ "email": email.trim(), "password": password }))
            .await
    }

    async fn refresh(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        self.grant(
            "refresh_token",
            json!({ "refresh_token": session.refresh_token }),
        )
        .await
    }

    /// Revoke the session server side; an already-invalid token counts as revoked
    async fn logout(&self, session: &AuthSession) -> AuthResult<()> {
        let response = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        ensure_success(response).await.map(drop)
    }
}

struct ProviderState<S> {
    gotrue: GoTrue,
    persistence: S,
    session: Mutex<Option<AuthSession>>,
    restored: AtomicBool,
    identity: AuthStateNotifier,
}

impl<S: SessionPersistence> ProviderState<S> {
    fn session(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn activate(&self, session: AuthSession) {
        let identity = session.identity();
        *self.session() = Some(session);
        self.identity.sign_in(identity);
    }

    /// Persist and announce a session the API just issued
    fn adopt(&self, session: AuthSession) -> AuthResult<AuthSession> {
        self.persistence.save_session(&session)?;
        self.activate(session.clone());
        Ok(session)
    }

    fn discard(&self) -> AuthResult<()> {
        *self.session() = None;
        let cleared = self.persistence.clear_session();
        self.identity.sign_out();
        cleared
    }

    /// Bring back a persisted session, refreshing it first when expired.
    ///
    /// A session that can no longer be refreshed is discarded and reported as
    /// signed out rather than as an error.
    async fn resume(&self, stored: AuthSession) -> Option<AuthSession> {
        if !stored.is_expired() {
            self.activate(stored.clone());
            return Some(stored);
        }

        let refreshed = match self.gotrue.refresh(&stored).await {
            Ok(session) => self.adopt(session),
            Err(error) => Err(error),
        };
        match refreshed {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                if let Err(error) = self.discard() {
                    tracing::warn!("Failed to clear persisted session: {}", error);
                }
                None
            }
        }
    }

    /// First subscriber triggers the restore of any persisted session.
    ///
    /// A still-valid session is announced before `subscribe` returns; an expired
    /// one is refreshed on the current runtime and announced when that settles.
    fn restore_on_subscribe(self: &Arc<Self>) {
        if self.restored.swap(true, Ordering::SeqCst) {
            return;
        }
        let stored = match self.persistence.load_session() {
            Ok(Some(stored)) => stored,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!("Failed to load persisted session: {}", error);
                return;
            }
        };
        if !stored.is_expired() {
            self.activate(stored);
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("Persisted session expired and no runtime is available to refresh it");
            return;
        };
        let state = Arc::downgrade(self);
        runtime.spawn(async move {
            if let Some(state) = state.upgrade() {
                state.resume(stored).await;
            }
        });
    }
}

/// [`AuthProvider`] backed by Supabase email/password auth
pub struct SupabaseAuthProvider<S> {
    state: Arc<ProviderState<S>>,
}

impl<S> Clone for SupabaseAuthProvider<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: SessionPersistence> SupabaseAuthProvider<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, persistence: S) -> AuthResult<Self> {
        Ok(Self {
            state: Arc::new(ProviderState {
                gotrue: GoTrue::new(url.as_ref(), anon_key.into())?,
                persistence,
                session: Mutex::new(None),
                restored: AtomicBool::new(false),
                identity: AuthStateNotifier::new(),
            }),
        })
    }

    /// Session currently held, if signed in
    pub fn session(&self) -> Option<AuthSession> {
        self.state.session().clone()
    }

    /// Identity last announced to subscribers
    pub fn current_identity(&self) -> Option<Identity> {
        self.state.identity.current()
    }

    /// Load the persisted session, refreshing it when expired, and announce it.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        self.state.restored.store(true, Ordering::SeqCst);
        let Some(stored) = self.state.persistence.load_session()? else {
            return Ok(None);
        };
        Ok(self.state.resume(stored).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let session = self.state.gotrue.password(email, password).await?;
        self.state.restored.store(true, Ordering::SeqCst);
        self.state.adopt(session)
    }

    /// Exchange the refresh token for a new session; subscribers see the same identity again
    pub async fn refresh(&self) -> AuthResult<AuthSession> {
        let current = self.session().ok_or(AuthError::SignedOut)?;
        let session = self.state.gotrue.refresh(&current).await?;
        self.state.adopt(session)
    }

    /// Revoke the held session (if any), forget it, and announce the sign-out
    pub async fn sign_out(&self) -> AuthResult<()> {
        if let Some(session) = self.session() {
            self.state.gotrue.logout(&session).await?;
        }
        self.state.discard()
    }
}

impl<S: SessionPersistence> AuthProvider for SupabaseAuthProvider<S> {
    fn subscribe(&self, listener: AuthListener) -> Subscription {
        self.state.restore_on_subscribe();
        self.state.identity.subscribe(listener)
    }
}

impl<S> fmt::Debug for SupabaseAuthProvider<S> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseAuthProvider")
            .field("auth_url", &self.state.gotrue.auth_url)
            .finish_non_exhaustive()
    }
}

/// `https://<project>.supabase.co` (with or without `/auth/v1`) to the auth base URL
pub fn auth_endpoint(url: &str) -> AuthResult<String> {
    let base = url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !is_http_url(base) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    Ok(if base.ends_with("/auth/v1") {
        base.to_string()
    } else {
        format!("{base}/auth/v1")
    })
}

async fn ensure_success(response: Response) -> AuthResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AuthError::Api(describe_failure(status, &body)))
}

#[derive(Deserialize)]
struct TokenGrant {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<AuthUser>,
}

impl TokenGrant {
    fn into_session(self) -> AuthResult<AuthSession> {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|ttl| unix_timestamp_now().saturating_add(ttl)));
        match (self.access_token, self.refresh_token, expires_at, self.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user,
                })
            }
            _ => Err(AuthError::Api(
                "Auth response did not include an active session".to_string(),
            )),
        }
    }
}

#[derive(Deserialize)]
struct FailureBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<FailureBody>(body)
        .ok()
        .and_then(|failure| {
            failure
                .message
                .or(failure.msg)
                .or(failure.error_description)
                .or(failure.error)
        })
        .map_or_else(|| compact_text(body), |message| message.trim().to_string());
    if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{detail} ({})", status.as_u16())
    }
}
