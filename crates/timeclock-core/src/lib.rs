//! timeclock-core - Core library for Timeclock
//!
//! This crate contains the attendance log models, the document store contract
//! and its backends, and the session tracker that ties authentication state to
//! a user's log. The CLI (and any other front end) is a thin layer on top.

pub mod attendance;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod util;

pub use attendance::AttendanceLogStore;
pub use auth::{AuthProvider, AuthStateNotifier, Identity, Subscription};
pub use error::{Error, Result};
pub use models::{LogEntry, LogKind, UserRecord};
pub use session::{PendingWrite, SessionPhase, SessionSnapshot, SessionTracker};
pub use store::{DocumentKey, DocumentStore, FieldUpdate, StoreError};
