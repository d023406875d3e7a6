//! Attendance log store: read and append a user's log in the document store.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{LogEntry, UserRecord, ATTENDANCE_FIELD};
use crate::store::{DocumentKey, DocumentStore, FieldUpdate};

/// Reads and appends entries of the per-user attendance log
///
/// Cheap to clone; clones share the underlying document store.
pub struct AttendanceLogStore<D> {
    documents: Arc<D>,
}

impl<D> Clone for AttendanceLogStore<D> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
        }
    }
}

impl<D: DocumentStore> AttendanceLogStore<D> {
    pub fn new(documents: D) -> Self {
        Self {
            documents: Arc::new(documents),
        }
    }

    /// The backing document store
    pub fn documents(&self) -> &D {
        &self.documents
    }

    /// Read the user's log in stored order.
    ///
    /// A user without a record has an empty log; that is not an error.
    pub async fn fetch_log(&self, uid: &str) -> Result<Vec<LogEntry>> {
        let (uid, key) = user_key(uid)?;
        tracing::debug!("Fetching attendance log for user {}", uid);

        let Some(document) = self.documents.get(&key).await.map_err(Error::Read)? else {
            tracing::debug!("No user record for {}; log is empty", uid);
            return Ok(Vec::new());
        };

        let record = UserRecord::from_document(&document);
        tracing::debug!(
            "Fetched {} attendance entries for user {}",
            record.attendance.len(),
            uid
        );
        Ok(record.attendance)
    }

    /// Union `entry` into the user's stored log.
    ///
    /// The entry is present afterwards, but its position relative to appends
    /// from other sessions is not guaranteed. The user record must already exist.
    pub async fn append_log(&self, uid: &str, entry: &LogEntry) -> Result<()> {
        let (uid, key) = user_key(uid)?;
        let value = serde_json::to_value(entry)?;

        self.documents
            .update(&key, ATTENDANCE_FIELD, FieldUpdate::union_one(value))
            .await
            .map_err(Error::Write)?;

        tracing::debug!("Appended {} entry {} for user {}", entry.kind, entry.id, uid);
        Ok(())
    }

    /// Create an empty record for `uid` if none exists. Returns whether one was created.
    ///
    /// Administrative provisioning; the log workflow never calls this.
    pub async fn provision_user(&self, uid: &str) -> Result<bool> {
        let (_, key) = user_key(uid)?;
        if self.documents.get(&key).await.map_err(Error::Read)?.is_some() {
            return Ok(false);
        }
        self.documents
            .create(&key, UserRecord::empty_document())
            .await
            .map_err(Error::Write)?;
        tracing::info!("Provisioned user record {}", key);
        Ok(true)
    }
}

/// Record key for `uid`, keyed the same way [`crate::Identity`] normalizes ids
fn user_key(uid: &str) -> Result<(&str, DocumentKey)> {
    let uid = uid.trim();
    if uid.is_empty() {
        return Err(Error::InvalidInput("user id must not be empty".to_string()));
    }
    Ok((uid, DocumentKey::user(uid)))
}
