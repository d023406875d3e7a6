//! libSQL-backed document store (local file, Turso remote, or embedded replica)

use std::path::Path;
use std::sync::Arc;

use libsql::{params, Builder, Connection, Database};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{migrations, Document, DocumentKey, DocumentStore, FieldUpdate, StoreError, StoreResult};
use crate::config::DatabaseConfig;

struct Inner {
    db: Database,
    conn: Connection,
}

/// Document store persisting JSON documents in a libSQL `documents` table
///
/// With a remote URL and a local path the store runs as an embedded replica:
/// reads are served from the local file and writes go to the remote primary.
#[derive(Clone)]
pub struct LibSqlDocumentStore {
    inner: Arc<Mutex<Inner>>,
    config: DatabaseConfig,
}

impl LibSqlDocumentStore {
    /// Open the store described by `config`, running migrations.
    pub async fn open(config: DatabaseConfig) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;

        let db = match (&config.path, &config.remote_url, &config.auth_token) {
            (Some(path), Some(url), Some(token)) => {
                Self::build_replica(path, url, token, &config).await?
            }
            (None, Some(url), Some(token)) => {
                tracing::info!("Using remote document store at {}", url);
                Builder::new_remote(url.clone(), token.clone()).build().await?
            }
            (Some(path), _, _) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|error| StoreError::Unavailable(error.to_string()))?;
                }
                tracing::info!("Running in local-only mode at {}", path.display());
                Builder::new_local(path.to_string_lossy().as_ref())
                    .build()
                    .await?
            }
            (None, _, _) => Builder::new_local(":memory:").build().await?,
        };
        let conn = db.connect()?;

        let store = Self {
            inner: Arc::new(Mutex::new(Inner { db, conn })),
            config,
        };

        // Pull the remote schema first so migrations only run where needed
        store.sync().await?;
        {
            let inner = store.inner.lock().await;
            migrations::run(&inner.conn).await?;
        }
        Ok(store)
    }

    /// Open an in-memory store (useful for testing)
    pub async fn open_in_memory() -> StoreResult<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    /// Open a local-only store at `path`
    pub async fn open_local(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(DatabaseConfig::local(path.as_ref())).await
    }

    async fn build_replica(
        path: &Path,
        url: &str,
        token: &str,
        config: &DatabaseConfig,
    ) -> StoreResult<Database> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        }
        tracing::info!("Sync enabled with remote document store: {}", url);

        let mut builder = Builder::new_remote_replica(
            path.to_string_lossy().to_string(),
            url.to_string(),
            token.to_string(),
        );
        if let Some(interval) = config.sync_interval {
            builder = builder.sync_interval(interval);
            tracing::debug!("Automatic sync interval set to {:?}", interval);
        }
        Ok(builder.build().await?)
    }

    /// Whether this store is an embedded replica of a remote database
    pub const fn is_replica(&self) -> bool {
        self.config.path.is_some() && self.config.is_remote_configured()
    }

    /// Pull remote changes into the local replica (no-op otherwise)
    pub async fn sync(&self) -> StoreResult<()> {
        if self.is_replica() {
            let inner = self.inner.lock().await;
            inner.db.sync().await?;
            tracing::debug!("Document store synced with remote");
        }
        Ok(())
    }

    async fn read_document(conn: &Connection, key: &DocumentKey) -> StoreResult<Option<Document>> {
        let mut rows = conn
            .query(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![key.collection.as_str(), key.id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let body: String = row.get(0)?;
        match serde_json::from_str::<Value>(&body)? {
            Value::Object(document) => Ok(Some(document)),
            _ => Err(StoreError::InvalidDocument {
                key: key.clone(),
                reason: "stored body is not a JSON object".to_string(),
            }),
        }
    }

    async fn write_document(
        conn: &Connection,
        key: &DocumentKey,
        document: &Document,
    ) -> StoreResult<()> {
        let body = serde_json::to_string(document)?;
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO documents (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![key.collection.as_str(), key.id.as_str(), body, now],
        )
        .await?;
        Ok(())
    }

    async fn merge_field(
        conn: &Connection,
        key: &DocumentKey,
        field: &str,
        update: &FieldUpdate,
    ) -> StoreResult<()> {
        let mut document = Self::read_document(conn, key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        update.apply(key, &mut document, field)?;
        Self::write_document(conn, key, &document).await
    }
}

impl DocumentStore for LibSqlDocumentStore {
    async fn get(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        Self::read_document(&inner.conn, key).await
    }

    async fn update(&self, key: &DocumentKey, field: &str, update: FieldUpdate) -> StoreResult<()> {
        let inner = self.inner.lock().await;
        let conn = &inner.conn;

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        if let Err(error) = Self::merge_field(conn, key, field, &update).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error);
        }
        if let Err(error) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        tracing::debug!("Merged field '{}' of {}", field, key);
        Ok(())
    }

    async fn create(&self, key: &DocumentKey, document: Document) -> StoreResult<()> {
        let inner = self.inner.lock().await;
        Self::write_document(&inner.conn, key, &document).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn get_missing_document_is_none() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        assert!(!store.is_replica());
        let document = store.get(&DocumentKey::user("nobody")).await.unwrap();
        assert!(document.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_missing_document_fails_not_found() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let error = store
            .update(
                &DocumentKey::user("nobody"),
                "attendance",
                FieldUpdate::union_one(json!({"id": "t0"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn union_update_merges_into_existing_document() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let key = DocumentKey::user("u1");
        let mut document = Document::new();
        document.insert("name".to_string(), json!("Ada"));
        document.insert("attendance".to_string(), json!([{"id": "t0"}]));
        store.create(&key, document).await.unwrap();

        for id in ["t1", "t0", "t1"] {
            store
                .update(&key, "attendance", FieldUpdate::union_one(json!({ "id": id })))
                .await
                .unwrap();
        }

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&json!("Ada")));
        assert_eq!(
            stored.get("attendance"),
            Some(&json!([{"id": "t0"}, {"id": "t1"}]))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_merge_rolls_back_and_store_stays_usable() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let key = DocumentKey::user("u1");
        let mut document = Document::new();
        document.insert("attendance".to_string(), json!("not-an-array"));
        store.create(&key, document).await.unwrap();

        let error = store
            .update(&key, "attendance", FieldUpdate::union_one(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::InvalidDocument { .. }));

        store
            .update(&key, "other", FieldUpdate::union_one(json!(1)))
            .await
            .unwrap();
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.get("other"), Some(&json!([1])));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_file_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("timeclock.db");
        let key = DocumentKey::user("u1");

        {
            let store = LibSqlDocumentStore::open_local(&path).await.unwrap();
            store.create(&key, Document::new()).await.unwrap();
            store
                .update(&key, "attendance", FieldUpdate::union_one(json!("t0")))
                .await
                .unwrap();
        }

        let reopened = LibSqlDocumentStore::open_local(&path).await.unwrap();
        let stored = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.get("attendance"), Some(&json!(["t0"])));
    }
}
