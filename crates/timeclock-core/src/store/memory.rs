//! In-process document store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Document, DocumentKey, DocumentStore, FieldUpdate, StoreError, StoreResult};

#[derive(Default)]
struct Shared {
    documents: Mutex<HashMap<DocumentKey, Document>>,
    offline: AtomicBool,
    reads: AtomicUsize,
    updates: AtomicUsize,
}

/// Document store kept entirely in memory
///
/// Clones share the same documents. The store can be switched offline to
/// exercise transport failures.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    shared: Arc<Shared>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful `get` calls so far
    pub fn read_count(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `update` calls so far
    pub fn update_count(&self) -> usize {
        self.shared.updates.load(Ordering::SeqCst)
    }

    /// Synchronous snapshot of a document
    pub fn document(&self, key: &DocumentKey) -> Option<Document> {
        self.documents().ok()?.get(key).cloned()
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.shared.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn documents(&self) -> StoreResult<MutexGuard<'_, HashMap<DocumentKey, Document>>> {
        self.shared
            .documents
            .lock()
            .map_err(|error| StoreError::Unavailable(error.to_string()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        self.ensure_online()?;
        let document = self.documents()?.get(key).cloned();
        self.shared.reads.fetch_add(1, Ordering::SeqCst);
        Ok(document)
    }

    async fn update(&self, key: &DocumentKey, field: &str, update: FieldUpdate) -> StoreResult<()> {
        self.ensure_online()?;
        let mut documents = self.documents()?;
        let document = documents
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let mut merged = document.clone();
        update.apply(key, &mut merged, field)?;
        *document = merged;
        drop(documents);

        self.shared.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create(&self, key: &DocumentKey, document: Document) -> StoreResult<()> {
        self.ensure_online()?;
        self.documents()?.insert(key.clone(), document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn clones_share_documents() {
        let store = MemoryDocumentStore::new();
        let clone = store.clone();
        let key = DocumentKey::user("u1");
        store.create(&key, Document::new()).await.unwrap();
        clone
            .update(&key, "attendance", FieldUpdate::union_one(json!("t0")))
            .await
            .unwrap();

        assert_eq!(
            store.document(&key).unwrap().get("attendance"),
            Some(&json!(["t0"]))
        );
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn offline_store_rejects_reads_and_writes() {
        let store = MemoryDocumentStore::new();
        let key = DocumentKey::user("u1");
        store.create(&key, Document::new()).await.unwrap();
        store.set_offline(true);

        assert!(matches!(
            store.get(&key).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store
                .update(&key, "attendance", FieldUpdate::union_one(json!(1)))
                .await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.update_count(), 0);
    }
}
