//! In-memory manifest store for testing and development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::ManifestStore;
use crate::types::manifest::{DocumentId, Manifest, Provenance};

/// In-memory manifest storage.
///
/// Useful for testing and development. Not suitable for production as
/// data is lost on restart.
pub struct MemoryStore {
    manifests: RwLock<HashMap<DocumentId, Manifest>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            manifests: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored manifests.
    pub fn clear(&self) {
        self.manifests.write().unwrap().clear();
    }

    /// Number of stored manifests.
    pub fn manifest_count(&self) -> usize {
        self.manifests.read().unwrap().len()
    }
}

#[async_trait]
impl ManifestStore for MemoryStore {
    async fn create(&self, doc_id: DocumentId, provenance: Provenance) -> StoreResult<Manifest> {
        let mut manifests = self.manifests.write().unwrap();
        if manifests.contains_key(&doc_id) {
            return Err(StoreError::AlreadyExists {
                doc_id: doc_id.to_string(),
            });
        }
        let manifest = Manifest::new(doc_id.clone(), provenance);
        manifests.insert(doc_id, manifest.clone());
        Ok(manifest)
    }

    async fn load(&self, doc_id: &DocumentId) -> StoreResult<Manifest> {
        self.manifests
            .read()
            .unwrap()
            .get(doc_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                doc_id: doc_id.to_string(),
            })
    }

    async fn save(&self, manifest: &Manifest) -> StoreResult<()> {
        self.manifests
            .write()
            .unwrap()
            .insert(manifest.doc_id.clone(), manifest.clone());
        Ok(())
    }

    async fn exists(&self, doc_id: &DocumentId) -> StoreResult<bool> {
        Ok(self.manifests.read().unwrap().contains_key(doc_id))
    }

    async fn list(&self) -> StoreResult<Vec<DocumentId>> {
        let mut ids: Vec<_> = self.manifests.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, doc_id: &DocumentId) -> StoreResult<()> {
        self.manifests
            .write()
            .unwrap()
            .remove(doc_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                doc_id: doc_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_load_delete() {
        let store = MemoryStore::new();
        let id = DocumentId::parse("A_1_001").unwrap();

        store
            .create(id.clone(), Provenance::minimal("A_1_001.txt", b"x"))
            .await
            .unwrap();
        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.manifest_count(), 1);

        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
        assert!(matches!(
            store.load(&id).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
