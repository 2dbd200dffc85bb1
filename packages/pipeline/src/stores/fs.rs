//! Filesystem-backed manifest store.
//!
//! One pretty-printed JSON file per document under a `manifests/`
//! directory. Saves are atomic: content is written to a `.tmp` sibling
//! and renamed into place, so a concurrent reader only ever observes a
//! complete manifest.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::ManifestStore;
use crate::types::manifest::{DocumentId, Manifest, Provenance};

/// Atomically write serialized JSON: temp-file write, then rename.
pub(crate) async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    match tokio::fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(StoreError::Io(e))
        }
    }
}

/// Manifest store over a directory of `<doc_id>.json` files.
pub struct FsManifestStore {
    dir: PathBuf,
}

impl FsManifestStore {
    /// Create a store over the given directory, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Path of the manifest file for a document.
    pub fn manifest_path(&self, doc_id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{doc_id}.json"))
    }
}

#[async_trait]
impl ManifestStore for FsManifestStore {
    async fn create(&self, doc_id: DocumentId, provenance: Provenance) -> StoreResult<Manifest> {
        if self.exists(&doc_id).await? {
            return Err(StoreError::AlreadyExists {
                doc_id: doc_id.to_string(),
            });
        }
        let manifest = Manifest::new(doc_id, provenance);
        self.save(&manifest).await?;
        Ok(manifest)
    }

    async fn load(&self, doc_id: &DocumentId) -> StoreResult<Manifest> {
        let path = self.manifest_path(doc_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    doc_id: doc_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            doc_id: doc_id.to_string(),
            source,
        })
    }

    async fn save(&self, manifest: &Manifest) -> StoreResult<()> {
        write_json_atomic(&self.manifest_path(&manifest.doc_id), manifest).await
    }

    async fn exists(&self, doc_id: &DocumentId) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.manifest_path(doc_id)).await?)
    }

    async fn list(&self) -> StoreResult<Vec<DocumentId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match DocumentId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => warn!(file = %path.display(), "skipping non-manifest file"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, doc_id: &DocumentId) -> StoreResult<()> {
        match tokio::fs::remove_file(self.manifest_path(doc_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                doc_id: doc_id.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::manifest::{StepResult as RecordedStep, StepStatus};
    use chrono::Utc;

    async fn store() -> (tempfile::TempDir, FsManifestStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::open(dir.path().join("manifests"))
            .await
            .unwrap();
        (dir, store)
    }

    fn doc_id() -> DocumentId {
        DocumentId::parse("A_1_001").unwrap()
    }

    #[tokio::test]
    async fn test_create_then_load_round_trips() {
        let (_guard, store) = store().await;
        let created = store
            .create(doc_id(), Provenance::minimal("A_1_001.txt", b"body"))
            .await
            .unwrap();

        let loaded = store.load(&doc_id()).await.unwrap();
        assert_eq!(loaded.doc_id, created.doc_id);
        assert_eq!(loaded.provenance.content_hash, created.provenance.content_hash);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let (_guard, store) = store().await;
        store
            .create(doc_id(), Provenance::minimal("A_1_001.txt", b"body"))
            .await
            .unwrap();
        let err = store
            .create(doc_id(), Provenance::minimal("A_1_001.txt", b"body"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let (_guard, store) = store().await;
        let err = store.load(&doc_id()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_corrupt_is_corrupt() {
        let (_guard, store) = store().await;
        tokio::fs::write(store.manifest_path(&doc_id()), b"{ not json")
            .await
            .unwrap();
        let err = store.load(&doc_id()).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_save_replaces_and_leaves_no_temp_files() {
        let (_guard, store) = store().await;
        let mut manifest = store
            .create(doc_id(), Provenance::minimal("A_1_001.txt", b"body"))
            .await
            .unwrap();
        manifest.record_step(RecordedStep::success(
            "classify",
            1,
            Utc::now(),
            Default::default(),
        ));
        store.save(&manifest).await.unwrap();

        let loaded = store.load(&doc_id()).await.unwrap();
        assert_eq!(loaded.step("classify").unwrap().status, StepStatus::Success);

        let mut entries = tokio::fs::read_dir(store.manifest_path(&doc_id()).parent().unwrap())
            .await
            .unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert!(
                entry.path().extension().and_then(|e| e.to_str()) == Some("json"),
                "unexpected file: {:?}",
                entry.path()
            );
        }
    }

    #[tokio::test]
    async fn test_list_returns_sorted_ids() {
        let (_guard, store) = store().await;
        for id in ["B_2_002", "A_1_001"] {
            store
                .create(
                    DocumentId::parse(id).unwrap(),
                    Provenance::minimal(format!("{id}.txt"), b"x"),
                )
                .await
                .unwrap();
        }
        let ids = store.list().await.unwrap();
        let raw: Vec<_> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(raw, vec!["A_1_001", "B_2_002"]);
    }
}
