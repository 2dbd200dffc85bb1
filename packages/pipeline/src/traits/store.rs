//! Manifest store trait.
//!
//! The shared filesystem namespace is modelled as an explicit store
//! interface with atomic create/load/save; implementations may back onto
//! an embedded or networked store instead of bare files, as long as the
//! same atomicity contracts hold. The store never interprets outcome
//! payloads; it only indexes by document id.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::manifest::{DocumentId, Manifest, Provenance, StepResult};

/// Durable, per-document manifest storage.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Create a manifest for a newly ingested document.
    ///
    /// Fails with [`crate::error::StoreError::AlreadyExists`] if one is
    /// already recorded - ingestion must be idempotent at the caller.
    async fn create(&self, doc_id: DocumentId, provenance: Provenance) -> StoreResult<Manifest>;

    /// Load the manifest for a document.
    ///
    /// Fails with `NotFound` if absent and `Corrupt` if unparseable.
    async fn load(&self, doc_id: &DocumentId) -> StoreResult<Manifest>;

    /// Persist a manifest atomically - a concurrent reader never
    /// observes a half-written manifest.
    async fn save(&self, manifest: &Manifest) -> StoreResult<()>;

    /// Whether a manifest is recorded for the document.
    async fn exists(&self, doc_id: &DocumentId) -> StoreResult<bool>;

    /// All document ids with a recorded manifest.
    async fn list(&self) -> StoreResult<Vec<DocumentId>>;

    /// Remove a manifest (archival when a document leaves the system).
    async fn delete(&self, doc_id: &DocumentId) -> StoreResult<()>;

    /// Result recorded for a step in a manifest, by name.
    fn get_step<'m>(&self, manifest: &'m Manifest, step_name: &str) -> Option<&'m StepResult> {
        manifest.step(step_name)
    }
}
