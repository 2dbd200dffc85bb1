//! Recovery and administration operations.
//!
//! The operator surface over a pipeline directory: status counts, dead
//! letter inspection, invalidation queries, and reprocessing. These are
//! library functions; packaging them behind a CLI is a caller concern.

use tracing::info;

use crate::dead_letter::{self, ErrorRecord};
use crate::error::{PipelineError, Result};
use crate::invalidation;
use crate::registry::StepRegistry;
use crate::traits::store::ManifestStore;
use crate::types::manifest::DocumentId;
use crate::workdir::{StatusCounts, WorkDir};

/// Document counts per pipeline area.
pub async fn pipeline_status(workdir: &WorkDir) -> Result<StatusCounts> {
    workdir.status_counts().await
}

/// Error records for every dead-lettered document.
pub async fn list_dead_letters(workdir: &WorkDir) -> Result<Vec<ErrorRecord>> {
    dead_letter::list_error_records(workdir).await
}

/// Documents whose recorded version of `step_name` is older than
/// `new_version` - the set a version bump will invalidate.
pub async fn list_invalidated<S: ManifestStore>(
    store: &S,
    step_name: &str,
    new_version: u32,
) -> Result<Vec<DocumentId>> {
    invalidation::find_invalidated(store, step_name, new_version).await
}

/// Requeue a terminal document for reprocessing from `from_step`.
///
/// Works on both completed and dead-lettered documents: clears
/// `from_step` plus its downstream closure from the manifest and moves
/// the document file back to `inbox/`.
pub async fn reprocess<S: ManifestStore>(
    workdir: &WorkDir,
    store: &S,
    registry: &StepRegistry,
    doc_id: &DocumentId,
    from_step: &str,
) -> Result<()> {
    if !registry.contains(from_step) {
        return Err(PipelineError::UnknownStep {
            name: from_step.to_string(),
        });
    }

    if workdir
        .find_document(&workdir.dead_letters(), doc_id)
        .await?
        .is_some()
    {
        return dead_letter::resume(workdir, store, registry, doc_id, from_step).await;
    }

    let file_name = workdir
        .find_document(&workdir.completed(), doc_id)
        .await?
        .ok_or_else(|| PipelineError::DocumentMissing {
            doc_id: doc_id.to_string(),
            location: "completed or dead_letters".to_string(),
        })?;

    let mut manifest = store.load(doc_id).await?;
    let cleared = invalidation::invalidate(&mut manifest, from_step, registry);
    manifest.mark_processing();
    store.save(&manifest).await?;
    workdir.requeue_completed(&file_name).await?;

    info!(doc_id = %doc_id, from_step, cleared = ?cleared, "requeued for reprocessing");
    Ok(())
}
