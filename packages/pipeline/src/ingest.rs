//! Document admission into the pipeline.
//!
//! An arriving file becomes a manifest plus an `inbox/` entry. The
//! document id is derived from the file stem (`SOURCE_BATCH_ORIGINAL_ID`);
//! an optional `<stem>.meta.json` sidecar supplies provenance fields.
//! Sidecar absence is not an error - the provenance then carries only
//! the original filename plus the engine-computed hash and timestamp.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::traits::store::ManifestStore;
use crate::types::manifest::{DocumentId, Provenance, ProvenanceSidecar};
use crate::workdir::WorkDir;

/// Admit a document file into the pipeline.
///
/// Creates the manifest (failing if one already exists - ingestion is
/// idempotent at the caller) and moves the file into `inbox/`. The
/// sidecar, when present, stays behind at the source location.
pub async fn ingest_document<S: ManifestStore>(
    source_path: &Path,
    workdir: &WorkDir,
    store: &S,
) -> Result<DocumentId> {
    let file_name = source_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::InvalidDocumentId {
            id: source_path.display().to_string(),
            reason: "document path has no usable file name",
        })?
        .to_string();
    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file_name);
    let doc_id = DocumentId::from_file_stem(stem)?;

    let content = tokio::fs::read(source_path).await?;
    let sidecar = load_sidecar(source_path).await?;

    let provenance = Provenance {
        source: sidecar.source,
        batch: sidecar.batch,
        batch_date: sidecar.batch_date,
        original_filename: file_name.clone(),
        ingested_at: Utc::now(),
        content_hash: Provenance::hash_content(&content),
    };

    store.create(doc_id.clone(), provenance).await?;
    tokio::fs::rename(source_path, workdir.inbox().join(&file_name)).await?;

    info!(doc_id = %doc_id, file = %file_name, "document ingested");
    Ok(doc_id)
}

/// Read `<stem>.meta.json` next to the document, if present.
async fn load_sidecar(source_path: &Path) -> Result<ProvenanceSidecar> {
    let sidecar_path = source_path.with_extension("meta.json");
    match tokio::fs::read(&sidecar_path).await {
        Ok(bytes) => {
            debug!(sidecar = %sidecar_path.display(), "provenance sidecar found");
            let sidecar =
                serde_json::from_slice(&bytes).map_err(crate::error::StoreError::Serialize)?;
            Ok(sidecar)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProvenanceSidecar::default()),
        Err(e) => Err(PipelineError::Io(e)),
    }
}
