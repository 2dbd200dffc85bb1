//! Dead-letter handling - quarantine of permanently failed documents.
//!
//! On permanent failure the document moves to `dead_letters/` next to a
//! `<doc_id>.error.json` record carrying enough context to diagnose
//! without re-running anything: the failed step, the error, the last
//! successful step, and a full manifest snapshot. Writing the record and
//! moving the document is one logical operation - if the record cannot
//! be written after retries the failure is fatal to the engine run, so a
//! document is never left in `processing/` un-annotated.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::invalidation;
use crate::registry::StepRegistry;
use crate::stores::fs::write_json_atomic;
use crate::traits::store::ManifestStore;
use crate::types::manifest::{DocumentId, Manifest};
use crate::workdir::WorkDir;

const RECORD_WRITE_ATTEMPTS: u32 = 3;
const RECORD_WRITE_DELAY: Duration = Duration::from_millis(250);

/// Diagnostic record written alongside a dead-lettered document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The failed document.
    pub doc_id: DocumentId,

    /// Name of the step whose failure dead-lettered the document.
    pub failed_step: String,

    /// Error description from the failing step.
    pub error: String,

    /// The most recently successful step before the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_step: Option<String>,

    /// When the document was dead-lettered.
    pub failed_at: DateTime<Utc>,

    /// Identifier of the worker that was processing the document.
    pub worker_id: String,

    /// Full manifest snapshot at time of failure.
    pub manifest: Manifest,
}

impl ErrorRecord {
    /// Build a record from the manifest at time of failure.
    pub fn new(
        manifest: &Manifest,
        failed_step: impl Into<String>,
        error: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: manifest.doc_id.clone(),
            failed_step: failed_step.into(),
            error: error.into(),
            last_successful_step: manifest
                .last_successful_step()
                .map(|r| r.step_name.clone()),
            failed_at: Utc::now(),
            worker_id: worker_id.into(),
            manifest: manifest.clone(),
        }
    }
}

/// Write the error record, retrying a bounded number of times.
///
/// Exhausting the retries is engine-fatal, never silently swallowed.
pub async fn write_error_record(workdir: &WorkDir, record: &ErrorRecord) -> Result<()> {
    let path = workdir.error_record_path(&record.doc_id);
    let mut last_err = None;
    for attempt in 1..=RECORD_WRITE_ATTEMPTS {
        match write_json_atomic(&path, record).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    doc_id = %record.doc_id,
                    attempt,
                    error = %e,
                    "error record write failed"
                );
                last_err = Some(e);
                if attempt < RECORD_WRITE_ATTEMPTS {
                    tokio::time::sleep(RECORD_WRITE_DELAY).await;
                }
            }
        }
    }

    let source = match last_err {
        Some(crate::error::StoreError::Io(e)) => e,
        Some(other) => std::io::Error::other(other.to_string()),
        None => std::io::Error::other("unknown error"),
    };
    error!(doc_id = %record.doc_id, "giving up on error record write");
    Err(PipelineError::DeadLetterWrite {
        doc_id: record.doc_id.to_string(),
        attempts: RECORD_WRITE_ATTEMPTS,
        source,
    })
}

/// Load the error record for a dead-lettered document.
pub async fn read_error_record(workdir: &WorkDir, doc_id: &DocumentId) -> Result<ErrorRecord> {
    let path = workdir.error_record_path(doc_id);
    let bytes = tokio::fs::read(&path).await?;
    let record =
        serde_json::from_slice(&bytes).map_err(crate::error::StoreError::Serialize)?;
    Ok(record)
}

/// All error records currently in `dead_letters/`, sorted by document id.
pub async fn list_error_records(workdir: &WorkDir) -> Result<Vec<ErrorRecord>> {
    let mut records = Vec::new();
    let mut entries = tokio::fs::read_dir(workdir.dead_letters()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(".error.json") else {
            continue;
        };
        let Ok(doc_id) = DocumentId::parse(stem) else {
            warn!(file = %name, "skipping unrecognized file in dead_letters");
            continue;
        };
        records.push(read_error_record(workdir, &doc_id).await?);
    }
    records.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    Ok(records)
}

/// Remove the error record once the document has re-completed.
/// Best-effort: a missing record is not an error.
pub async fn remove_error_record(workdir: &WorkDir, doc_id: &DocumentId) -> Result<()> {
    match tokio::fs::remove_file(workdir.error_record_path(doc_id)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::Io(e)),
    }
}

/// Resume a dead-lettered document from `from_step`.
///
/// Clears the recorded result for `from_step` and everything downstream
/// of it (the invalidation cascade), marks the manifest processing, and
/// moves the document back to `inbox/`. The error record stays in place
/// until the document re-completes.
pub async fn resume<S: ManifestStore>(
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

    let mut manifest = store.load(doc_id).await?;
    let cleared = invalidation::invalidate(&mut manifest, from_step, registry);
    manifest.mark_processing();
    store.save(&manifest).await?;

    let file_name = workdir
        .find_document(&workdir.dead_letters(), doc_id)
        .await?
        .ok_or_else(|| PipelineError::DocumentMissing {
            doc_id: doc_id.to_string(),
            location: workdir.dead_letters().display().to_string(),
        })?;
    workdir.requeue_dead_letter(&file_name).await?;

    info!(
        doc_id = %doc_id,
        from_step,
        cleared = ?cleared,
        "resumed dead-lettered document"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::MockStep;
    use crate::types::manifest::{Provenance, StepResult};
    use chrono::Utc;

    async fn fixture() -> (tempfile::TempDir, WorkDir) {
        let dir = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(dir.path());
        workdir.ensure_layout().await.unwrap();
        (dir, workdir)
    }

    fn failed_manifest() -> Manifest {
        let mut manifest = Manifest::new(
            DocumentId::parse("A_1_001").unwrap(),
            Provenance::minimal("A_1_001.txt", b"x"),
        );
        manifest.record_step(StepResult::success(
            "classify",
            1,
            Utc::now(),
            Default::default(),
        ));
        manifest.record_step(StepResult::failed(
            "extract_entities",
            1,
            Utc::now(),
            "bad input",
        ));
        manifest.mark_failed("step extract_entities failed: bad input");
        manifest
    }

    #[tokio::test]
    async fn test_error_record_round_trip() {
        let (_guard, workdir) = fixture().await;
        let manifest = failed_manifest();
        let record = ErrorRecord::new(&manifest, "extract_entities", "bad input", "worker-1");

        write_error_record(&workdir, &record).await.unwrap();
        let loaded = read_error_record(&workdir, &manifest.doc_id).await.unwrap();

        assert_eq!(loaded.failed_step, "extract_entities");
        assert_eq!(loaded.error, "bad input");
        assert_eq!(loaded.last_successful_step.as_deref(), Some("classify"));
        assert_eq!(loaded.manifest.step_count(), 2);
    }

    #[tokio::test]
    async fn test_list_error_records_ignores_document_files() {
        let (_guard, workdir) = fixture().await;
        let manifest = failed_manifest();
        let record = ErrorRecord::new(&manifest, "extract_entities", "bad input", "worker-1");
        write_error_record(&workdir, &record).await.unwrap();
        tokio::fs::write(workdir.dead_letters().join("A_1_001.txt"), b"x")
            .await
            .unwrap();

        let records = list_error_records(&workdir).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doc_id, manifest.doc_id);
    }

    #[tokio::test]
    async fn test_remove_error_record_is_idempotent() {
        let (_guard, workdir) = fixture().await;
        let doc_id = DocumentId::parse("A_1_001").unwrap();
        remove_error_record(&workdir, &doc_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_clears_cascade_and_requeues() {
        let (_guard, workdir) = fixture().await;
        let store = MemoryStore::new();
        let registry = StepRegistry::builder()
            .register(MockStep::new("classify", 1))
            .register(MockStep::new("extract_entities", 1).with_dependencies(["classify"]))
            .build()
            .unwrap();

        let manifest = failed_manifest();
        let doc_id = manifest.doc_id.clone();
        store.save(&manifest).await.unwrap();
        tokio::fs::write(workdir.dead_letters().join("A_1_001.txt"), b"x")
            .await
            .unwrap();

        resume(&workdir, &store, &registry, &doc_id, "extract_entities")
            .await
            .unwrap();

        let resumed = store.load(&doc_id).await.unwrap();
        assert!(resumed.has_step("classify"));
        assert!(!resumed.has_step("extract_entities"));
        assert_eq!(
            resumed.status,
            crate::types::manifest::DocumentStatus::Processing
        );

        let counts = workdir.status_counts().await.unwrap();
        assert_eq!(counts.inbox, 1);
        assert_eq!(counts.dead_letters, 0);
    }
}
