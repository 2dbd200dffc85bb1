//! Pipeline work directory - the authoritative filesystem state.
//!
//! ```text
//! inbox/            new documents awaiting pickup
//! processing/       documents with an in-flight execution
//! completed/        terminal-success documents
//! dead_letters/     terminal-failure documents + <id>.error.json
//! manifests/        <doc_id>.json manifest files
//! entity_seed.json  read-only reference data
//! ```
//!
//! The filesystem's atomic rename is the sole concurrency primitive: a
//! document is never represented in two areas simultaneously, and at
//! most one mover can win the rename into `processing/`. No in-process
//! locking is used.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::types::manifest::DocumentId;

pub const INBOX: &str = "inbox";
pub const PROCESSING: &str = "processing";
pub const COMPLETED: &str = "completed";
pub const DEAD_LETTERS: &str = "dead_letters";
pub const MANIFESTS: &str = "manifests";
pub const ENTITY_SEED: &str = "entity_seed.json";

/// Document counts per pipeline area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub inbox: usize,
    pub processing: usize,
    pub completed: usize,
    pub dead_letters: usize,
}

/// Handle over the pipeline's root directory.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Create a handle over `root`. Call [`WorkDir::ensure_layout`]
    /// before first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the area directories if missing.
    pub async fn ensure_layout(&self) -> Result<()> {
        for area in [INBOX, PROCESSING, COMPLETED, DEAD_LETTERS, MANIFESTS] {
            tokio::fs::create_dir_all(self.root.join(area)).await?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inbox(&self) -> PathBuf {
        self.root.join(INBOX)
    }

    pub fn processing(&self) -> PathBuf {
        self.root.join(PROCESSING)
    }

    pub fn completed(&self) -> PathBuf {
        self.root.join(COMPLETED)
    }

    pub fn dead_letters(&self) -> PathBuf {
        self.root.join(DEAD_LETTERS)
    }

    pub fn manifests(&self) -> PathBuf {
        self.root.join(MANIFESTS)
    }

    /// Path of the read-only entity seed snapshot.
    pub fn entity_seed_path(&self) -> PathBuf {
        self.root.join(ENTITY_SEED)
    }

    /// Path of the dead-letter error record for a document.
    pub fn error_record_path(&self, doc_id: &DocumentId) -> PathBuf {
        self.dead_letters().join(format!("{doc_id}.error.json"))
    }

    /// Atomically claim a document out of `inbox/` into `processing/`.
    ///
    /// Returns the new path, or `None` when a concurrent claimer won the
    /// rename first (the loser observes the file already absent).
    pub async fn claim(&self, file_name: &str) -> Result<Option<PathBuf>> {
        let from = self.inbox().join(file_name);
        let to = self.processing().join(file_name);
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => {
                debug!(file = file_name, "claimed into processing");
                Ok(Some(to))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Io(e)),
        }
    }

    /// Document file names currently awaiting pickup, sorted.
    pub async fn list_inbox(&self) -> Result<Vec<String>> {
        self.list_area(&self.inbox()).await
    }

    /// Move a processed document from `processing/` to `completed/`.
    pub async fn release_completed(&self, file_name: &str) -> Result<PathBuf> {
        self.move_between(&self.processing(), &self.completed(), file_name)
            .await
    }

    /// Move a failed document from `processing/` to `dead_letters/`.
    pub async fn quarantine(&self, file_name: &str) -> Result<PathBuf> {
        self.move_between(&self.processing(), &self.dead_letters(), file_name)
            .await
    }

    /// Move a recovered document from `dead_letters/` back to `inbox/`.
    pub async fn requeue_dead_letter(&self, file_name: &str) -> Result<PathBuf> {
        self.move_between(&self.dead_letters(), &self.inbox(), file_name)
            .await
    }

    /// Move a completed document back to `inbox/` for reprocessing.
    pub async fn requeue_completed(&self, file_name: &str) -> Result<PathBuf> {
        self.move_between(&self.completed(), &self.inbox(), file_name)
            .await
    }

    /// Requeue every document left in `processing/`.
    ///
    /// Recovery sweep for documents orphaned by a terminated process;
    /// their manifests reflect only completed prior steps, so execution
    /// resumes from the last recorded step. Must run before workers
    /// start claiming, while no document has an active owner.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>> {
        let orphans = self.list_area(&self.processing()).await?;
        for file_name in &orphans {
            self.move_between(&self.processing(), &self.inbox(), file_name)
                .await?;
            info!(file = %file_name, "requeued orphaned document");
        }
        Ok(orphans)
    }

    /// Find the document file for `doc_id` in an area, matching on the
    /// file stem.
    pub async fn find_document(&self, area: &Path, doc_id: &DocumentId) -> Result<Option<String>> {
        for file_name in self.list_area(area).await? {
            let stem = Path::new(&file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&file_name);
            if stem == doc_id.as_str() {
                return Ok(Some(file_name));
            }
        }
        Ok(None)
    }

    /// Document counts per area.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        Ok(StatusCounts {
            inbox: self.list_area(&self.inbox()).await?.len(),
            processing: self.list_area(&self.processing()).await?.len(),
            completed: self.list_area(&self.completed()).await?.len(),
            dead_letters: self.list_area(&self.dead_letters()).await?.len(),
        })
    }

    async fn move_between(&self, from: &Path, to: &Path, file_name: &str) -> Result<PathBuf> {
        let src = from.join(file_name);
        let dst = to.join(file_name);
        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => Ok(dst),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::DocumentMissing {
                    doc_id: file_name.to_string(),
                    location: from.display().to_string(),
                })
            }
            Err(e) => Err(PipelineError::Io(e)),
        }
    }

    /// Document files in an area, error records excluded, sorted.
    async fn list_area(&self, area: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(area).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".error.json") || name.ends_with(".tmp") {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}
