//! Execution runner - drives a single document to quiescence.
//!
//! Per-document state machine: {queued, processing, completed,
//! dead-lettered}. The queued→processing transition is the atomic rename
//! into `processing/` plus manifest creation/load. While processing, the
//! runner loops over the runnable set, executing steps sequentially and
//! persisting each result; the loop ends in `completed` or hands off to
//! the dead-letter handler. Parallelism is across documents - run
//! several independent runners over the same work directory.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dead_letter::{self, ErrorRecord};
use crate::error::{PipelineError, Result, StepError, StoreError};
use crate::invalidation;
use crate::registry::StepRegistry;
use crate::traits::step::{Step, StepOutput};
use crate::traits::store::ManifestStore;
use crate::types::config::RunnerConfig;
use crate::types::manifest::{DocumentId, Manifest, OutcomeMap, Provenance, StepResult};
use crate::workdir::WorkDir;

/// Terminal outcome of one document run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every registered step is recorded success-or-skipped at its
    /// current version; the document moved to `completed/`.
    Completed,

    /// A step failed permanently; the document moved to `dead_letters/`.
    DeadLettered { step: String },

    /// The run was cancelled mid-flight. The document stays in
    /// `processing/` with a manifest reflecting completed prior steps -
    /// a recoverable state, picked up by the orphan sweep.
    Cancelled,
}

/// A document claimed out of the inbox.
#[derive(Debug, Clone)]
pub struct ClaimedDocument {
    pub doc_id: DocumentId,
    pub file_name: String,
    pub path: PathBuf,
}

/// What one step invocation produced, retries already applied.
enum StepExecution {
    Recorded(StepResult, Option<OutcomeMap>),
    Cancelled,
}

/// Drives documents through the registered steps.
pub struct Runner<S: ManifestStore> {
    registry: Arc<StepRegistry>,
    store: Arc<S>,
    workdir: WorkDir,
    config: RunnerConfig,
    cancel: CancellationToken,
    worker_id: String,
}

impl<S: ManifestStore> Runner<S> {
    /// Create a runner with default configuration.
    pub fn new(registry: Arc<StepRegistry>, store: Arc<S>, workdir: WorkDir) -> Self {
        Self {
            registry,
            store,
            workdir,
            config: RunnerConfig::default(),
            cancel: CancellationToken::new(),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Replace the runner configuration.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// This runner's worker identifier (appears in logs and dead-letter
    /// records).
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim the next inbox document, if any.
    ///
    /// Concurrent runners race on the atomic rename; losing a race moves
    /// on to the next candidate.
    pub async fn claim_next(&self) -> Result<Option<ClaimedDocument>> {
        for file_name in self.workdir.list_inbox().await? {
            let stem = std::path::Path::new(&file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&file_name);
            let doc_id = DocumentId::from_file_stem(stem)?;
            if let Some(path) = self.workdir.claim(&file_name).await? {
                return Ok(Some(ClaimedDocument {
                    doc_id,
                    file_name,
                    path,
                }));
            }
        }
        Ok(None)
    }

    /// Claim and process one document. Returns `None` when the inbox is
    /// empty.
    pub async fn run_once(&self) -> Result<Option<(DocumentId, RunOutcome)>> {
        match self.claim_next().await? {
            Some(claimed) => {
                let doc_id = claimed.doc_id.clone();
                let outcome = self.process(claimed).await?;
                Ok(Some((doc_id, outcome)))
            }
            None => Ok(None),
        }
    }

    /// Process documents until the inbox is empty or the runner is
    /// cancelled.
    pub async fn drain(&self) -> Result<Vec<(DocumentId, RunOutcome)>> {
        let mut outcomes = Vec::new();
        while !self.cancel.is_cancelled() {
            match self.run_once().await? {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        Ok(outcomes)
    }

    /// Requeue documents orphaned in `processing/` by a terminated
    /// process. Run before claiming starts.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>> {
        self.workdir.sweep_orphans().await
    }

    /// Resume a dead-lettered document from `from_step` (see
    /// [`dead_letter::resume`]).
    pub async fn resume(&self, doc_id: &DocumentId, from_step: &str) -> Result<()> {
        dead_letter::resume(&self.workdir, self.store.as_ref(), &self.registry, doc_id, from_step)
            .await
    }

    /// Drive a claimed document to quiescence.
    pub async fn process(&self, claimed: ClaimedDocument) -> Result<RunOutcome> {
        let ClaimedDocument {
            doc_id,
            file_name,
            path,
        } = claimed;

        let mut manifest = match self.store.load(&doc_id).await {
            Ok(manifest) => manifest,
            Err(StoreError::NotFound { .. }) => {
                // Admitted without prior ingestion; create a minimal
                // manifest from the file itself.
                let content = tokio::fs::read(&path).await?;
                self.store
                    .create(doc_id.clone(), Provenance::minimal(&file_name, &content))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };
        manifest.mark_processing();
        self.store.save(&manifest).await?;

        info!(doc_id = %doc_id, worker = %self.worker_id, "processing document");

        loop {
            if self.cancel.is_cancelled() {
                info!(doc_id = %doc_id, "cancelled; leaving document in processing");
                return Ok(RunOutcome::Cancelled);
            }

            let runnable =
                invalidation::runnable_steps(&self.registry, &manifest, self.config.retry_failed);

            if runnable.is_empty() {
                if invalidation::is_complete(&self.registry, &manifest) {
                    manifest.mark_completed();
                    self.store.save(&manifest).await?;
                    self.workdir.release_completed(&file_name).await?;
                    dead_letter::remove_error_record(&self.workdir, &doc_id).await?;
                    info!(doc_id = %doc_id, steps = manifest.step_count(), "document completed");
                    return Ok(RunOutcome::Completed);
                }
                // No runnable step, incomplete manifest: an earlier
                // failed result is blocking without having dead-lettered.
                return Err(PipelineError::Stalled {
                    doc_id: doc_id.to_string(),
                });
            }

            for step in runnable {
                if self.cancel.is_cancelled() {
                    info!(doc_id = %doc_id, "cancelled; leaving document in processing");
                    return Ok(RunOutcome::Cancelled);
                }

                let execution = self.execute_step(step.as_ref(), &path, &manifest).await;
                let (result, metadata) = match execution {
                    StepExecution::Recorded(result, metadata) => (result, metadata),
                    StepExecution::Cancelled => {
                        info!(doc_id = %doc_id, "cancelled mid-step; leaving document in processing");
                        return Ok(RunOutcome::Cancelled);
                    }
                };

                let failed = result.error.clone();
                let step_name = result.step_name.clone();
                manifest.record_step(result);
                if let Some(metadata) = metadata {
                    manifest.set_metadata(metadata);
                }
                self.store.save(&manifest).await?;

                if let Some(error) = failed {
                    return self
                        .dead_letter(&mut manifest, &file_name, &step_name, &error)
                        .await;
                }
            }
        }
    }

    /// Execute one step with timeout, transient retries, and backoff.
    async fn execute_step(
        &self,
        step: &dyn Step,
        doc_path: &std::path::Path,
        manifest: &Manifest,
    ) -> StepExecution {
        let name = step.name();
        let version = step.version();
        let started_at = Utc::now();

        let mut attempt = 1u32;
        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return StepExecution::Cancelled,
                result = tokio::time::timeout(self.config.step_timeout, step.execute(doc_path, manifest)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_) => Err(StepError::transient(format!(
                            "timed out after {:?}",
                            self.config.step_timeout
                        ))),
                    }
                }
            };

            match outcome {
                Ok(StepOutput::Completed(outcome)) => {
                    info!(step = name, version, attempt, "step succeeded");
                    return StepExecution::Recorded(
                        StepResult::success(name, version, started_at, outcome),
                        None,
                    );
                }
                Ok(StepOutput::Skipped { reason }) => {
                    info!(step = name, version, reason = %reason, "step skipped");
                    return StepExecution::Recorded(
                        StepResult::skipped(name, version, started_at, reason),
                        None,
                    );
                }
                Ok(StepOutput::CompletedWithMetadata { outcome, metadata }) => {
                    if self.registry.metadata_assembler() != Some(name) {
                        // Contract violation: only the designated
                        // terminal step may write consolidated metadata.
                        let error = format!(
                            "step {name} returned consolidated metadata but is not the metadata assembler"
                        );
                        warn!(step = name, "{error}");
                        return StepExecution::Recorded(
                            StepResult::failed(name, version, started_at, error),
                            None,
                        );
                    }
                    info!(step = name, version, attempt, "step succeeded (metadata assembled)");
                    return StepExecution::Recorded(
                        StepResult::success(name, version, started_at, outcome),
                        Some(metadata),
                    );
                }
                Err(StepError::Transient(message)) if attempt < self.config.max_attempts => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        step = name,
                        attempt,
                        error = %message,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure; retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return StepExecution::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(StepError::Transient(message)) => {
                    // Retry budget exhausted: escalate to permanent.
                    let error = format!(
                        "transient failure persisted through {} attempts: {message}",
                        self.config.max_attempts
                    );
                    warn!(step = name, "{error}");
                    return StepExecution::Recorded(
                        StepResult::failed(name, version, started_at, error),
                        None,
                    );
                }
                Err(StepError::Permanent(message)) => {
                    warn!(step = name, error = %message, "permanent failure");
                    return StepExecution::Recorded(
                        StepResult::failed(name, version, started_at, message),
                        None,
                    );
                }
            }
        }
    }

    /// Hand a failed document to the dead-letter area.
    async fn dead_letter(
        &self,
        manifest: &mut Manifest,
        file_name: &str,
        failed_step: &str,
        error: &str,
    ) -> Result<RunOutcome> {
        manifest.mark_failed(format!("step {failed_step} failed: {error}"));
        self.store.save(manifest).await?;

        // Record first, then move: a failed document is never visible in
        // dead_letters/ without its annotation, and a record-write
        // failure aborts the run with the document still in processing/.
        let record = ErrorRecord::new(manifest, failed_step, error, &self.worker_id);
        dead_letter::write_error_record(&self.workdir, &record).await?;
        self.workdir.quarantine(file_name).await?;

        warn!(
            doc_id = %manifest.doc_id,
            step = failed_step,
            error = %error,
            "document dead-lettered"
        );
        Ok(RunOutcome::DeadLettered {
            step: failed_step.to_string(),
        })
    }
}
