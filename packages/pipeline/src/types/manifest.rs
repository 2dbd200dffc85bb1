//! Manifest types - the durable per-document execution record.
//!
//! A manifest tracks which steps have run against a document, at which
//! version, with what result. Step history is keyed by step name: a later
//! run of the same step replaces the prior entry in place, so at most one
//! result per step name is active at any time. The step map preserves
//! insertion order and is stable under load→save round-trips.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};

/// Opaque key/value payload produced by a step.
pub type OutcomeMap = serde_json::Map<String, serde_json::Value>;

/// Globally unique document identifier, format `{SOURCE}_{BATCH}_{ORIGINAL_ID}`.
///
/// Used as the manifest's primary key and as the filesystem name component
/// across all pipeline directories. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Parse an id, validating the `SOURCE_BATCH_ORIGINAL_ID` shape.
    ///
    /// The original-id component may itself contain underscores; only the
    /// first two are structural.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let mut parts = id.splitn(3, '_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source), Some(batch), Some(original))
                if !source.is_empty() && !batch.is_empty() && !original.is_empty() =>
            {
                Ok(Self(id))
            }
            _ => Err(PipelineError::InvalidDocumentId {
                id,
                reason: "expected SOURCE_BATCH_ORIGINAL_ID with non-empty components",
            }),
        }
    }

    /// Derive the id from a document file stem.
    pub fn from_file_stem(stem: &str) -> Result<Self> {
        Self::parse(stem)
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source abbreviation component.
    pub fn source(&self) -> &str {
        self.0.splitn(3, '_').next().unwrap_or_default()
    }

    /// Batch identifier component.
    pub fn batch(&self) -> &str {
        self.0.splitn(3, '_').nth(1).unwrap_or_default()
    }

    /// Original id component (may contain underscores).
    pub fn original_id(&self) -> &str {
        self.0.splitn(3, '_').nth(2).unwrap_or_default()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ingestion provenance. Set once when the document enters the system,
/// never mutated afterward. Steps may read it as context; the engine
/// itself never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Source name or abbreviation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Batch identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,

    /// Batch date, as supplied by the ingestion sidecar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_date: Option<String>,

    /// Original filename at ingestion time.
    pub original_filename: String,

    /// When the document entered the pipeline.
    pub ingested_at: DateTime<Utc>,

    /// SHA-256 hex digest of the original file content.
    pub content_hash: String,
}

impl Provenance {
    /// Build provenance from the original file alone (no sidecar).
    pub fn minimal(original_filename: impl Into<String>, content: &[u8]) -> Self {
        Self {
            source: None,
            batch: None,
            batch_date: None,
            original_filename: original_filename.into(),
            ingested_at: Utc::now(),
            content_hash: Self::hash_content(content),
        }
    }

    /// SHA-256 hex digest of raw content.
    pub fn hash_content(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }
}

/// Sidecar provenance fields, from an optional `<name>.meta.json` next to
/// the arriving document. Absence of the sidecar is not an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvenanceSidecar {
    pub source: Option<String>,
    pub batch: Option<String>,
    pub batch_date: Option<String>,
}

/// Terminal status of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step ran and produced an outcome.
    Success,
    /// The step determined it does not apply to this document.
    /// Dependents treat it as satisfied.
    Skipped,
    /// The step raised a genuine execution error.
    Failed,
}

/// Result from executing a pipeline step, as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name (the history key).
    pub step_name: String,

    /// Version of the step that ran.
    pub step_version: u32,

    /// When execution started.
    pub started_at: DateTime<Utc>,

    /// When execution finished.
    pub completed_at: DateTime<Utc>,

    /// Terminal status of this run.
    pub status: StepStatus,

    /// Step-defined key/value outcome data.
    #[serde(default)]
    pub outcome: OutcomeMap,

    /// Error description, present only when `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Record a successful run.
    pub fn success(
        step_name: impl Into<String>,
        step_version: u32,
        started_at: DateTime<Utc>,
        outcome: OutcomeMap,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            step_version,
            started_at,
            completed_at: Utc::now(),
            status: StepStatus::Success,
            outcome,
            error: None,
        }
    }

    /// Record a skipped run. The reason lands in the outcome payload.
    pub fn skipped(
        step_name: impl Into<String>,
        step_version: u32,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        let mut outcome = OutcomeMap::new();
        outcome.insert("reason".into(), serde_json::Value::String(reason.into()));
        Self {
            step_name: step_name.into(),
            step_version,
            started_at,
            completed_at: Utc::now(),
            status: StepStatus::Skipped,
            outcome,
            error: None,
        }
    }

    /// Record a failed run.
    pub fn failed(
        step_name: impl Into<String>,
        step_version: u32,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            step_version,
            started_at,
            completed_at: Utc::now(),
            status: StepStatus::Failed,
            outcome: OutcomeMap::new(),
            error: Some(error.into()),
        }
    }

    /// Whether dependents may treat this result as satisfied.
    pub fn is_satisfied(&self) -> bool {
        matches!(self.status, StepStatus::Success | StepStatus::Skipped)
    }
}

/// Overall processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

/// The durable per-document execution record.
///
/// Mutated only by the execution runner; steps receive it read-only.
/// The consolidated `metadata` map is derived data - always re-derivable
/// from the recorded step results - and is writable only inside this
/// crate, on behalf of the single designated terminal step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Primary key.
    pub doc_id: DocumentId,

    /// Ingestion provenance, read-only context for steps.
    pub provenance: Provenance,

    /// Step history, keyed by step name, insertion-ordered.
    #[serde(default)]
    steps: IndexMap<String, StepResult>,

    /// Consolidated document metadata, written exclusively by the
    /// designated terminal step via the runner.
    #[serde(default)]
    metadata: OutcomeMap,

    /// Overall status.
    pub status: DocumentStatus,

    /// When the manifest was created.
    pub created_at: DateTime<Utc>,

    /// When the manifest was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Failure description when `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Manifest {
    /// Create a fresh manifest for a newly ingested document.
    pub fn new(doc_id: DocumentId, provenance: Provenance) -> Self {
        let now = Utc::now();
        Self {
            doc_id,
            provenance,
            steps: IndexMap::new(),
            metadata: OutcomeMap::new(),
            status: DocumentStatus::Processing,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// Result recorded for a step, if any.
    pub fn step(&self, step_name: &str) -> Option<&StepResult> {
        self.steps.get(step_name)
    }

    /// Whether any result is recorded for a step.
    pub fn has_step(&self, step_name: &str) -> bool {
        self.steps.contains_key(step_name)
    }

    /// Record a step result, replacing any prior entry for the same step
    /// name in place (the step keeps its original position in the map).
    pub fn record_step(&mut self, result: StepResult) {
        self.steps.insert(result.step_name.clone(), result);
        self.touch();
    }

    /// Remove the recorded result for a step. Remaining entries keep
    /// their relative order. Returns the removed result, if any.
    pub fn clear_step(&mut self, step_name: &str) -> Option<StepResult> {
        let removed = self.steps.shift_remove(step_name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Iterate recorded results in insertion order.
    pub fn step_results(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.values()
    }

    /// Recorded step names in insertion order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Number of recorded step results.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The most recently completed successful step, if any.
    pub fn last_successful_step(&self) -> Option<&StepResult> {
        self.steps
            .values()
            .filter(|r| r.status == StepStatus::Success)
            .max_by_key(|r| r.completed_at)
    }

    /// The consolidated metadata map (derived data).
    pub fn metadata(&self) -> &OutcomeMap {
        &self.metadata
    }

    /// Replace the consolidated metadata. Crate-private: only the runner
    /// may call this, with the output of the designated terminal step.
    pub(crate) fn set_metadata(&mut self, metadata: OutcomeMap) {
        self.metadata = metadata;
        self.touch();
    }

    /// Drop the consolidated metadata (when its producing step is
    /// invalidated).
    pub(crate) fn clear_metadata(&mut self) {
        if !self.metadata.is_empty() {
            self.metadata = OutcomeMap::new();
            self.touch();
        }
    }

    /// Mark the document fully processed.
    pub fn mark_completed(&mut self) {
        self.status = DocumentStatus::Completed;
        self.error = None;
        self.touch();
    }

    /// Mark the document permanently failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = DocumentStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    /// Return the document to the processing state (resume path).
    pub fn mark_processing(&mut self) {
        self.status = DocumentStatus::Processing;
        self.error = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(pairs: &[(&str, serde_json::Value)]) -> OutcomeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn test_manifest() -> Manifest {
        let id = DocumentId::parse("A_1_001").unwrap();
        let provenance = Provenance::minimal("A_1_001.txt", b"hello");
        Manifest::new(id, provenance)
    }

    #[test]
    fn test_document_id_components() {
        let id = DocumentId::parse("HOUSE_3_DOC_017").unwrap();
        assert_eq!(id.source(), "HOUSE");
        assert_eq!(id.batch(), "3");
        assert_eq!(id.original_id(), "DOC_017");
    }

    #[test]
    fn test_document_id_rejects_malformed() {
        assert!(DocumentId::parse("no-underscores").is_err());
        assert!(DocumentId::parse("only_one").is_err());
        assert!(DocumentId::parse("__empty").is_err());
        assert!(DocumentId::parse("A__1").is_err());
    }

    #[test]
    fn test_record_step_replaces_in_place() {
        let mut manifest = test_manifest();
        let started = Utc::now();

        manifest.record_step(StepResult::success(
            "classify",
            1,
            started,
            outcome(&[("doc_type", json!("email"))]),
        ));
        manifest.record_step(StepResult::success("extract_urls", 1, started, outcome(&[])));

        // Re-running classify must not duplicate or reorder.
        manifest.record_step(StepResult::success(
            "classify",
            2,
            started,
            outcome(&[("doc_type", json!("legal"))]),
        ));

        let names: Vec<_> = manifest.step_names().collect();
        assert_eq!(names, vec!["classify", "extract_urls"]);
        assert_eq!(manifest.step("classify").unwrap().step_version, 2);
    }

    #[test]
    fn test_clear_step_preserves_order() {
        let mut manifest = test_manifest();
        let started = Utc::now();
        for name in ["a_b_c", "classify", "extract_urls"] {
            manifest.record_step(StepResult::success(name, 1, started, OutcomeMap::new()));
        }

        assert!(manifest.clear_step("classify").is_some());
        assert!(manifest.clear_step("classify").is_none());

        let names: Vec<_> = manifest.step_names().collect();
        assert_eq!(names, vec!["a_b_c", "extract_urls"]);
    }

    #[test]
    fn test_round_trip_preserves_step_order() {
        let mut manifest = test_manifest();
        let started = Utc::now();
        for name in ["classify", "extract_email_metadata", "extract_urls"] {
            manifest.record_step(StepResult::success(name, 1, started, OutcomeMap::new()));
        }

        let first = serde_json::to_string_pretty(&manifest).unwrap();
        let reloaded: Manifest = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&reloaded).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            reloaded.step_names().collect::<Vec<_>>(),
            manifest.step_names().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_skipped_result_is_satisfied() {
        let result = StepResult::skipped("extract_email_metadata", 4, Utc::now(), "not an email");
        assert!(result.is_satisfied());
        assert_eq!(result.outcome["reason"], json!("not an email"));

        let failed = StepResult::failed("classify", 1, Utc::now(), "boom");
        assert!(!failed.is_satisfied());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
