//! Typed errors for the pipeline engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Errors are layered by
//! component: steps raise [`StepError`], manifest backends raise
//! [`StoreError`], and the engine itself surfaces [`PipelineError`].

use thiserror::Error;

/// Failure raised by a step's `execute`.
///
/// The taxonomy drives retry policy: transient failures are retried
/// in-process with exponential backoff before escalation, permanent
/// failures dead-letter the document immediately.
#[derive(Debug, Error)]
pub enum StepError {
    /// Temporary condition (network timeout, resource unavailable).
    /// Retried up to the configured attempt bound.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Unrecoverable condition (malformed document, validation failure).
    /// Never retried automatically.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl StepError {
    /// Build a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Build a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    /// Whether this failure should be retried in-process.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors from a manifest store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No manifest recorded for the document.
    #[error("manifest not found: {doc_id}")]
    NotFound { doc_id: String },

    /// A manifest already exists; ingestion must be idempotent at the caller.
    #[error("manifest already exists: {doc_id}")]
    AlreadyExists { doc_id: String },

    /// The manifest exists but cannot be parsed.
    #[error("manifest corrupt: {doc_id}")]
    Corrupt {
        doc_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failed while saving.
    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Underlying filesystem failure.
    #[error("manifest store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Manifest store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A document id did not match `{SOURCE}_{BATCH}_{ORIGINAL_ID}`.
    #[error("invalid document id {id:?}: {reason}")]
    InvalidDocumentId { id: String, reason: &'static str },

    /// Two steps registered under the same name.
    #[error("duplicate step registered: {name} v{version}")]
    DuplicateStep { name: String, version: u32 },

    /// A step declared a dependency that is not registered.
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    /// A step name was looked up that is not registered.
    #[error("unknown step: {name}")]
    UnknownStep { name: String },

    /// The dependency graph is not acyclic.
    #[error("dependency cycle detected among steps: {}", .involved.join(", "))]
    DependencyCycle { involved: Vec<String> },

    /// More than one step declared itself the consolidated-metadata writer.
    #[error("multiple metadata assemblers registered: {first} and {second}")]
    MultipleMetadataAssemblers { first: String, second: String },

    /// The document file could not be located in the expected area.
    #[error("document {doc_id} not found in {location}")]
    DocumentMissing { doc_id: String, location: String },

    /// No step is runnable but the manifest is incomplete. Indicates a
    /// broken invariant; the document is surfaced rather than dropped.
    #[error("document {doc_id} stalled: no runnable steps but manifest incomplete")]
    Stalled { doc_id: String },

    /// The dead-letter error record could not be written after retries.
    /// Fatal to the engine run: a failed document is never left
    /// un-annotated in `processing/`.
    #[error("dead-letter record could not be written for {doc_id} after {attempts} attempts")]
    DeadLetterWrite {
        doc_id: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem failure outside the manifest store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for step execution.
pub type ExecResult<T> = std::result::Result<T, StepError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
