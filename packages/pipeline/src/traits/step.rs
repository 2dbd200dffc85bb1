//! The step contract.
//!
//! A step is a named, versioned unit of processing with declared
//! dependencies. Step implementations are external collaborators; this
//! trait is the only contract the engine depends on.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ExecResult;
use crate::types::manifest::{Manifest, OutcomeMap};

/// What a step produced.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// The step ran and produced outcome data.
    Completed(OutcomeMap),

    /// The step determined it does not apply to this document (e.g. an
    /// email-only step on a non-email document). Recorded as `skipped`;
    /// dependents treat it as satisfied.
    Skipped {
        /// Why the step did not apply.
        reason: String,
    },

    /// Terminal-assembly output: outcome data plus the consolidated
    /// document metadata. Only the step whose [`Step::declares_metadata`]
    /// is true may return this; the runner rejects it from any other
    /// step.
    CompletedWithMetadata {
        outcome: OutcomeMap,
        metadata: OutcomeMap,
    },
}

impl StepOutput {
    /// Completed with an empty outcome.
    pub fn empty() -> Self {
        Self::Completed(OutcomeMap::new())
    }

    /// Build a skip output.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// A pipeline step.
///
/// `execute` must be a pure function of the document's content plus the
/// manifest's already-recorded step outcomes, and must read only results
/// of steps named in `depends_on` - the manifest exposes all prior
/// results for convenience, so this is enforced by review and tests, not
/// the type system.
#[async_trait]
pub trait Step: Send + Sync {
    /// Unique step name (the registry and history key).
    fn name(&self) -> &str;

    /// Monotonic version. Bumping it invalidates recorded results of
    /// this step and everything downstream.
    fn version(&self) -> u32;

    /// Names of steps whose results this step reads. Must be acyclic
    /// across the registry.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this step is the single designated writer of the
    /// manifest's consolidated metadata map.
    fn declares_metadata(&self) -> bool {
        false
    }

    /// Run the step against the document at `doc_path` with the current
    /// manifest. Raise [`crate::error::StepError::Transient`] for
    /// retryable conditions and `Permanent` for genuine failures; a step
    /// that merely does not apply returns [`StepOutput::Skipped`].
    async fn execute(&self, doc_path: &Path, manifest: &Manifest) -> ExecResult<StepOutput>;
}
