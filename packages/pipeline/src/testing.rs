//! Testing utilities including mock step implementations.
//!
//! These are useful for testing the engine, and for applications that
//! need deterministic steps without real extraction logic.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ExecResult, StepError};
use crate::traits::step::{Step, StepOutput};
use crate::types::manifest::{Manifest, OutcomeMap};

/// A configurable mock step.
///
/// Defaults to succeeding with an empty outcome. Behavior is scripted
/// through builder methods; invocation counts are shared across clones
/// so tests can hold a handle while the registry owns the step.
#[derive(Clone)]
pub struct MockStep {
    name: String,
    version: u32,
    dependencies: Vec<String>,
    outcome: OutcomeMap,
    metadata: Option<OutcomeMap>,
    skip_reason: Option<String>,
    permanent_failures: usize,
    permanent_error: String,
    transient_failures: usize,
    declares_metadata: bool,
    delay: Option<std::time::Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockStep {
    /// Create a mock that succeeds with an empty outcome.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: Vec::new(),
            outcome: OutcomeMap::new(),
            metadata: None,
            skip_reason: None,
            permanent_failures: 0,
            permanent_error: String::new(),
            transient_failures: 0,
            declares_metadata: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Declare dependencies.
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Succeed with the given outcome payload.
    pub fn with_outcome(mut self, outcome: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = outcome {
            self.outcome = map;
        }
        self
    }

    /// Always skip with the given reason.
    pub fn skipping(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    /// Fail permanently on every call.
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.permanent_error = error.into();
        self.permanent_failures = usize::MAX;
        self
    }

    /// Fail permanently for the first `count` calls, then succeed.
    pub fn failing_times(mut self, count: usize, error: impl Into<String>) -> Self {
        self.permanent_error = error.into();
        self.permanent_failures = count;
        self
    }

    /// Fail transiently for the first `count` calls, then fall through
    /// to the configured terminal behavior.
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    /// Mark this step as the consolidated-metadata writer, assembling
    /// the given map.
    pub fn as_metadata_assembler(mut self) -> Self {
        self.declares_metadata = true;
        if self.metadata.is_none() {
            self.metadata = Some(OutcomeMap::new());
        }
        self
    }

    /// Metadata map to return (implies the metadata-bearing output).
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = metadata {
            self.metadata = Some(map);
        }
        self
    }

    /// Sleep before responding, to exercise timeouts and cancellation.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `execute` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared handle to the call counter.
    pub fn calls_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Step for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn depends_on(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn declares_metadata(&self) -> bool {
        self.declares_metadata
    }

    async fn execute(&self, _doc_path: &Path, _manifest: &Manifest) -> ExecResult<StepOutput> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if call < self.transient_failures {
            return Err(StepError::transient(format!(
                "scripted transient failure {} of {}",
                call + 1,
                self.transient_failures
            )));
        }
        let call = call - self.transient_failures;

        if call < self.permanent_failures {
            return Err(StepError::permanent(self.permanent_error.clone()));
        }

        if let Some(reason) = &self.skip_reason {
            return Ok(StepOutput::skipped(reason.clone()));
        }

        if let Some(metadata) = &self.metadata {
            return Ok(StepOutput::CompletedWithMetadata {
                outcome: self.outcome.clone(),
                metadata: metadata.clone(),
            });
        }

        Ok(StepOutput::Completed(self.outcome.clone()))
    }
}
