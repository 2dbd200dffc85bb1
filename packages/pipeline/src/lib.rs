//! Incremental Document-Processing Pipeline Engine
//!
//! Transforms a growing corpus of documents through a chain of
//! versioned, dependency-declaring steps, tracking every execution in a
//! durable per-document manifest. The engine knows nothing about what a
//! step extracts - it owns the hard part: deciding exactly what must
//! (re)run, guaranteeing at-most-one in-flight execution per document,
//! and preserving forensic detail when a document fails for good.
//!
//! # Design Philosophy
//!
//! - Steps are a closed, explicit interface registered in a static
//!   table, validated once at startup - never rediscovered per run
//! - The filesystem is the database: atomic renames between area
//!   directories are the only concurrency primitive
//! - Invalidation is graph-bounded: a version bump reruns exactly the
//!   affected subgraph, nothing more
//! - Failure is data: dead-lettered documents carry a full diagnostic
//!   record and resume from any step
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pipeline::{
//!     FsManifestStore, Runner, StepRegistry, WorkDir,
//!     steps::{ClassifyStep, ExtractUrlsStep},
//! };
//!
//! let workdir = WorkDir::new("corpus");
//! workdir.ensure_layout().await?;
//!
//! let registry = Arc::new(
//!     StepRegistry::builder()
//!         .register(ClassifyStep::new())
//!         .register(ExtractUrlsStep::new())
//!         .build()?,
//! );
//! let store = Arc::new(FsManifestStore::open(workdir.manifests()).await?);
//!
//! let runner = Runner::new(registry, store, workdir);
//! runner.sweep_orphans().await?;
//! let outcomes = runner.drain().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions ([`Step`], [`ManifestStore`])
//! - [`types`] - Manifest, provenance, entity seed, configuration
//! - [`registry`] - Static step catalogue with graph validation
//! - [`invalidation`] - Runnability and cascade computation
//! - [`runner`] - Per-document execution state machine
//! - [`dead_letter`] - Quarantine and recovery of failed documents
//! - [`workdir`] - Pipeline area directories and atomic moves
//! - [`ingest`] - Document admission with sidecar provenance
//! - [`admin`] - Operator surface (status, invalidation, reprocessing)
//! - [`steps`] - Built-in reference steps
//! - [`stores`] - Manifest store implementations
//! - [`testing`] - Mock steps for engine and application tests

pub mod admin;
pub mod dead_letter;
pub mod error;
pub mod ingest;
pub mod invalidation;
pub mod registry;
pub mod runner;
pub mod steps;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod workdir;

// Re-export core types at crate root
pub use error::{ExecResult, PipelineError, Result, StepError, StoreError, StoreResult};
pub use traits::{
    step::{Step, StepOutput},
    store::ManifestStore,
};
pub use types::{
    config::RunnerConfig,
    manifest::{
        DocumentId, DocumentStatus, Manifest, OutcomeMap, Provenance, ProvenanceSidecar,
        StepResult, StepStatus,
    },
    seed::{EntityKind, EntitySeed, SeedEntity},
};

// Re-export engine components
pub use dead_letter::ErrorRecord;
pub use ingest::ingest_document;
pub use invalidation::{find_invalidated, invalidate, is_complete, runnable_steps};
pub use registry::{RegistryBuilder, StepRegistry};
pub use runner::{ClaimedDocument, RunOutcome, Runner};
pub use workdir::{StatusCounts, WorkDir};

// Re-export stores
pub use stores::{FsManifestStore, MemoryStore};

// Re-export testing utilities
pub use testing::MockStep;
