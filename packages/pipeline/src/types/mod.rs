//! Core data types for the pipeline engine.

pub mod config;
pub mod manifest;
pub mod seed;

pub use config::RunnerConfig;
pub use manifest::{
    DocumentId, DocumentStatus, Manifest, OutcomeMap, Provenance, ProvenanceSidecar, StepResult,
    StepStatus,
};
pub use seed::{EntityKind, EntitySeed, SeedEntity};
