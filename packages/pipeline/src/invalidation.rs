//! Runnability and invalidation over the step dependency graph.
//!
//! A step is runnable when every declared dependency has a satisfied
//! result at the dependency's currently registered version, and the step
//! itself has no recorded result, a stale one, or (on request) a failed
//! one. Skipped results count as satisfied everywhere: the condition
//! that caused the skip is itself a dependency output, so version bumps
//! re-evaluate skip eligibility like any other stale result.
//!
//! Invalidating a step clears its recorded result and the recorded
//! results of its entire downstream closure, leaving ancestors and
//! unrelated branches untouched - reprocessing cost is bounded to
//! exactly the affected subgraph.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::registry::StepRegistry;
use crate::traits::step::Step;
use crate::traits::store::ManifestStore;
use crate::types::manifest::{DocumentId, Manifest, StepStatus};

/// Whether every declared dependency of `step` is satisfied in the
/// manifest at the dependency's currently registered version.
pub fn dependencies_satisfied(registry: &StepRegistry, manifest: &Manifest, step: &str) -> bool {
    registry.dependencies_of(step).iter().all(|dep| {
        manifest.step(dep).is_some_and(|result| {
            result.is_satisfied() && Some(result.step_version) == registry.version_of(dep)
        })
    })
}

/// Whether `step` itself needs (another) run, dependencies aside.
pub fn needs_run(
    registry: &StepRegistry,
    manifest: &Manifest,
    step: &str,
    retry_failed: bool,
) -> bool {
    let Some(current) = registry.version_of(step) else {
        return false;
    };
    match manifest.step(step) {
        None => true,
        Some(result) if result.step_version < current => true,
        Some(result) if result.status == StepStatus::Failed => retry_failed,
        Some(_) => false,
    }
}

/// The steps runnable right now, in topological order.
pub fn runnable_steps(
    registry: &StepRegistry,
    manifest: &Manifest,
    retry_failed: bool,
) -> Vec<Arc<dyn Step>> {
    registry
        .steps_in_order()
        .filter(|step| {
            needs_run(registry, manifest, step.name(), retry_failed)
                && dependencies_satisfied(registry, manifest, step.name())
        })
        .cloned()
        .collect()
}

/// Whether every registered step has a satisfied result at its current
/// version.
pub fn is_complete(registry: &StepRegistry, manifest: &Manifest) -> bool {
    registry.topo_order().iter().all(|name| {
        manifest.step(name).is_some_and(|result| {
            result.is_satisfied() && Some(result.step_version) == registry.version_of(name)
        })
    })
}

/// Clear the recorded result for `step_name` and for every transitive
/// dependent. Pure manifest transformation - the caller persists.
///
/// If the metadata assembler is among the cleared steps, the derived
/// metadata map is dropped with it. Returns the cleared step names in
/// manifest order.
pub fn invalidate(manifest: &mut Manifest, step_name: &str, registry: &StepRegistry) -> Vec<String> {
    let mut targets: Vec<String> = vec![step_name.to_string()];
    targets.extend(registry.downstream_of(step_name).map(str::to_string));

    let mut cleared = Vec::new();
    for name in manifest.step_names().map(str::to_string).collect::<Vec<_>>() {
        if targets.iter().any(|t| t == &name) && manifest.clear_step(&name).is_some() {
            cleared.push(name);
        }
    }

    let assembler_cleared = registry
        .metadata_assembler()
        .is_some_and(|assembler| targets.iter().any(|t| t == assembler));
    if assembler_cleared {
        manifest.clear_metadata();
    }

    if !cleared.is_empty() {
        manifest.mark_processing();
        debug!(doc_id = %manifest.doc_id, step = step_name, cleared = ?cleared, "invalidated");
    }
    cleared
}

/// All documents whose recorded version for `step_name` is older than
/// `new_version` - exactly the manifests a version bump invalidates.
pub async fn find_invalidated<S: ManifestStore>(
    store: &S,
    step_name: &str,
    new_version: u32,
) -> Result<Vec<DocumentId>> {
    let mut invalidated = Vec::new();
    for doc_id in store.list().await? {
        let manifest = store.load(&doc_id).await?;
        if manifest
            .step(step_name)
            .is_some_and(|result| result.step_version < new_version)
        {
            invalidated.push(doc_id);
        }
    }
    Ok(invalidated)
}
