//! Static step registry.
//!
//! Steps are registered in an explicit table at startup and validated
//! once: unique names, known dependencies, an acyclic graph, and at most
//! one consolidated-metadata writer. The built registry is immutable and
//! carries the topological evaluation order plus a memoized downstream
//! closure per step, so invalidation cascades never re-walk the graph.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::traits::step::Step;

/// Builder for a [`StepRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    steps: Vec<Arc<dyn Step>>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step.
    pub fn register(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Register an already-shared step.
    pub fn register_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Validate the registered set and build the immutable registry.
    pub fn build(self) -> Result<StepRegistry> {
        let mut by_name: HashMap<String, Arc<dyn Step>> = HashMap::new();
        let mut assembler: Option<String> = None;

        for step in self.steps {
            let name = step.name().to_string();
            if by_name.contains_key(&name) {
                return Err(PipelineError::DuplicateStep {
                    name,
                    version: step.version(),
                });
            }
            if step.declares_metadata() {
                if let Some(first) = &assembler {
                    return Err(PipelineError::MultipleMetadataAssemblers {
                        first: first.clone(),
                        second: name,
                    });
                }
                assembler = Some(name.clone());
            }
            by_name.insert(name, step);
        }

        // Snapshot the dependency edges and check they all resolve.
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (name, step) in &by_name {
            let declared = step.depends_on();
            for dep in &declared {
                if !by_name.contains_key(dep) {
                    return Err(PipelineError::UnknownDependency {
                        step: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            deps.insert(name.clone(), declared);
        }

        let topo_order = topological_order(&deps)?;
        let downstream = downstream_closures(&deps, &topo_order);

        Ok(StepRegistry {
            by_name,
            deps,
            topo_order,
            downstream,
            assembler,
        })
    }
}

/// Immutable catalogue of the registered steps.
pub struct StepRegistry {
    by_name: HashMap<String, Arc<dyn Step>>,
    deps: HashMap<String, Vec<String>>,
    topo_order: Vec<String>,
    downstream: HashMap<String, BTreeSet<String>>,
    assembler: Option<String>,
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.topo_order)
            .field("deps", &self.deps)
            .field("downstream", &self.downstream)
            .field("assembler", &self.assembler)
            .finish()
    }
}

impl StepRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a step by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.by_name.get(name)
    }

    /// Currently registered version of a step.
    pub fn version_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|s| s.version())
    }

    /// Declared dependencies of a step, as snapshotted at build time.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.deps.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Step names in topological (dependency-first) order.
    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }

    /// Steps in topological order.
    pub fn steps_in_order(&self) -> impl Iterator<Item = &Arc<dyn Step>> {
        self.topo_order.iter().filter_map(|name| self.by_name.get(name))
    }

    /// All direct and transitive dependents of a step (the step itself
    /// excluded). Memoized at build time.
    pub fn downstream_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.downstream
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// The single step allowed to write consolidated metadata, if any.
    pub fn metadata_assembler(&self) -> Option<&str> {
        self.assembler.as_deref()
    }

    /// Whether a step is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Kahn's algorithm. Fails fast on a cycle, naming the steps involved.
fn topological_order(deps: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        deps.keys().map(|name| (name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (name, declared) in deps {
        for dep in declared {
            *in_degree.get_mut(name.as_str()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    // Deterministic order for ties.
    let mut ready: VecDeque<&str> = {
        let mut roots: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        roots.sort_unstable();
        roots.into()
    };

    let mut order = Vec::with_capacity(deps.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        let mut unlocked = Vec::new();
        for dependent in dependents.get(name).into_iter().flatten() {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                unlocked.push(*dependent);
            }
        }
        unlocked.sort_unstable();
        ready.extend(unlocked);
    }

    if order.len() != deps.len() {
        let mut involved: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(n, _)| n.to_string())
            .collect();
        involved.sort_unstable();
        return Err(PipelineError::DependencyCycle { involved });
    }
    Ok(order)
}

/// Transitive-dependent sets, computed once in reverse topological
/// order so each step's closure reuses its direct dependents' closures.
fn downstream_closures(
    deps: &HashMap<String, Vec<String>>,
    topo_order: &[String],
) -> HashMap<String, BTreeSet<String>> {
    let mut direct: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, declared) in deps {
        for dep in declared {
            direct.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut closures: HashMap<String, BTreeSet<String>> = HashMap::new();
    for name in topo_order.iter().rev() {
        let mut closure = BTreeSet::new();
        for dependent in direct.get(name.as_str()).into_iter().flatten() {
            closure.insert(dependent.to_string());
            if let Some(transitive) = closures.get(*dependent) {
                closure.extend(transitive.iter().cloned());
            }
        }
        closures.insert(name.clone(), closure);
    }
    closures
}
