//! Entity seed - the periodically regenerated canonical-entity snapshot.
//!
//! The seed is external, immutable reference data used by extraction
//! steps for disambiguation. The engine never coordinates on it; each
//! load observes one generation.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of a canonical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
    Other,
}

/// One canonical entity with its known aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntity {
    /// Canonical display name.
    pub name: String,

    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,

    /// How often the entity was seen when the seed was generated.
    #[serde(default)]
    pub mention_count: u64,

    /// Alternate surface forms, canonical name excluded.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A read-only snapshot of canonical entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySeed {
    /// When this generation of the seed was produced.
    pub generated_at: DateTime<Utc>,

    /// Canonical entities.
    pub entities: Vec<SeedEntity>,
}

impl EntitySeed {
    /// An empty seed (useful when no snapshot has been generated yet).
    pub fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            entities: Vec::new(),
        }
    }

    /// Load a seed snapshot from `entity_seed.json`.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let seed = serde_json::from_slice(&bytes).map_err(crate::error::StoreError::Serialize)?;
        Ok(seed)
    }

    /// Case-insensitive alias → entity index. Canonical names are
    /// included as their own alias.
    pub fn alias_index(&self) -> HashMap<String, &SeedEntity> {
        let mut index = HashMap::new();
        for entity in &self.entities {
            index.insert(entity.name.to_lowercase(), entity);
            for alias in &entity.aliases {
                index.insert(alias.to_lowercase(), entity);
            }
        }
        index
    }

    /// Look up an entity by canonical name or alias.
    pub fn lookup(&self, name: &str) -> Option<&SeedEntity> {
        let needle = name.to_lowercase();
        self.entities.iter().find(|e| {
            e.name.to_lowercase() == needle
                || e.aliases.iter().any(|a| a.to_lowercase() == needle)
        })
    }
}
