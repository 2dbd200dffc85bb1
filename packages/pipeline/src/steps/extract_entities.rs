//! Entity extraction against the canonical entity seed.
//!
//! Matches seed aliases in the document text (case-insensitive, word
//! bounded) and counts mentions. Email participants from the upstream
//! header step are folded in as person entities, so extraction runs
//! after `extract_email_metadata` - which may itself have been skipped,
//! in which case only the seed matches remain.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::ExecResult;
use crate::steps::{extract_email, read_document};
use crate::traits::step::{Step, StepOutput};
use crate::types::manifest::{Manifest, OutcomeMap};
use crate::types::seed::{EntityKind, EntitySeed};

pub const STEP_NAME: &str = "extract_entities";

/// Extract canonical entity mentions from the document.
pub struct ExtractEntitiesStep {
    seed: Arc<EntitySeed>,
    patterns: Vec<(usize, Regex)>,
}

impl ExtractEntitiesStep {
    /// Build the step over one generation of the entity seed. Alias
    /// patterns are compiled once here, not per document.
    pub fn new(seed: Arc<EntitySeed>) -> Self {
        let mut patterns = Vec::new();
        for (idx, entity) in seed.entities.iter().enumerate() {
            let mut forms: Vec<&str> = vec![entity.name.as_str()];
            forms.extend(entity.aliases.iter().map(String::as_str));
            let alternation = forms
                .iter()
                .map(|f| regex::escape(f))
                .collect::<Vec<_>>()
                .join("|");
            if let Ok(pattern) = Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
                patterns.push((idx, pattern));
            }
        }
        Self { seed, patterns }
    }

    fn email_participant_names(manifest: &Manifest) -> Vec<String> {
        manifest
            .step(extract_email::STEP_NAME)
            .filter(|r| r.status == crate::types::manifest::StepStatus::Success)
            .and_then(|r| r.outcome.get("participants"))
            .and_then(Value::as_array)
            .map(|participants| {
                participants
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Step for ExtractEntitiesStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn version(&self) -> u32 {
        2
    }

    fn depends_on(&self) -> Vec<String> {
        vec![extract_email::STEP_NAME.to_string()]
    }

    async fn execute(&self, doc_path: &Path, manifest: &Manifest) -> ExecResult<StepOutput> {
        let text = read_document(doc_path).await?;

        let mut persons = Vec::new();
        let mut organizations = Vec::new();
        let mut locations = Vec::new();
        for (idx, pattern) in &self.patterns {
            let count = pattern.find_iter(&text).count();
            if count == 0 {
                continue;
            }
            let entity = &self.seed.entities[*idx];
            let record = json!({ "name": entity.name, "mention_count": count });
            match entity.kind {
                EntityKind::Person => persons.push(record),
                EntityKind::Organization => organizations.push(record),
                EntityKind::Location => locations.push(record),
                EntityKind::Other => {}
            }
        }

        // Header participants are person entities the seed may not know.
        let known: Vec<String> = persons
            .iter()
            .filter_map(|p| p.get("name").and_then(Value::as_str))
            .map(str::to_lowercase)
            .collect();
        for name in Self::email_participant_names(manifest) {
            if !known.contains(&name.to_lowercase()) {
                persons.push(json!({ "name": name, "mention_count": 1, "source": "email_header" }));
            }
        }

        let total = persons.len() + organizations.len() + locations.len();
        let mut outcome = OutcomeMap::new();
        outcome.insert("entities_found".into(), json!(total));
        outcome.insert("persons".into(), json!(persons));
        outcome.insert("organizations".into(), json!(organizations));
        outcome.insert("locations".into(), json!(locations));
        Ok(StepOutput::Completed(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::manifest::{DocumentId, Provenance, StepResult};
    use crate::types::seed::SeedEntity;
    use chrono::Utc;

    fn seed() -> Arc<EntitySeed> {
        Arc::new(EntitySeed {
            generated_at: Utc::now(),
            entities: vec![
                SeedEntity {
                    name: "Jane Roe".into(),
                    kind: EntityKind::Person,
                    mention_count: 10,
                    aliases: vec!["J. Roe".into()],
                },
                SeedEntity {
                    name: "Acme Corp".into(),
                    kind: EntityKind::Organization,
                    mention_count: 5,
                    aliases: vec![],
                },
                SeedEntity {
                    name: "Springfield".into(),
                    kind: EntityKind::Location,
                    mention_count: 3,
                    aliases: vec![],
                },
            ],
        })
    }

    fn manifest_with_participants() -> Manifest {
        let mut manifest = Manifest::new(
            DocumentId::parse("A_1_001").unwrap(),
            Provenance::minimal("A_1_001.txt", b"x"),
        );
        let mut outcome = OutcomeMap::new();
        outcome.insert(
            "participants".into(),
            json!([{ "name": "Carol Chen", "email": "carol@example.com" }]),
        );
        manifest.record_step(StepResult::success(
            extract_email::STEP_NAME,
            4,
            Utc::now(),
            outcome,
        ));
        manifest
    }

    #[tokio::test]
    async fn test_counts_alias_mentions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A_1_001.txt");
        tokio::fs::write(
            &path,
            "Jane Roe met with Acme Corp in Springfield. Later, J. ROE left Springfield.",
        )
        .await
        .unwrap();

        let step = ExtractEntitiesStep::new(seed());
        let manifest = Manifest::new(
            DocumentId::parse("A_1_001").unwrap(),
            Provenance::minimal("A_1_001.txt", b"x"),
        );
        let StepOutput::Completed(outcome) = step.execute(&path, &manifest).await.unwrap() else {
            panic!("expected completed output");
        };

        assert_eq!(outcome["entities_found"], json!(3));
        assert_eq!(outcome["persons"][0]["mention_count"], json!(2));
        assert_eq!(outcome["locations"][0]["mention_count"], json!(2));
    }

    #[tokio::test]
    async fn test_folds_in_email_participants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A_1_001.txt");
        tokio::fs::write(&path, "Nothing the seed knows about.").await.unwrap();

        let step = ExtractEntitiesStep::new(seed());
        let StepOutput::Completed(outcome) = step
            .execute(&path, &manifest_with_participants())
            .await
            .unwrap()
        else {
            panic!("expected completed output");
        };

        assert_eq!(outcome["persons"][0]["name"], json!("Carol Chen"));
        assert_eq!(outcome["persons"][0]["source"], json!("email_header"));
    }
}
