//! Terminal metadata assembly.
//!
//! The only step allowed to write the manifest's consolidated metadata
//! map. Reads the outcomes of every extraction step and condenses them
//! into the final document metadata; its own outcome records assembly
//! statistics. All other steps write exclusively to their own outcome.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ExecResult;
use crate::steps::{classify, extract_email, extract_entities, extract_urls};
use crate::traits::step::{Step, StepOutput};
use crate::types::manifest::{Manifest, OutcomeMap, StepStatus};

pub const STEP_NAME: &str = "assemble_metadata";

const TOP_N_PERSONS: usize = 20;
const TOP_N_ORGANIZATIONS: usize = 10;
const TOP_N_LOCATIONS: usize = 10;

/// Assemble final document metadata from all prior step outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssembleMetadataStep;

impl AssembleMetadataStep {
    pub fn new() -> Self {
        Self
    }

    /// Top entity names by mention count.
    fn top_names(entities: Option<&Value>, limit: usize) -> Vec<String> {
        let mut ranked: Vec<(&str, u64)> = entities
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|e| {
                        let name = e.get("name")?.as_str()?;
                        let count = e.get("mention_count").and_then(Value::as_u64).unwrap_or(0);
                        Some((name, count))
                    })
                    .collect()
            })
            .unwrap_or_default();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

#[async_trait]
impl Step for AssembleMetadataStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn version(&self) -> u32 {
        1
    }

    fn depends_on(&self) -> Vec<String> {
        vec![
            classify::STEP_NAME.to_string(),
            extract_email::STEP_NAME.to_string(),
            extract_urls::STEP_NAME.to_string(),
            extract_entities::STEP_NAME.to_string(),
        ]
    }

    fn declares_metadata(&self) -> bool {
        true
    }

    async fn execute(&self, _doc_path: &Path, manifest: &Manifest) -> ExecResult<StepOutput> {
        let mut metadata = OutcomeMap::new();

        if let Some(result) = manifest.step(classify::STEP_NAME) {
            if let Some(doc_type) = result.outcome.get("doc_type") {
                metadata.insert("doc_type".into(), doc_type.clone());
            }
            if let Some(confidence) = result.outcome.get("confidence") {
                metadata.insert("confidence".into(), confidence.clone());
            }
        }

        let email = manifest
            .step(extract_email::STEP_NAME)
            .filter(|r| r.status == StepStatus::Success);
        if let Some(result) = email {
            for field in ["from", "to", "cc", "subject", "date", "participants"] {
                if let Some(value) = result.outcome.get(field) {
                    metadata.insert(field.into(), value.clone());
                }
            }
        }

        let urls = manifest.step(extract_urls::STEP_NAME);
        let urls_found = urls
            .and_then(|r| r.outcome.get("urls_found"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if let Some(result) = urls {
            let bare: Vec<&Value> = result
                .outcome
                .get("urls")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(|u| u.get("url")).collect())
                .unwrap_or_default();
            metadata.insert("urls".into(), json!(bare));
            metadata.insert("urls_count".into(), json!(urls_found));
        }

        let entities = manifest.step(extract_entities::STEP_NAME);
        let entities_found = entities
            .and_then(|r| r.outcome.get("entities_found"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if let Some(result) = entities {
            metadata.insert(
                "persons".into(),
                json!(Self::top_names(result.outcome.get("persons"), TOP_N_PERSONS)),
            );
            metadata.insert(
                "organizations".into(),
                json!(Self::top_names(
                    result.outcome.get("organizations"),
                    TOP_N_ORGANIZATIONS
                )),
            );
            metadata.insert(
                "locations".into(),
                json!(Self::top_names(
                    result.outcome.get("locations"),
                    TOP_N_LOCATIONS
                )),
            );
            metadata.insert("entities_count".into(), json!(entities_found));
        }

        let mut outcome = OutcomeMap::new();
        outcome.insert("metadata_fields_assembled".into(), json!(metadata.len()));
        outcome.insert("has_email_metadata".into(), json!(email.is_some()));
        outcome.insert("has_urls".into(), json!(urls_found > 0));
        outcome.insert("has_entities".into(), json!(entities_found > 0));
        Ok(StepOutput::CompletedWithMetadata { outcome, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::manifest::{DocumentId, Provenance, StepResult};
    use chrono::Utc;

    fn record(manifest: &mut Manifest, name: &str, version: u32, outcome: Value) {
        let Value::Object(map) = outcome else {
            panic!("outcome must be an object");
        };
        manifest.record_step(StepResult::success(name, version, Utc::now(), map));
    }

    fn full_manifest() -> Manifest {
        let mut manifest = Manifest::new(
            DocumentId::parse("A_1_001").unwrap(),
            Provenance::minimal("A_1_001.txt", b"x"),
        );
        record(
            &mut manifest,
            classify::STEP_NAME,
            2,
            json!({"doc_type": "email", "confidence": 0.9, "method": "heuristic"}),
        );
        record(
            &mut manifest,
            extract_email::STEP_NAME,
            4,
            json!({
                "from": {"name": "Jane", "email": "jane@example.com"},
                "to": [], "cc": [], "bcc": [],
                "subject": "Plans",
                "date": "3/14/2015",
                "participants": [{"name": "Jane", "email": "jane@example.com"}]
            }),
        );
        record(
            &mut manifest,
            extract_urls::STEP_NAME,
            1,
            json!({"urls_found": 1, "urls": [{"url": "https://example.org", "domain": "example.org", "type": "other", "position": 0}]}),
        );
        record(
            &mut manifest,
            extract_entities::STEP_NAME,
            2,
            json!({
                "entities_found": 2,
                "persons": [
                    {"name": "Jane Roe", "mention_count": 2},
                    {"name": "Carol Chen", "mention_count": 5}
                ],
                "organizations": [],
                "locations": []
            }),
        );
        manifest
    }

    #[tokio::test]
    async fn test_assembles_from_all_outcomes() {
        let manifest = full_manifest();
        let output = AssembleMetadataStep::new()
            .execute(Path::new("unused"), &manifest)
            .await
            .unwrap();
        let StepOutput::CompletedWithMetadata { outcome, metadata } = output else {
            panic!("expected metadata output");
        };

        assert_eq!(metadata["doc_type"], json!("email"));
        assert_eq!(metadata["subject"], json!("Plans"));
        assert_eq!(metadata["urls"], json!(["https://example.org"]));
        // Ranked by mention count, most mentioned first.
        assert_eq!(metadata["persons"], json!(["Carol Chen", "Jane Roe"]));
        assert_eq!(metadata["entities_count"], json!(2));

        assert_eq!(outcome["has_email_metadata"], json!(true));
        assert_eq!(outcome["has_urls"], json!(true));
        assert_eq!(outcome["has_entities"], json!(true));
    }

    #[tokio::test]
    async fn test_skipped_email_step_omits_email_fields() {
        let mut manifest = full_manifest();
        manifest.record_step(StepResult::skipped(
            extract_email::STEP_NAME,
            4,
            Utc::now(),
            "document type is 'legal', not email",
        ));

        let output = AssembleMetadataStep::new()
            .execute(Path::new("unused"), &manifest)
            .await
            .unwrap();
        let StepOutput::CompletedWithMetadata { outcome, metadata } = output else {
            panic!("expected metadata output");
        };

        assert!(!metadata.contains_key("subject"));
        assert_eq!(outcome["has_email_metadata"], json!(false));
    }
}
