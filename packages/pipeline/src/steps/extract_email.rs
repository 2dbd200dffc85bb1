//! Email header extraction.
//!
//! Parses From/To/Cc/Subject/Date headers and builds a participants
//! list. Only applies to documents classified as email; everything else
//! is skipped, which dependents treat as satisfied.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::ExecResult;
use crate::steps::{classify, read_document};
use crate::traits::step::{Step, StepOutput};
use crate::types::manifest::{Manifest, OutcomeMap};

pub const STEP_NAME: &str = "extract_email_metadata";

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(From|To|Cc|Bcc|Subject|Date|Sent):\s*(.+)$").unwrap());

/// `Name <addr@host>` or a bare address.
static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:([^<>,;]+?)\s+)?<?([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})>?").unwrap()
});

/// One parsed mailbox.
fn parse_address(raw: &str) -> Option<Value> {
    let caps = ADDRESS.captures(raw.trim())?;
    let email = caps.get(2)?.as_str().to_lowercase();
    let name = caps
        .get(1)
        .map(|m| m.as_str().trim().trim_matches('"').to_string())
        .filter(|n| !n.is_empty());
    Some(json!({ "name": name, "email": email }))
}

/// All mailboxes in a comma/semicolon separated header value.
fn parse_address_list(raw: &str) -> Vec<Value> {
    raw.split([',', ';'])
        .filter_map(parse_address)
        .collect()
}

/// Extract email metadata from classified email documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractEmailMetadataStep;

impl ExtractEmailMetadataStep {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ExtractEmailMetadataStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn version(&self) -> u32 {
        4
    }

    fn depends_on(&self) -> Vec<String> {
        vec![classify::STEP_NAME.to_string()]
    }

    async fn execute(&self, doc_path: &Path, manifest: &Manifest) -> ExecResult<StepOutput> {
        let doc_type = manifest
            .step(classify::STEP_NAME)
            .and_then(|r| r.outcome.get("doc_type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if doc_type != "email" {
            return Ok(StepOutput::skipped(format!(
                "document type is '{doc_type}', not email"
            )));
        }

        let text = read_document(doc_path).await?;

        let mut from = Value::Null;
        let mut to = Vec::new();
        let mut cc = Vec::new();
        let mut bcc = Vec::new();
        let mut subject = Value::Null;
        let mut date = Value::Null;
        for caps in HEADER.captures_iter(&text) {
            let value = caps[2].trim();
            match &caps[1] {
                "From" if from.is_null() => {
                    from = parse_address(value).unwrap_or(Value::Null);
                }
                "To" if to.is_empty() => to = parse_address_list(value),
                "Cc" if cc.is_empty() => cc = parse_address_list(value),
                "Bcc" if bcc.is_empty() => bcc = parse_address_list(value),
                "Subject" if subject.is_null() => subject = json!(value),
                "Date" | "Sent" if date.is_null() => date = json!(value),
                _ => {}
            }
        }

        let mut participants = Vec::new();
        if !from.is_null() {
            participants.push(from.clone());
        }
        participants.extend(to.iter().cloned());
        participants.extend(cc.iter().cloned());
        participants.extend(bcc.iter().cloned());

        let mut outcome = OutcomeMap::new();
        outcome.insert("from".into(), from);
        outcome.insert("to".into(), json!(to));
        outcome.insert("cc".into(), json!(cc));
        outcome.insert("bcc".into(), json!(bcc));
        outcome.insert("subject".into(), subject);
        outcome.insert("date".into(), date);
        outcome.insert("participants".into(), json!(participants));
        Ok(StepOutput::Completed(outcome))
    }
}
