//! URL extraction.
//!
//! Scans the document text for http/https URLs, classifies each by
//! domain, and records them with their byte position. Duplicates are
//! dropped, first occurrence wins.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::error::ExecResult;
use crate::steps::read_document;
use crate::traits::step::{Step, StepOutput};
use crate::types::manifest::{Manifest, OutcomeMap};

pub const STEP_NAME: &str = "extract_urls";

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap()
});

/// Domain portion of a URL, lowercased, port stripped.
fn domain_of(url: &str) -> String {
    let after_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let host = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(after_scheme);
    host.split('@').last().unwrap_or(host)
        .split(':')
        .next()
        .unwrap_or(host)
        .to_lowercase()
}

/// Classify a URL by domain and path.
fn classify_url_type(url: &str, domain: &str) -> &'static str {
    let url_lower = url.to_lowercase();
    if domain.contains("youtube.com") || domain.contains("youtu.be") {
        "youtube"
    } else if url_lower.ends_with(".pdf") || url_lower.contains(".pdf?") {
        "pdf"
    } else if ["news", "times", "post", "reuters", "cnn", "bbc"]
        .iter()
        .any(|n| domain.contains(n))
    {
        "news"
    } else if domain.contains("t.co") || domain.contains("twitter.com") || domain.contains("x.com")
    {
        "social"
    } else {
        "other"
    }
}

/// Extract URLs from the document text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractUrlsStep;

impl ExtractUrlsStep {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ExtractUrlsStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn version(&self) -> u32 {
        1
    }

    async fn execute(&self, doc_path: &Path, _manifest: &Manifest) -> ExecResult<StepOutput> {
        let text = read_document(doc_path).await?;

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for found in URL_PATTERN.find_iter(&text) {
            let url = found.as_str().trim_end_matches(['.', ',', ')', ';']);
            if !seen.insert(url.to_string()) {
                continue;
            }
            let domain = domain_of(url);
            urls.push(json!({
                "url": url,
                "domain": domain,
                "type": classify_url_type(url, &domain),
                "position": found.start(),
            }));
        }

        let mut outcome = OutcomeMap::new();
        outcome.insert("urls_found".into(), json!(urls.len()));
        outcome.insert("urls".into(), json!(urls));
        Ok(StepOutput::Completed(outcome))
    }
}
