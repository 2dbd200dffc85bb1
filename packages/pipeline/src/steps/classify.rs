//! Document type classification.
//!
//! Header/keyword heuristics decide between email, legal, news, and
//! other. The classification gates the downstream extraction steps, so
//! this step has no dependencies and runs first.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::error::ExecResult;
use crate::steps::read_document;
use crate::traits::step::{Step, StepOutput};
use crate::types::manifest::{Manifest, OutcomeMap};

pub const STEP_NAME: &str = "classify";

static EMAIL_HEADERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(From|To|Cc|Subject|Sent|Date):\s+\S").unwrap()
});

static LEGAL_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)(\bv\.\s+[A-Z]|UNITED STATES DISTRICT COURT|Case No\.|\bPlaintiff\b|\bDefendant\b|\bDEPOSITION\b|\bEXHIBIT\b)",
    )
    .unwrap()
});

static NEWS_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(\(Reuters\)|\(AP\)|Associated Press|Staff Writer|byline|^By\s+[A-Z][a-z]+\s+[A-Z][a-z]+)")
        .unwrap()
});

/// Classify the document type from structural markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassifyStep;

impl ClassifyStep {
    pub fn new() -> Self {
        Self
    }

    fn classify_text(text: &str) -> (&'static str, f64) {
        let email_hits = EMAIL_HEADERS.find_iter(text).take(8).count();
        let legal_hits = LEGAL_MARKERS.find_iter(text).take(8).count();
        let news_hits = NEWS_MARKERS.find_iter(text).take(8).count();

        // Email headers are the strongest structural signal.
        if email_hits >= 2 {
            return ("email", (0.6 + 0.1 * email_hits as f64).min(0.95));
        }
        if legal_hits >= 2 && legal_hits >= news_hits {
            return ("legal", (0.5 + 0.1 * legal_hits as f64).min(0.9));
        }
        if news_hits >= 2 {
            return ("news", (0.5 + 0.1 * news_hits as f64).min(0.9));
        }
        ("other", 0.5)
    }
}

#[async_trait]
impl Step for ClassifyStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn version(&self) -> u32 {
        2
    }

    async fn execute(&self, doc_path: &Path, _manifest: &Manifest) -> ExecResult<StepOutput> {
        let text = read_document(doc_path).await?;
        let (doc_type, confidence) = Self::classify_text(&text);

        let mut outcome = OutcomeMap::new();
        outcome.insert("doc_type".into(), json!(doc_type));
        outcome.insert("confidence".into(), json!(confidence));
        outcome.insert("method".into(), json!("heuristic"));
        Ok(StepOutput::Completed(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_headers_win() {
        let text = "From: alice@example.com\nTo: bob@example.com\nSubject: Meeting\n\nSee you.";
        let (doc_type, confidence) = ClassifyStep::classify_text(text);
        assert_eq!(doc_type, "email");
        assert!(confidence >= 0.8);
    }

    #[test]
    fn test_legal_markers() {
        let text = "UNITED STATES DISTRICT COURT\nDoe v. Acme Corp, Case No. 1:23-cv-456\nPlaintiff alleges...";
        let (doc_type, _) = ClassifyStep::classify_text(text);
        assert_eq!(doc_type, "legal");
    }

    #[test]
    fn test_plain_text_is_other() {
        let (doc_type, confidence) = ClassifyStep::classify_text("just some notes about nothing");
        assert_eq!(doc_type, "other");
        assert_eq!(confidence, 0.5);
    }
}
