//! Built-in reference steps.
//!
//! Deliberately lightweight regex/lookup extractors. They exercise the
//! engine end to end and ground the test suite; production deployments
//! register their own [`crate::traits::Step`] implementations alongside
//! or instead of these.
//!
//! Dependency graph:
//!
//! ```text
//! classify ──► extract_email_metadata ──► extract_entities ──┐
//!     │                    │                                 │
//! extract_urls ────────────┴──────────────► assemble_metadata
//! ```

pub mod assemble;
pub mod classify;
pub mod extract_email;
pub mod extract_entities;
pub mod extract_urls;

pub use assemble::AssembleMetadataStep;
pub use classify::ClassifyStep;
pub use extract_email::ExtractEmailMetadataStep;
pub use extract_entities::ExtractEntitiesStep;
pub use extract_urls::ExtractUrlsStep;

use std::path::Path;

use crate::error::{ExecResult, StepError};

/// Read the document as text, lossily decoding non-UTF-8 bytes.
///
/// A missing file is a permanent failure (the document left its
/// processing slot); other I/O errors are transient.
pub(crate) async fn read_document(doc_path: &Path) -> ExecResult<String> {
    match tokio::fs::read(doc_path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StepError::permanent(format!(
            "document file missing: {}",
            doc_path.display()
        ))),
        Err(e) => Err(StepError::transient(format!(
            "could not read document: {e}"
        ))),
    }
}
