//! The seam between the engine and upstream text extraction.
//!
//! Format-specific extraction (PDF, Word, OCR) lives outside this crate.
//! Implementations hand the engine ordered question blocks per document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::normalizer::DocumentMeta;

/// Ordered question blocks for one document, as found by an extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub meta: DocumentMeta,
    /// One raw text segment per detected question, in document order.
    pub blocks: Vec<String>,
}

/// Source of question blocks for the batch orchestrator.
#[async_trait]
pub trait ExtractionFeed: Send + Sync {
    /// Human-readable feed name (e.g. "plain-text").
    fn name(&self) -> &str;

    /// Extract the question blocks of `document` (a path, URL or any other
    /// identifier the feed understands).
    async fn extract(&self, document: &str) -> anyhow::Result<ExtractedDocument>;
}
